//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Scanner record source could not be opened
    #[error("Failed to open scanner events '{path}': {source}")]
    EventSource {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Pipeline component could not be built
    #[error("Pipeline setup failed for {component}: {message}")]
    PipelineSetup { component: String, message: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn event_source(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::EventSource {
            path: path.into(),
            source,
        }
    }

    pub fn pipeline_setup(component: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::PipelineSetup {
            component: component.into(),
            message: message.to_string(),
        }
    }
}
