//! Weighing error types

use thiserror::Error;

/// Weighing settings errors
///
/// Link and parse failures are handled inside the service and never
/// returned; only invalid construction input surfaces as an error.
#[derive(Debug, Error)]
pub enum WeighingError {
    /// Setting out of its allowed range
    #[error("invalid weighing setting '{field}': {message}")]
    InvalidSetting { field: &'static str, message: String },
}

/// Result alias
pub type Result<T> = std::result::Result<T, WeighingError>;
