//! Dispatcher error types

use frame_codec::CodecError;
use thiserror::Error;

/// Actuation errors
///
/// Only construction and lifecycle errors leave the crate; per-car failures
/// are logged and folded into the boolean dispatch result.
#[derive(Debug, Error)]
pub enum ActuationError {
    /// Plan cannot drive the bus
    #[error("invalid actuation plan: {message}")]
    InvalidPlan { message: String },

    /// The consumer loop is already running
    #[error("dispatcher already started")]
    AlreadyStarted,

    /// No sequence configured for the chute
    #[error("no car sequence configured for chute {chute}")]
    UnknownChute { chute: i32 },

    /// Command rejected by the codec
    #[error("chute {chute} car {address}: {source}")]
    Encode {
        chute: i32,
        address: u8,
        #[source]
        source: CodecError,
    },

    /// Transport refused or failed the write
    #[error("chute {chute} car {address}: send failed")]
    SendFailed { chute: i32, address: u8 },

    /// Sequence aborted by cancellation
    #[error("chute {chute} sequence cancelled")]
    Cancelled { chute: i32 },
}

impl ActuationError {
    /// Create an invalid plan error
    pub fn invalid_plan(message: impl Into<String>) -> Self {
        Self::InvalidPlan {
            message: message.into(),
        }
    }
}

/// Dispatcher Result type alias
pub type Result<T> = std::result::Result<T, ActuationError>;
