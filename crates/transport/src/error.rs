//! Transport error types

use contracts::ContractError;
use thiserror::Error;

/// Transport construction errors
///
/// Runtime link failures never surface here; they are reported through
/// `TransportFault` callbacks and `bool` results.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Endpoint address is empty or malformed
    #[error("invalid endpoint '{addr}' for link '{link}': {message}")]
    InvalidEndpoint {
        link: String,
        addr: String,
        message: String,
    },

    /// Wrapped ContractError
    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl TransportError {
    pub fn invalid_endpoint(
        link: impl Into<String>,
        addr: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidEndpoint {
            link: link.into(),
            addr: addr.into(),
            message: message.into(),
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, TransportError>;
