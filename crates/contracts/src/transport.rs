//! SerialTransport trait - serial link abstraction
//!
//! Defines a unified interface for the byte links to the scale and the
//! actuator bus, decoupling the services from concrete port implementations.
//! Real TCP bridges and mock links are handled the same way.

use std::fmt;
use std::sync::Arc;

use crate::ConnectionState;

/// Received bytes callback
///
/// Invoked on the transport's own reader thread.
pub type BytesCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Connection change callback (edge-triggered)
pub type ConnectionCallback = Arc<dyn Fn(ConnectionState) + Send + Sync>;

/// Fault callback, invoked when the reader thread hits an I/O failure
pub type FaultCallback = Arc<dyn Fn(TransportFault) + Send + Sync>;

/// Callbacks registered on a transport
#[derive(Clone)]
pub struct TransportHandlers {
    pub on_bytes: BytesCallback,
    pub on_connection: ConnectionCallback,
    pub on_fault: FaultCallback,
}

impl fmt::Debug for TransportHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportHandlers").finish_non_exhaustive()
    }
}

/// Classified transport failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFault {
    /// Read or write timed out
    Timeout,
    /// Port already opened by another process
    PortBusy,
    /// Peer closed the link mid-transfer
    BrokenPipe,
    /// Operation attempted on a closed port
    InvalidOperation,
    /// Anything else; logged but does not trigger recovery
    Other(String),
}

impl TransportFault {
    /// I/O-class faults trigger an explicit reconnect cycle
    pub fn is_io_class(&self) -> bool {
        !matches!(self, Self::Other(_))
    }

    /// Classify a std I/O error
    pub fn from_io(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => Self::Timeout,
            ErrorKind::AddrInUse | ErrorKind::ResourceBusy => Self::PortBusy,
            ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::UnexpectedEof => Self::BrokenPipe,
            ErrorKind::NotConnected | ErrorKind::InvalidInput => Self::InvalidOperation,
            _ => Self::Other(err.to_string()),
        }
    }
}

impl fmt::Display for TransportFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timeout"),
            Self::PortBusy => f.write_str("port busy"),
            Self::BrokenPipe => f.write_str("broken pipe"),
            Self::InvalidOperation => f.write_str("invalid operation"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

/// Serial link trait
///
/// Implementations must never invoke callbacks while holding a lock that
/// `connect`/`disconnect`/`send` also take; services call back into the
/// transport from inside those callbacks.
pub trait SerialTransport: Send + Sync {
    /// Link name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Open the link; returns true when connected afterwards
    fn connect(&self) -> bool;

    /// Close the link (idempotent)
    fn disconnect(&self);

    /// Write all bytes; returns true on success
    fn send(&self, bytes: &[u8]) -> bool;

    /// Register callbacks
    ///
    /// Repeated calls replace the previous handlers.
    fn listen(&self, handlers: TransportHandlers);

    /// Authoritative connection state
    fn is_connected(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_fault_classification() {
        assert_eq!(
            TransportFault::from_io(&Error::from(ErrorKind::TimedOut)),
            TransportFault::Timeout
        );
        assert_eq!(
            TransportFault::from_io(&Error::from(ErrorKind::BrokenPipe)),
            TransportFault::BrokenPipe
        );
        assert_eq!(
            TransportFault::from_io(&Error::from(ErrorKind::AddrInUse)),
            TransportFault::PortBusy
        );
        assert!(!TransportFault::from_io(&Error::other("boom")).is_io_class());
    }
}
