//! # Transport
//!
//! Concrete byte links behind the `SerialTransport` contract.
//!
//! Responsibilities:
//! - Open serial ports directly
//! - Bridge serial devices exposed by a device server over TCP
//! - Provide an in-memory mock link for tests and dry runs
//! - Simulate the scale and the scanner for `--simulate` runs

mod error;
mod link;
mod mock;
mod serial;
mod simulated;
mod tcp;

pub use contracts::{SerialTransport, TransportFault, TransportHandlers};
pub use error::{Result, TransportError};
pub use mock::MockSerialTransport;
pub use simulated::{
    encode_dynamic_reading, encode_static_reading, ScannerConfig, SimulatedScale,
    SimulatedScanner,
};
pub use serial::SerialPortTransport;
pub use tcp::TcpSerialTransport;

use std::sync::Arc;
use std::time::Duration;

use contracts::TransportConfig;

/// Build a link from configuration
///
/// `Simulated` endpoints get a connected-on-demand mock link; callers that
/// need to drive it keep the returned mock themselves.
pub fn build_transport(name: &str, config: &TransportConfig) -> Result<Arc<dyn SerialTransport>> {
    match config {
        TransportConfig::Serial { port, baud_rate } => {
            Ok(Arc::new(SerialPortTransport::new(name, port.clone(), *baud_rate)?))
        }
        TransportConfig::Tcp {
            addr,
            connect_timeout_ms,
        } => {
            let transport = TcpSerialTransport::new(
                name,
                addr.clone(),
                Duration::from_millis(*connect_timeout_ms),
            )?;
            Ok(Arc::new(transport))
        }
        TransportConfig::Simulated => Ok(Arc::new(MockSerialTransport::new(name))),
    }
}
