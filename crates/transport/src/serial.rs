//! Direct serial port link
//!
//! Reads use a short timeout so a reader left behind by a disconnect notices
//! it was superseded and exits.

use std::sync::Arc;
use std::time::Duration;

use contracts::{SerialTransport, TransportHandlers};
use serialport::SerialPort;
use tracing::instrument;

use crate::error::{Result, TransportError};
use crate::link::{LinkState, LinkWriter};

/// Reader poll interval on an idle line
const READ_TIMEOUT: Duration = Duration::from_millis(200);

impl LinkWriter for Box<dyn SerialPort> {
    fn close(&mut self) {
        // the port is released once both halves are dropped
        let _ = self.clear(serialport::ClearBuffer::All);
    }
}

/// Serial link opened with `serialport`
pub struct SerialPortTransport {
    port: String,
    baud_rate: u32,
    state: Arc<LinkState<Box<dyn SerialPort>>>,
}

impl SerialPortTransport {
    /// Create a disconnected link to `port` (e.g. `/dev/ttyUSB0`, `COM3`)
    pub fn new(name: impl Into<String>, port: impl Into<String>, baud_rate: u32) -> Result<Self> {
        let name = name.into();
        let port = port.into();
        if port.trim().is_empty() {
            return Err(TransportError::invalid_endpoint(name, port, "port is empty"));
        }
        if baud_rate == 0 {
            return Err(TransportError::invalid_endpoint(name, port, "baud rate must be positive"));
        }

        Ok(Self {
            port,
            baud_rate,
            state: Arc::new(LinkState::new(name)),
        })
    }

    /// Configured device path
    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn open(&self) -> std::io::Result<(Box<dyn SerialPort>, Box<dyn SerialPort>)> {
        let port = serialport::new(self.port.as_str(), self.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(READ_TIMEOUT)
            .open()?;
        let reader = port.try_clone()?;
        Ok((port, reader))
    }
}

impl SerialTransport for SerialPortTransport {
    fn name(&self) -> &str {
        &self.state.name
    }

    #[instrument(
        name = "serial_transport_connect",
        skip(self),
        fields(link = %self.state.name, port = %self.port, baud = self.baud_rate)
    )]
    fn connect(&self) -> bool {
        self.state.connect(|| self.open())
    }

    #[instrument(name = "serial_transport_disconnect", skip(self), fields(link = %self.state.name))]
    fn disconnect(&self) {
        self.state.disconnect();
    }

    fn send(&self, bytes: &[u8]) -> bool {
        self.state.send(bytes)
    }

    fn listen(&self, handlers: TransportHandlers) {
        self.state.set_handlers(handlers);
    }

    fn is_connected(&self) -> bool {
        self.state.is_connected()
    }
}

impl Drop for SerialPortTransport {
    fn drop(&mut self) {
        self.state.release();
    }
}
