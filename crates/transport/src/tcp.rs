//! Serial device server bridge
//!
//! Serial ports on the line can be exposed by a device server as raw TCP
//! sockets. One reader thread per connection forwards received bytes.

use std::io::ErrorKind;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use contracts::{SerialTransport, TransportHandlers};
use tracing::instrument;

use crate::error::{Result, TransportError};
use crate::link::{LinkState, LinkWriter};

impl LinkWriter for TcpStream {
    fn close(&mut self) {
        let _ = self.shutdown(Shutdown::Both);
    }
}

/// TCP-bridged serial link
pub struct TcpSerialTransport {
    addr: String,
    connect_timeout: Duration,
    state: Arc<LinkState<TcpStream>>,
}

impl TcpSerialTransport {
    /// Create a disconnected link to `addr` (`host:port`)
    pub fn new(name: impl Into<String>, addr: impl Into<String>, connect_timeout: Duration) -> Result<Self> {
        let name = name.into();
        let addr = addr.into();
        if addr.trim().is_empty() {
            return Err(TransportError::invalid_endpoint(name, addr, "address is empty"));
        }
        if !addr.contains(':') {
            return Err(TransportError::invalid_endpoint(name, addr, "expected host:port"));
        }

        Ok(Self {
            addr,
            connect_timeout,
            state: Arc::new(LinkState::new(name)),
        })
    }

    /// Configured endpoint
    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn open(&self) -> std::io::Result<(TcpStream, TcpStream)> {
        let candidates: Vec<SocketAddr> = self.addr.to_socket_addrs()?.collect();
        let mut last_err = std::io::Error::new(ErrorKind::NotFound, "no address resolved");
        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, self.connect_timeout) {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    let reader = stream.try_clone()?;
                    return Ok((stream, reader));
                }
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }
}

impl SerialTransport for TcpSerialTransport {
    fn name(&self) -> &str {
        &self.state.name
    }

    #[instrument(name = "tcp_transport_connect", skip(self), fields(link = %self.state.name, addr = %self.addr))]
    fn connect(&self) -> bool {
        self.state.connect(|| self.open())
    }

    #[instrument(name = "tcp_transport_disconnect", skip(self), fields(link = %self.state.name))]
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

impl Drop for TcpSerialTransport {
    fn drop(&mut self) {
        self.state.release();
    }
}
