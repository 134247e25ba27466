//! In-memory serial link
//!
//! Records every frame sent, lets tests inject received bytes and faults,
//! and can flip its connection state with or without a notification.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use contracts::{ConnectionState, SerialTransport, TransportFault, TransportHandlers};
use tracing::{debug, trace};

/// Mock serial link
pub struct MockSerialTransport {
    name: String,
    connected: AtomicBool,
    /// Whether `connect()` succeeds
    accept_connect: AtomicBool,
    /// Whether `send()` succeeds while connected
    accept_send: AtomicBool,
    handlers: Mutex<Option<TransportHandlers>>,
    sent: Mutex<Vec<Vec<u8>>>,
    send_latency: Mutex<Duration>,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    sends_in_flight: AtomicUsize,
    max_sends_in_flight: AtomicUsize,
}

impl MockSerialTransport {
    /// Create a disconnected mock link that accepts connects and sends
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connected: AtomicBool::new(false),
            accept_connect: AtomicBool::new(true),
            accept_send: AtomicBool::new(true),
            handlers: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            send_latency: Mutex::new(Duration::ZERO),
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            sends_in_flight: AtomicUsize::new(0),
            max_sends_in_flight: AtomicUsize::new(0),
        }
    }

    /// Make subsequent `connect()` calls fail
    pub fn set_accept_connect(&self, accept: bool) {
        self.accept_connect.store(accept, Ordering::SeqCst);
    }

    /// Make subsequent `send()` calls fail
    pub fn set_accept_send(&self, accept: bool) {
        self.accept_send.store(accept, Ordering::SeqCst);
    }

    /// Delay applied inside every `send()`
    pub fn set_send_latency(&self, latency: Duration) {
        *lock(&self.send_latency) = latency;
    }

    /// Unsolicited state change, notified like a real port event
    pub fn set_connected(&self, connected: bool) {
        self.transition(connected);
    }

    /// Change the state without any notification
    ///
    /// Models a port that died without the driver reporting it.
    pub fn set_connected_silently(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Deliver bytes as if read from the port
    pub fn inject_bytes(&self, bytes: &[u8]) {
        if let Some(handlers) = self.handlers() {
            trace!(link = %self.name, len = bytes.len(), "mock bytes injected");
            (handlers.on_bytes)(bytes);
        }
    }

    /// Report a fault as if raised by the port
    pub fn inject_fault(&self, fault: TransportFault) {
        if let Some(handlers) = self.handlers() {
            debug!(link = %self.name, fault = %fault, "mock fault injected");
            (handlers.on_fault)(fault);
        }
    }

    /// Frames sent so far
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        lock(&self.sent).clone()
    }

    /// Number of frames sent so far
    pub fn sent_count(&self) -> usize {
        lock(&self.sent).len()
    }

    /// Forget recorded frames
    pub fn clear_sent(&self) {
        lock(&self.sent).clear();
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    /// Highest number of `send()` calls observed running at once
    pub fn max_concurrent_sends(&self) -> usize {
        self.max_sends_in_flight.load(Ordering::SeqCst)
    }

    /// Whether handlers have been registered
    pub fn has_listener(&self) -> bool {
        lock(&self.handlers).is_some()
    }

    fn handlers(&self) -> Option<TransportHandlers> {
        lock(&self.handlers).clone()
    }

    fn transition(&self, connected: bool) {
        let previous = self.connected.swap(connected, Ordering::SeqCst);
        if previous != connected {
            if let Some(handlers) = self.handlers() {
                (handlers.on_connection)(ConnectionState::from(connected));
            }
        }
    }
}

impl SerialTransport for MockSerialTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&self) -> bool {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if !self.accept_connect.load(Ordering::SeqCst) {
            debug!(link = %self.name, "mock connect refused");
            return false;
        }
        self.transition(true);
        true
    }

    fn disconnect(&self) {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.transition(false);
    }

    fn send(&self, bytes: &[u8]) -> bool {
        if !self.connected.load(Ordering::SeqCst) || !self.accept_send.load(Ordering::SeqCst) {
            return false;
        }

        let in_flight = self.sends_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_sends_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        let latency = *lock(&self.send_latency);
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        lock(&self.sent).push(bytes.to_vec());

        self.sends_in_flight.fetch_sub(1, Ordering::SeqCst);
        true
    }

    fn listen(&self, handlers: TransportHandlers) {
        *lock(&self.handlers) = Some(handlers);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recording_handlers() -> (TransportHandlers, Arc<Mutex<Vec<ConnectionState>>>) {
        let states = Arc::new(Mutex::new(Vec::new()));
        let sink = states.clone();
        let handlers = TransportHandlers {
            on_bytes: Arc::new(|_| {}),
            on_connection: Arc::new(move |s| sink.lock().unwrap().push(s)),
            on_fault: Arc::new(|_| {}),
        };
        (handlers, states)
    }

    #[test]
    fn test_connection_edges_notified_once() {
        let mock = MockSerialTransport::new("mock");
        let (handlers, states) = recording_handlers();
        mock.listen(handlers);

        assert!(mock.connect());
        assert!(mock.connect());
        mock.disconnect();
        mock.disconnect();

        assert_eq!(
            *states.lock().unwrap(),
            vec![ConnectionState::Connected, ConnectionState::Disconnected]
        );
        assert_eq!(mock.connect_calls(), 2);
    }

    #[test]
    fn test_send_requires_connection() {
        let mock = MockSerialTransport::new("mock");
        assert!(!mock.send(&[1, 2, 3]));
        mock.connect();
        assert!(mock.send(&[1, 2, 3]));
        mock.set_accept_send(false);
        assert!(!mock.send(&[4]));
        assert_eq!(mock.sent_frames(), vec![vec![1, 2, 3]]);
    }

    #[test]
    fn test_silent_drop_not_notified() {
        let mock = MockSerialTransport::new("mock");
        let (handlers, states) = recording_handlers();
        mock.listen(handlers);
        mock.connect();
        mock.set_connected_silently(false);
        assert!(!mock.is_connected());
        assert_eq!(states.lock().unwrap().len(), 1);
    }
}
