//! Connection bookkeeping shared by the threaded links
//!
//! Each connect bumps a generation counter and starts one reader thread bound
//! to that generation. Only the reader of the current generation may tear the
//! connection down and report the drop.

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use contracts::{ConnectionState, TransportFault, TransportHandlers};
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 1024;

/// Write half of an open link
pub(crate) trait LinkWriter: Write + Send + 'static {
    /// Release the device so a blocked reader returns
    fn close(&mut self);
}

pub(crate) struct LinkState<W: LinkWriter> {
    pub(crate) name: String,
    writer: Mutex<Option<W>>,
    handlers: Mutex<Option<TransportHandlers>>,
    connected: AtomicBool,
    generation: AtomicU64,
}

impl<W: LinkWriter> LinkState<W> {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            writer: Mutex::new(None),
            handlers: Mutex::new(None),
            connected: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    fn handlers(&self) -> Option<TransportHandlers> {
        lock(&self.handlers).clone()
    }

    pub(crate) fn set_handlers(&self, handlers: TransportHandlers) {
        *lock(&self.handlers) = Some(handlers);
    }

    pub(crate) fn notify_connection(&self, state: ConnectionState) {
        if let Some(handlers) = self.handlers() {
            (handlers.on_connection)(state);
        }
    }

    fn notify_fault(&self, fault: TransportFault) {
        if let Some(handlers) = self.handlers() {
            (handlers.on_fault)(fault);
        }
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Open a new generation unless one is already live
    ///
    /// `open` runs under the writer lock and returns the writer plus the
    /// reader for the new generation.
    pub(crate) fn connect<R, F>(self: &Arc<Self>, open: F) -> bool
    where
        R: Read + Send + 'static,
        F: FnOnce() -> std::io::Result<(W, R)>,
    {
        let generation = {
            let mut writer = lock(&self.writer);
            if writer.is_some() && self.is_connected() {
                return true;
            }

            let (stream, reader) = match open() {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(link = %self.name, error = %e, "connect failed");
                    return false;
                }
            };

            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *writer = Some(stream);
            self.connected.store(true, Ordering::SeqCst);

            let state = Arc::clone(self);
            let spawned = thread::Builder::new()
                .name(format!("{}-reader", self.name))
                .spawn(move || state.read_loop(reader, generation));
            if let Err(e) = spawned {
                warn!(link = %self.name, error = %e, "failed to spawn reader thread");
                if let Some(mut stream) = writer.take() {
                    stream.close();
                }
                self.connected.store(false, Ordering::SeqCst);
                return false;
            }
            generation
        };

        info!(link = %self.name, generation, "link connected");
        self.notify_connection(ConnectionState::Connected);
        true
    }

    /// Close the current generation; returns whether it was connected
    pub(crate) fn disconnect(&self) -> bool {
        let was_connected = {
            let mut writer = lock(&self.writer);
            self.generation.fetch_add(1, Ordering::SeqCst);
            if let Some(mut stream) = writer.take() {
                stream.close();
            }
            self.connected.swap(false, Ordering::SeqCst)
        };

        if was_connected {
            info!(link = %self.name, "link disconnected");
            self.notify_connection(ConnectionState::Disconnected);
        }
        was_connected
    }

    pub(crate) fn send(&self, bytes: &[u8]) -> bool {
        let result = {
            let mut writer = lock(&self.writer);
            match writer.as_mut() {
                Some(stream) => stream.write_all(bytes).and_then(|()| stream.flush()),
                None => return false,
            }
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                let fault = TransportFault::from_io(&e);
                warn!(link = %self.name, fault = %fault, "send failed");
                self.notify_fault(fault);
                false
            }
        }
    }

    /// Tear down the connection owned by `generation`, if still current
    fn drop_connection(&self, generation: u64) -> bool {
        let mut writer = lock(&self.writer);
        if !self.is_current(generation) {
            return false;
        }
        if let Some(mut stream) = writer.take() {
            stream.close();
        }
        self.connected.swap(false, Ordering::SeqCst)
    }

    fn read_loop<R: Read>(self: Arc<Self>, mut reader: R, generation: u64) {
        let mut buf = [0u8; READ_CHUNK];
        let fault = loop {
            match reader.read(&mut buf) {
                Ok(0) => break TransportFault::BrokenPipe,
                Ok(n) => {
                    if let Some(handlers) = self.handlers() {
                        (handlers.on_bytes)(&buf[..n]);
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                // serial reads time out while the line is idle
                Err(e) if e.kind() == ErrorKind::TimedOut => {
                    if !self.is_current(generation) {
                        debug!(link = %self.name, generation, "superseded reader exited");
                        return;
                    }
                }
                Err(e) => break TransportFault::from_io(&e),
            }
        };

        if self.drop_connection(generation) {
            warn!(link = %self.name, fault = %fault, "link lost");
            self.notify_fault(fault);
            self.notify_connection(ConnectionState::Disconnected);
        } else {
            debug!(link = %self.name, generation, "superseded reader exited");
        }
    }

    /// Invalidate the live generation without notifying
    pub(crate) fn release(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(mut stream) = lock(&self.writer).take() {
            stream.close();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
