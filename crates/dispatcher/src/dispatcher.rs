//! ActuationDispatcher - chute sequences onto the actuator bus
//!
//! Parcels enter an unbounded FIFO; a single consumer loop hands each one a
//! concurrency permit before spawning its dispatch task. All cars share one
//! bus, so a whole chute sequence runs under the send lock. The lock also
//! holds the time of the last transmit, keeping the inter-command gap across
//! consecutive parcels.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread;
use std::time::{Duration, Instant};

use contracts::{
    ActuationPlan, ConnectionState, ParcelEvent, ResolvedCar, ResolvedChute, SerialTransport,
    TransportFault, TransportHandlers,
};
use frame_codec::encode_actuator_frame;
use observability as obs;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::error::{ActuationError, Result};
use crate::handle::{dispatch_loop, DispatcherHandle};
use crate::metrics::{DispatcherMetrics, DispatcherMetricsSnapshot};
use crate::sequence::SequenceCounter;

/// How one chute sequence ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

/// Drives the actuator bus for sorted parcels
#[derive(Clone)]
pub struct ActuationDispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn SerialTransport>,
    plan: ActuationPlan,
    queue_tx: Mutex<Option<mpsc::UnboundedSender<ParcelEvent>>>,
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<ParcelEvent>>>,
    permits: Arc<Semaphore>,
    /// Time of the last frame handed to the bus
    send_lock: tokio::sync::Mutex<Option<Instant>>,
    sequence: SequenceCounter,
    cancel: CancellationToken,
    link_tx: watch::Sender<ConnectionState>,
    /// Set by `connect`, cleared by `disconnect`; gates automatic reconnects
    enabled: AtomicBool,
    reconnecting: AtomicBool,
    /// Set by `start`, cleared by `close` and `shutdown`
    running: AtomicBool,
    metrics: DispatcherMetrics,
}

impl ActuationDispatcher {
    /// Create a dispatcher over `transport` and register its callbacks
    pub fn new(transport: Arc<dyn SerialTransport>, plan: ActuationPlan) -> Result<Self> {
        if plan.max_concurrency == 0 {
            return Err(ActuationError::invalid_plan(
                "max_concurrency must be at least 1",
            ));
        }
        if let Some(chute) = plan.chutes.keys().find(|c| **c <= 0) {
            return Err(ActuationError::invalid_plan(format!(
                "chute numbers must be positive, got {chute}"
            )));
        }

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (link_tx, _) = watch::channel(ConnectionState::from(transport.is_connected()));
        let permits = plan.max_concurrency.min(Semaphore::MAX_PERMITS);

        let inner = Arc::new(Inner {
            transport,
            plan,
            queue_tx: Mutex::new(Some(queue_tx)),
            queue_rx: Mutex::new(Some(queue_rx)),
            permits: Arc::new(Semaphore::new(permits)),
            send_lock: tokio::sync::Mutex::new(None),
            sequence: SequenceCounter::new(),
            cancel: CancellationToken::new(),
            link_tx,
            enabled: AtomicBool::new(false),
            reconnecting: AtomicBool::new(false),
            running: AtomicBool::new(false),
            metrics: DispatcherMetrics::new(),
        });
        Inner::register_handlers(&inner);

        info!(
            link = %inner.transport.name(),
            chutes = inner.plan.chutes.len(),
            max_concurrency = permits,
            "actuation dispatcher created"
        );
        Ok(Self { inner })
    }

    /// Open the bus link
    #[instrument(name = "actuation_connect", skip(self), fields(link = %self.inner.transport.name()))]
    pub fn connect(&self) -> bool {
        self.inner.enabled.store(true, Ordering::SeqCst);
        let opened = self.inner.transport.connect();
        self.inner.sync_link_state();
        if !opened {
            warn!("actuator link connect failed");
        }
        opened
    }

    /// Close the bus link; no automatic reconnect until `connect` is called again
    #[instrument(name = "actuation_disconnect", skip(self), fields(link = %self.inner.transport.name()))]
    pub fn disconnect(&self) {
        self.inner.enabled.store(false, Ordering::SeqCst);
        self.inner.transport.disconnect();
        self.inner.sync_link_state();
    }

    /// Queue a routed parcel
    ///
    /// Returns false for parcels without a positive chute, before `start`
    /// and once the dispatcher is closed or shut down.
    pub fn enqueue(&self, parcel: ParcelEvent) -> bool {
        let chute = parcel.chute.unwrap_or(0);
        if chute <= 0 {
            debug!(index = parcel.index, chute, "parcel without a chute rejected");
            self.inner.metrics.inc_rejected();
            return false;
        }
        if !self.inner.running.load(Ordering::SeqCst) || self.inner.cancel.is_cancelled() {
            debug!(index = parcel.index, "dispatcher not running, parcel rejected");
            self.inner.metrics.inc_rejected();
            return false;
        }

        // counted before the send so the consumer never decrements first
        let depth = self.inner.metrics.inc_queue_len();
        let accepted = match lock(&self.inner.queue_tx).as_ref() {
            Some(tx) => tx.send(parcel).is_ok(),
            None => false,
        };

        if accepted {
            self.inner.metrics.inc_enqueued();
            obs::record_queue_depth(depth);
        } else {
            self.inner.metrics.dec_queue_len();
            debug!(chute, "dispatcher closed, parcel rejected");
            self.inner.metrics.inc_rejected();
        }
        accepted
    }

    /// Spawn the consumer loop
    pub fn start(&self) -> Result<DispatcherHandle> {
        let rx = lock(&self.inner.queue_rx)
            .take()
            .ok_or(ActuationError::AlreadyStarted)?;
        self.inner.running.store(true, Ordering::SeqCst);
        let worker = tokio::spawn(dispatch_loop(self.clone(), rx));
        Ok(DispatcherHandle::new(worker, self.inner.cancel.clone()))
    }

    /// Stop accepting parcels; queued ones are still dispatched
    pub fn close(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        if lock(&self.inner.queue_tx).take().is_some() {
            info!(
                queued = self.inner.metrics.queue_len(),
                "actuation dispatcher closed"
            );
        }
    }

    /// Stop accepting parcels and cancel everything in flight
    pub fn shutdown(&self) {
        self.close();
        self.inner.cancel.cancel();
    }

    /// Whether `enqueue` can still accept parcels
    pub fn is_accepting(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
            && !self.inner.cancel.is_cancelled()
            && lock(&self.inner.queue_tx).is_some()
    }

    /// Run the sequence configured for the parcel's chute
    ///
    /// Returns true only when every car of the sequence was commanded. Per-car
    /// failures do not abort the remaining cars. Waits observe both `cancel`
    /// and the dispatcher's own shutdown token; a frame already handed to the
    /// transport is always completed.
    #[instrument(
        name = "actuation_dispatch",
        skip(self, parcel, cancel),
        fields(index = parcel.index, chute = ?parcel.chute)
    )]
    pub async fn dispatch_to_chute(&self, parcel: &ParcelEvent, cancel: &CancellationToken) -> bool {
        let started = Instant::now();
        let outcome = self.run_sequence(parcel, cancel).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let metrics = &self.inner.metrics;
        match outcome {
            Outcome::Completed => metrics.inc_completed(),
            Outcome::Failed => metrics.inc_failed(),
            Outcome::Skipped => metrics.inc_skipped(),
            Outcome::Cancelled => metrics.inc_cancelled(),
        }
        let success = outcome == Outcome::Completed;
        if outcome != Outcome::Cancelled {
            obs::record_dispatch(success, elapsed_ms);
        }
        success
    }

    async fn run_sequence(&self, parcel: &ParcelEvent, cancel: &CancellationToken) -> Outcome {
        let requested = parcel.chute.unwrap_or(0);
        let Some(chute) = self
            .inner
            .plan
            .chute(requested)
            .filter(|c| !c.cars.is_empty())
        else {
            warn!(
                error = %ActuationError::UnknownChute { chute: requested },
                barcode = %parcel.barcode,
                "parcel not actuated"
            );
            return Outcome::Skipped;
        };

        let mut last_send = tokio::select! {
            biased;
            _ = cancel.cancelled() => return self.aborted(chute.chute),
            _ = self.inner.cancel.cancelled() => return self.aborted(chute.chute),
            guard = self.inner.send_lock.lock() => guard,
        };

        if !self.ensure_link().await {
            warn!(link = %self.inner.transport.name(), "actuator link down, commands will fail");
        }

        let gap = Duration::from_millis(self.inner.plan.inter_command_delay_ms);
        let mut failures = 0usize;
        for car in &chute.cars {
            let settle = (*last_send)
                .map(|at| (at + gap).saturating_duration_since(Instant::now()))
                .unwrap_or_default();
            let wait = settle + Duration::from_millis(u64::from(car.delay_ms));
            if !self.pause(cancel, wait).await {
                return self.aborted(chute.chute);
            }

            if let Err(e) = self.send_car(chute, car, &mut last_send).await {
                failures += 1;
                warn!(error = %e, "car command failed");
            }
        }

        if failures == 0 {
            debug!(cars = chute.cars.len(), "chute sequence completed");
            Outcome::Completed
        } else {
            warn!(cars = chute.cars.len(), failures, "chute sequence incomplete");
            Outcome::Failed
        }
    }

    /// Encode and transmit one car command; caller holds the send lock
    async fn send_car(
        &self,
        chute: &ResolvedChute,
        car: &ResolvedCar,
        last_send: &mut Option<Instant>,
    ) -> Result<()> {
        let sequence = self.inner.sequence.peek();
        let frame = match encode_actuator_frame(
            car.address,
            car.reverse,
            chute.run_time_ms,
            car.speed_rpm,
            car.start_delay_ms,
            sequence,
        ) {
            Ok(frame) => frame,
            Err(source) => {
                self.inner.metrics.inc_commands_failed();
                obs::record_car_command(false);
                return Err(ActuationError::Encode {
                    chute: chute.chute,
                    address: car.address,
                    source,
                });
            }
        };
        self.inner.sequence.advance();

        let transport = Arc::clone(&self.inner.transport);
        let bytes = frame.as_bytes().to_vec();
        let sent = tokio::task::spawn_blocking(move || transport.send(&bytes))
            .await
            .unwrap_or(false);
        *last_send = Some(Instant::now());

        obs::record_car_command(sent);
        if sent {
            self.inner.metrics.inc_commands_sent();
            trace!(address = car.address, sequence, "car commanded");
            Ok(())
        } else {
            self.inner.metrics.inc_commands_failed();
            Err(ActuationError::SendFailed {
                chute: chute.chute,
                address: car.address,
            })
        }
    }

    /// Sleep for `duration`; false when cancelled first
    async fn pause(&self, cancel: &CancellationToken, duration: Duration) -> bool {
        if duration.is_zero() {
            return !(cancel.is_cancelled() || self.inner.cancel.is_cancelled());
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = self.inner.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    fn aborted(&self, chute: i32) -> Outcome {
        debug!(error = %ActuationError::Cancelled { chute }, "dispatch aborted");
        Outcome::Cancelled
    }

    /// Reconcile with the transport and reconnect once when it is down
    async fn ensure_link(&self) -> bool {
        if self.inner.transport.is_connected() {
            self.inner.sync_link_state();
            return true;
        }
        if !self.inner.enabled.load(Ordering::SeqCst) {
            self.inner.sync_link_state();
            return false;
        }
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.reconnect())
            .await
            .unwrap_or(false)
    }

    /// Called once per dequeued parcel by the consumer loop
    pub(crate) async fn run_parcel(&self, parcel: ParcelEvent) {
        obs::record_dispatch_in_flight(self.inner.metrics.task_started());
        let cancel = self.inner.cancel.clone();
        self.dispatch_to_chute(&parcel, &cancel).await;
        obs::record_dispatch_in_flight(self.inner.metrics.task_finished());
    }

    pub(crate) fn permits(&self) -> Arc<Semaphore> {
        Arc::clone(&self.inner.permits)
    }

    pub(crate) fn service_token(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    pub(crate) fn counters(&self) -> &DispatcherMetrics {
        &self.inner.metrics
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.link_tx.borrow()
    }

    /// Edge-triggered link state notifications
    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.inner.link_tx.subscribe()
    }

    pub fn metrics(&self) -> DispatcherMetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn plan(&self) -> &ActuationPlan {
        &self.inner.plan
    }

    pub fn link_name(&self) -> &str {
        self.inner.transport.name()
    }
}

impl Inner {
    fn register_handlers(this: &Arc<Self>) {
        let on_connection: Weak<Self> = Arc::downgrade(this);
        let on_fault: Weak<Self> = Arc::downgrade(this);
        let link = this.transport.name().to_string();

        this.transport.listen(TransportHandlers {
            on_bytes: Arc::new(move |bytes| {
                trace!(link = %link, len = bytes.len(), "ignoring bytes from actuator bus");
            }),
            on_connection: Arc::new(move |_| {
                if let Some(inner) = on_connection.upgrade() {
                    inner.sync_link_state();
                }
            }),
            on_fault: Arc::new(move |fault| {
                if let Some(inner) = on_fault.upgrade() {
                    inner.on_fault(fault);
                }
            }),
        });
    }

    /// Publish the transport's own view of the link
    fn sync_link_state(&self) {
        let state = ConnectionState::from(self.transport.is_connected());
        let changed = self.link_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            info!(link = %self.transport.name(), state = %state, "actuator link state changed");
            obs::record_link_state(self.transport.name(), state.is_connected());
        }
    }

    /// One disconnect/connect cycle; concurrent callers share it
    fn reconnect(&self) -> bool {
        if self
            .reconnecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return self.transport.is_connected();
        }
        self.metrics.inc_reconnects();
        obs::record_reconnect(self.transport.name());

        self.transport.disconnect();
        self.sync_link_state();
        let opened = self.enabled.load(Ordering::SeqCst) && self.transport.connect();
        self.sync_link_state();

        self.reconnecting.store(false, Ordering::SeqCst);
        if !opened {
            warn!(link = %self.transport.name(), "actuator reconnect failed");
        }
        opened
    }

    fn on_fault(self: &Arc<Self>, fault: TransportFault) {
        if !fault.is_io_class() {
            warn!(link = %self.transport.name(), fault = %fault, "actuator link fault");
            return;
        }
        if !self.enabled.load(Ordering::SeqCst) || self.reconnecting.load(Ordering::SeqCst) {
            return;
        }

        warn!(link = %self.transport.name(), fault = %fault, "actuator link I/O fault, reconnecting");
        let inner = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("actuator-reconnect".into())
            .spawn(move || {
                inner.reconnect();
            });
        if let Err(e) = spawned {
            warn!(error = %e, "failed to spawn actuator reconnect thread");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
