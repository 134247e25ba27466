//! Weight acquisition service
//!
//! One mutex guards the accumulator, the stability window and the sample
//! cache together; a condvar wakes nearest-weight queries when a sample is
//! published or the link drops. The transport is never called with that
//! mutex held, since transports deliver callbacks synchronously.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::thread;
use std::time::{Duration, Instant};

use bytes::{Buf, BytesMut};
use contracts::{
    ConnectionState, ScaleConfig, SerialTransport, TransportFault, TransportHandlers,
    WeighingMode, WeightSample,
};
use frame_codec::{try_parse_dynamic_frame, try_parse_static_segment, DynamicParse, StaticParse};
use observability::metrics as obs;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::cache::SampleCache;
use crate::error::{Result, WeighingError};
use crate::metrics::{WeighingMetrics, WeighingMetricsSnapshot};
use crate::stability::StabilityWindow;

/// Receive accumulator limit; exceeding it clears the buffer
pub const ACCUMULATOR_CAPACITY: usize = 4096;

/// Weighing settings
#[derive(Debug, Clone)]
pub struct WeighingSettings {
    pub mode: WeighingMode,
    pub stable_check_count: usize,
    pub cache_capacity: usize,
    pub cache_max_age: Duration,
    /// Query window lower edge relative to the target (ms, usually negative)
    pub window_lower_ms: i64,
    /// Query window upper edge relative to the target (ms); also the wait deadline
    pub window_upper_ms: i64,
}

impl Default for WeighingSettings {
    fn default() -> Self {
        Self::from(&ScaleConfig::default())
    }
}

impl From<&ScaleConfig> for WeighingSettings {
    fn from(config: &ScaleConfig) -> Self {
        Self {
            mode: config.mode,
            stable_check_count: config.stable_check_count,
            cache_capacity: config.cache_capacity,
            cache_max_age: config.cache_max_age(),
            window_lower_ms: config.window_lower_ms,
            window_upper_ms: config.window_upper_ms,
        }
    }
}

impl WeighingSettings {
    pub fn validate(&self) -> Result<()> {
        if self.stable_check_count == 0 {
            return Err(WeighingError::InvalidSetting {
                field: "stable_check_count",
                message: "must be at least 1".into(),
            });
        }
        if self.cache_capacity == 0 {
            return Err(WeighingError::InvalidSetting {
                field: "cache_capacity",
                message: "must be at least 1".into(),
            });
        }
        if self.window_lower_ms >= self.window_upper_ms {
            return Err(WeighingError::InvalidSetting {
                field: "window_lower_ms",
                message: format!(
                    "lower edge {} must be below upper edge {}",
                    self.window_lower_ms, self.window_upper_ms
                ),
            });
        }
        Ok(())
    }

    fn mode_label(&self) -> &'static str {
        self.mode.as_str()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkPhase {
    Disconnected,
    Connecting,
    Connected,
}

struct State {
    phase: LinkPhase,
    /// Bumped on every drop so blocked queries notice it
    epoch: u64,
    accumulator: BytesMut,
    stability: StabilityWindow,
    cache: SampleCache,
}

struct Inner {
    transport: Arc<dyn SerialTransport>,
    settings: WeighingSettings,
    state: Mutex<State>,
    samples_ready: Condvar,
    link_tx: watch::Sender<ConnectionState>,
    /// Set by `connect`, cleared by `disconnect`; no automatic recovery while clear
    enabled: AtomicBool,
    reconnecting: AtomicBool,
    metrics: WeighingMetrics,
}

/// Weight acquisition over one scale link
#[derive(Clone)]
pub struct WeightAcquisitionService {
    inner: Arc<Inner>,
}

impl WeightAcquisitionService {
    /// Create the service and register its callbacks on `transport`
    ///
    /// The link stays closed until `connect` is called.
    pub fn new(transport: Arc<dyn SerialTransport>, settings: WeighingSettings) -> Result<Self> {
        settings.validate()?;

        let (link_tx, _) = watch::channel(ConnectionState::Disconnected);
        let inner = Arc::new(Inner {
            state: Mutex::new(State {
                phase: LinkPhase::Disconnected,
                epoch: 0,
                accumulator: BytesMut::with_capacity(ACCUMULATOR_CAPACITY),
                stability: StabilityWindow::new(settings.stable_check_count),
                cache: SampleCache::new(settings.cache_capacity, settings.cache_max_age),
            }),
            transport,
            settings,
            samples_ready: Condvar::new(),
            link_tx,
            enabled: AtomicBool::new(false),
            reconnecting: AtomicBool::new(false),
            metrics: WeighingMetrics::new(),
        });

        inner.transport.listen(handlers_for(Arc::downgrade(&inner)));
        Ok(Self { inner })
    }

    /// Open the scale link
    #[instrument(name = "weighing_connect", skip(self), fields(link = %self.inner.transport.name()))]
    pub fn connect(&self) -> bool {
        self.inner.enabled.store(true, Ordering::SeqCst);
        self.inner.mark_connecting();

        let opened = self.inner.transport.connect();
        self.inner.apply_link_state(self.inner.transport.is_connected());

        if !opened {
            warn!("scale link did not open");
        }
        opened && self.inner.transport.is_connected()
    }

    /// Close the scale link and stop automatic recovery
    #[instrument(name = "weighing_disconnect", skip(self), fields(link = %self.inner.transport.name()))]
    pub fn disconnect(&self) {
        self.inner.enabled.store(false, Ordering::SeqCst);
        self.inner.transport.disconnect();
        self.inner.apply_link_state(false);
    }

    /// Feed raw scale bytes
    ///
    /// Normally called from the transport's reader thread.
    pub fn on_bytes_received(&self, data: &[u8]) {
        self.inner.on_bytes(data);
    }

    /// Reconcile the cached link state with the transport
    ///
    /// Forces one reconnect cycle when the two disagree or the transport
    /// reports the port closed. Returns whether the link is usable.
    pub fn ensure_connected(&self) -> bool {
        self.inner.ensure_connected()
    }

    /// Weight (grams) measured closest to `target`
    ///
    /// Samples inside `[target + lower, target + upper]` qualify. Blocks until
    /// a positive sample shows up, the upper edge passes or the link drops;
    /// then falls back to the closest zero sample. Call from a blocking
    /// context.
    pub fn find_nearest_weight(&self, target: Instant) -> Option<f64> {
        let connected = self.inner.ensure_connected();
        let started = Instant::now();
        let settings = &self.inner.settings;
        let lower = offset(target, settings.window_lower_ms);
        let upper = offset(target, settings.window_upper_ms);

        let mut state = self.inner.lock_state();
        let mut best = state.cache.nearest(lower, upper, target);

        if best.non_zero.is_none() && connected {
            let epoch = state.epoch;
            loop {
                let now = Instant::now();
                if now >= upper || state.phase != LinkPhase::Connected || state.epoch != epoch {
                    break;
                }
                let (guard, _) = self
                    .inner
                    .samples_ready
                    .wait_timeout(state, upper - now)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                state = guard;
                best = best.merge(state.cache.nearest(lower, upper, target), target);
                if best.non_zero.is_some() {
                    break;
                }
            }
        }
        drop(state);

        let wait_ms = started.elapsed().as_secs_f64() * 1000.0;
        let metrics = &self.inner.metrics;
        match (best.non_zero, best.zero) {
            (Some(sample), _) => {
                WeighingMetrics::add(&metrics.query_hits, 1);
                obs::record_weight_query("hit", wait_ms);
                Some(sample.weight_grams)
            }
            (None, Some(sample)) => {
                WeighingMetrics::add(&metrics.query_zero_fallbacks, 1);
                obs::record_weight_query("zero", wait_ms);
                debug!(wait_ms, "only a zero sample in window");
                Some(sample.weight_grams)
            }
            (None, None) => {
                WeighingMetrics::add(&metrics.query_misses, 1);
                obs::record_weight_query("miss", wait_ms);
                debug!(wait_ms, connected, "no sample in window");
                None
            }
        }
    }

    /// Current link state
    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.link_tx.borrow()
    }

    /// Edge-triggered link state notifications
    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.inner.link_tx.subscribe()
    }

    /// Cached samples, oldest first
    pub fn samples(&self) -> Vec<WeightSample> {
        self.inner.lock_state().cache.samples()
    }

    pub fn metrics(&self) -> WeighingMetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn settings(&self) -> &WeighingSettings {
        &self.inner.settings
    }

    pub fn link_name(&self) -> &str {
        self.inner.transport.name()
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn mark_connecting(&self) {
        let mut state = self.lock_state();
        if state.phase == LinkPhase::Disconnected {
            state.phase = LinkPhase::Connecting;
        }
    }

    /// Single entry point for link state changes
    fn apply_link_state(&self, connected: bool) {
        {
            let mut state = self.lock_state();
            if connected {
                state.phase = LinkPhase::Connected;
            } else {
                state.phase = LinkPhase::Disconnected;
                state.accumulator.clear();
                state.stability.clear();
                state.epoch += 1;
            }
        }
        if !connected {
            self.samples_ready.notify_all();
        }

        let next = ConnectionState::from(connected);
        let changed = self.link_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            info!(link = %self.transport.name(), state = %next, "scale link state changed");
            obs::record_link_state(self.transport.name(), connected);
        }
    }

    fn ensure_connected(&self) -> bool {
        let cached = self.lock_state().phase == LinkPhase::Connected;
        if !self.enabled.load(Ordering::SeqCst) {
            return cached;
        }

        let actual = self.transport.is_connected();
        if actual && cached {
            return true;
        }

        warn!(
            link = %self.transport.name(),
            actual,
            cached,
            "scale link state out of sync, reconnecting"
        );
        self.reconnect()
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

        WeighingMetrics::add(&self.metrics.reconnects, 1);
        obs::record_reconnect(self.transport.name());

        self.transport.disconnect();
        self.apply_link_state(false);
        self.mark_connecting();
        let opened = self.transport.connect();
        let connected = self.transport.is_connected();
        self.apply_link_state(connected);

        self.reconnecting.store(false, Ordering::SeqCst);
        if !opened {
            warn!(link = %self.transport.name(), "scale reconnect failed");
        }
        opened && connected
    }

    fn on_fault(self: &Arc<Self>, fault: TransportFault) {
        if !fault.is_io_class() {
            warn!(link = %self.transport.name(), fault = %fault, "scale link fault");
            return;
        }
        if !self.enabled.load(Ordering::SeqCst) {
            debug!(link = %self.transport.name(), fault = %fault, "fault on closed scale link ignored");
            return;
        }
        if self.reconnecting.load(Ordering::SeqCst) {
            return;
        }

        warn!(link = %self.transport.name(), fault = %fault, "scale link I/O fault, reconnecting");
        let inner = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("scale-reconnect".into())
            .spawn(move || {
                inner.reconnect();
            });
        if let Err(e) = spawned {
            warn!(error = %e, "failed to spawn scale reconnect thread");
        }
    }

    fn on_bytes(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let arrival = Instant::now();
        WeighingMetrics::add(&self.metrics.bytes_received, data.len() as u64);

        let mut published = Vec::new();
        {
            let mut guard = self.lock_state();
            let state = &mut *guard;

            if state.accumulator.len() + data.len() > ACCUMULATOR_CAPACITY {
                warn!(
                    buffered = state.accumulator.len(),
                    incoming = data.len(),
                    "scale accumulator overflow, clearing"
                );
                state.accumulator.clear();
                WeighingMetrics::add(&self.metrics.buffer_discards, 1);
                obs::record_scale_discard("overflow");
                return;
            }
            state.accumulator.extend_from_slice(data);

            match self.settings.mode {
                WeighingMode::Dynamic => self.drain_dynamic(state, arrival, &mut published),
                WeighingMode::Static => self.drain_static(state, arrival, &mut published),
            }
        }

        if !published.is_empty() {
            self.samples_ready.notify_all();
            for grams in published {
                debug!(weight_grams = grams, "weight published");
                obs::record_weight_published(self.settings.mode_label(), grams);
            }
        }
    }

    fn drain_dynamic(&self, state: &mut State, arrival: Instant, published: &mut Vec<f64>) {
        loop {
            match try_parse_dynamic_frame(&state.accumulator) {
                DynamicParse::Frame {
                    weight_kg,
                    consumed,
                } => {
                    state.accumulator.advance(consumed);
                    WeighingMetrics::add(&self.metrics.readings_parsed, 1);
                    let grams = weight_kg * 1000.0;
                    state.cache.push(WeightSample::new(grams, arrival));
                    WeighingMetrics::add(&self.metrics.samples_published, 1);
                    published.push(grams);
                }
                DynamicParse::NeedMore => break,
                DynamicParse::DiscardAll => {
                    warn!(buffered = state.accumulator.len(), "no dynamic frame in scale buffer, discarding");
                    state.accumulator.clear();
                    WeighingMetrics::add(&self.metrics.buffer_discards, 1);
                    obs::record_scale_discard("no_frame");
                    break;
                }
            }
        }
    }

    fn drain_static(&self, state: &mut State, arrival: Instant, published: &mut Vec<f64>) {
        loop {
            match try_parse_static_segment(&state.accumulator) {
                StaticParse::Segments {
                    readings_kg,
                    consumed,
                } => {
                    state.accumulator.advance(consumed);
                    for kg in readings_kg {
                        WeighingMetrics::add(&self.metrics.readings_parsed, 1);
                        if let Some(grams) = state.stability.push(kg * 1000.0) {
                            state.cache.push(WeightSample::new(grams, arrival));
                            WeighingMetrics::add(&self.metrics.samples_published, 1);
                            published.push(grams);
                        }
                    }
                }
                StaticParse::NeedMore => break,
                StaticParse::Corrupt => {
                    warn!(buffered = state.accumulator.len(), "static scale text has no sentinel, clearing");
                    state.accumulator.clear();
                    WeighingMetrics::add(&self.metrics.buffer_discards, 1);
                    obs::record_scale_discard("corrupt");
                    break;
                }
            }
        }
    }
}

fn handlers_for(weak: Weak<Inner>) -> TransportHandlers {
    let on_bytes = {
        let weak = weak.clone();
        Arc::new(move |bytes: &[u8]| {
            if let Some(inner) = weak.upgrade() {
                inner.on_bytes(bytes);
            }
        })
    };
    let on_connection = {
        let weak = weak.clone();
        Arc::new(move |reported: ConnectionState| {
            if let Some(inner) = weak.upgrade() {
                debug!(link = %inner.transport.name(), reported = %reported, "transport state notification");
                // the transport flag is authoritative; notifications may arrive late
                inner.apply_link_state(inner.transport.is_connected());
            }
        })
    };
    let on_fault = Arc::new(move |fault: TransportFault| {
        if let Some(inner) = weak.upgrade() {
            inner.on_fault(fault);
        }
    });

    TransportHandlers {
        on_bytes,
        on_connection,
        on_fault,
    }
}

fn offset(base: Instant, ms: i64) -> Instant {
    let delta = Duration::from_millis(ms.unsigned_abs());
    if ms >= 0 {
        base + delta
    } else {
        base.checked_sub(delta).unwrap_or(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transport::{encode_dynamic_reading, encode_static_reading, MockSerialTransport};

    fn service(mode: WeighingMode) -> (WeightAcquisitionService, Arc<MockSerialTransport>) {
        service_with(WeighingSettings {
            mode,
            stable_check_count: 3,
            ..Default::default()
        })
    }

    fn service_with(settings: WeighingSettings) -> (WeightAcquisitionService, Arc<MockSerialTransport>) {
        let mock = Arc::new(MockSerialTransport::new("scale"));
        let service = WeightAcquisitionService::new(mock.clone(), settings).unwrap();
        (service, mock)
    }

    fn weights(service: &WeightAcquisitionService) -> Vec<f64> {
        service.samples().iter().map(|s| s.weight_grams).collect()
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_rejects_invalid_settings() {
        let mock = Arc::new(MockSerialTransport::new("scale"));
        let bad = WeighingSettings {
            window_lower_ms: 100,
            window_upper_ms: 100,
            ..Default::default()
        };
        assert!(WeightAcquisitionService::new(mock, bad).is_err());
    }

    #[test]
    fn test_dynamic_frames_publish_immediately() {
        let (service, _mock) = service(WeighingMode::Dynamic);
        let mut bytes = encode_dynamic_reading(1.25).to_vec();
        bytes.extend_from_slice(&encode_dynamic_reading(2.5));
        service.on_bytes_received(&bytes);

        assert_eq!(weights(&service), vec![1250.0, 2500.0]);
        assert_eq!(service.metrics().samples_published, 2);
    }

    #[test]
    fn test_dynamic_frame_split_across_chunks() {
        let (service, _mock) = service(WeighingMode::Dynamic);
        let frame = encode_dynamic_reading(3.0);
        service.on_bytes_received(&frame[..3]);
        assert!(service.samples().is_empty());
        service.on_bytes_received(&frame[3..]);
        assert_eq!(weights(&service), vec![3000.0]);
    }

    #[test]
    fn test_static_publishes_after_stable_window() {
        let (service, _mock) = service(WeighingMode::Static);
        service.on_bytes_received(&encode_static_reading(1.0));
        service.on_bytes_received(&encode_static_reading(1.005));
        assert!(service.samples().is_empty());
        service.on_bytes_received(&encode_static_reading(1.0));
        assert_eq!(weights(&service), vec![1000.0]);

        // window restarts after a publish
        service.on_bytes_received(&encode_static_reading(1.0));
        assert_eq!(service.samples().len(), 1);
    }

    #[test]
    fn test_static_unstable_readings_not_published() {
        let (service, _mock) = service(WeighingMode::Static);
        for kg in [1.0, 1.2, 1.0, 1.2] {
            service.on_bytes_received(&encode_static_reading(kg));
        }
        assert!(service.samples().is_empty());
        assert_eq!(service.metrics().readings_parsed, 4);
    }

    #[test]
    fn test_static_zero_readings_ignored() {
        let (service, _mock) = service(WeighingMode::Static);
        for kg in [0.0, 0.0, 0.0] {
            service.on_bytes_received(&encode_static_reading(kg));
        }
        assert!(service.samples().is_empty());
    }

    #[test]
    fn test_accumulator_overflow_clears() {
        let (service, _mock) = service(WeighingMode::Static);
        service.on_bytes_received(b"05.21");
        service.on_bytes_received(&vec![b'1'; ACCUMULATOR_CAPACITY]);
        assert_eq!(service.metrics().buffer_discards, 1);

        // nothing of the earlier partial segment survives
        for _ in 0..3 {
            service.on_bytes_received(&encode_static_reading(2.0));
        }
        assert_eq!(weights(&service), vec![2000.0]);
    }

    #[test]
    fn test_dynamic_garbage_discarded() {
        let (service, _mock) = service(WeighingMode::Dynamic);
        service.on_bytes_received(&[0x55; 65]);
        assert_eq!(service.metrics().buffer_discards, 1);
        service.on_bytes_received(&encode_dynamic_reading(0.5));
        assert_eq!(weights(&service), vec![500.0]);
    }

    #[test]
    fn test_nearest_returns_cached_hit_without_waiting() {
        let (service, _mock) = service(WeighingMode::Dynamic);
        service.on_bytes_received(&encode_dynamic_reading(4.2));

        let started = Instant::now();
        let grams = service.find_nearest_weight(Instant::now());
        assert!((grams.unwrap() - 4200.0).abs() < 1e-6);
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(service.metrics().query_hits, 1);
    }

    #[test]
    fn test_nearest_disconnected_empty_returns_none_immediately() {
        let (service, _mock) = service(WeighingMode::Dynamic);
        let started = Instant::now();
        assert_eq!(service.find_nearest_weight(Instant::now()), None);
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_nearest_waits_for_late_sample() {
        let (service, mock) = service(WeighingMode::Dynamic);
        assert!(service.connect());

        let feeder = {
            let mock = mock.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                mock.inject_bytes(&encode_dynamic_reading(7.5));
            })
        };

        let started = Instant::now();
        let grams = service.find_nearest_weight(Instant::now());
        feeder.join().unwrap();

        assert!((grams.unwrap() - 7500.0).abs() < 1e-6);
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn test_nearest_prefers_late_nonzero_over_cached_zero() {
        let (service, mock) = service(WeighingMode::Dynamic);
        assert!(service.connect());
        mock.inject_bytes(&encode_dynamic_reading(0.0));
        thread::sleep(Duration::from_millis(100));

        let feeder = {
            let mock = mock.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                mock.inject_bytes(&encode_dynamic_reading(2.0));
            })
        };

        let target = Instant::now();
        let grams = service.find_nearest_weight(target);
        feeder.join().unwrap();

        assert_eq!(grams, Some(2000.0));
        assert!(target.elapsed() >= Duration::from_millis(40));
        assert!(target.elapsed() < Duration::from_millis(400));
        assert_eq!(service.metrics().query_zero_fallbacks, 0);
    }

    #[test]
    fn test_nearest_falls_back_to_zero_at_deadline() {
        let (service, mock) = service_with(WeighingSettings {
            mode: WeighingMode::Dynamic,
            window_upper_ms: 100,
            ..Default::default()
        });
        assert!(service.connect());
        mock.inject_bytes(&encode_dynamic_reading(0.0));

        let started = Instant::now();
        assert_eq!(service.find_nearest_weight(Instant::now()), Some(0.0));
        assert!(started.elapsed() >= Duration::from_millis(80));
        assert_eq!(service.metrics().query_zero_fallbacks, 1);
    }

    #[test]
    fn test_link_drop_wakes_waiting_query() {
        let (service, mock) = service(WeighingMode::Dynamic);
        assert!(service.connect());

        let dropper = {
            let mock = mock.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                mock.set_connected(false);
            })
        };

        let started = Instant::now();
        assert_eq!(service.find_nearest_weight(Instant::now()), None);
        dropper.join().unwrap();
        assert!(started.elapsed() < Duration::from_millis(400));
        assert_eq!(service.connection_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_link_drop_clears_partial_frame() {
        let (service, mock) = service(WeighingMode::Dynamic);
        assert!(service.connect());
        let frame = encode_dynamic_reading(1.0);

        mock.inject_bytes(&frame[..4]);
        mock.set_connected(false);
        mock.set_connected(true);
        mock.inject_bytes(&frame[4..]);

        assert!(service.samples().is_empty());
    }

    #[test]
    fn test_ensure_connected_recovers_silent_drop() {
        let (service, mock) = service(WeighingMode::Dynamic);
        assert!(service.connect());
        mock.set_connected_silently(false);

        assert!(service.ensure_connected());
        assert_eq!(mock.connect_calls(), 2);
        assert_eq!(service.metrics().reconnects, 1);
        assert_eq!(service.connection_state(), ConnectionState::Connected);

        // in sync again: no further cycle
        assert!(service.ensure_connected());
        assert_eq!(mock.connect_calls(), 2);
    }

    #[test]
    fn test_io_fault_triggers_reconnect() {
        let (service, mock) = service(WeighingMode::Dynamic);
        assert!(service.connect());

        mock.inject_fault(TransportFault::BrokenPipe);
        assert!(wait_until(|| mock.connect_calls() == 2 && service.metrics().reconnects == 1));
        assert!(wait_until(|| service.connection_state().is_connected()));
    }

    #[test]
    fn test_other_fault_does_not_reconnect() {
        let (service, mock) = service(WeighingMode::Dynamic);
        assert!(service.connect());

        mock.inject_fault(TransportFault::Other("parity".into()));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(mock.connect_calls(), 1);
        assert_eq!(service.metrics().reconnects, 0);
    }

    #[test]
    fn test_disconnect_disables_recovery() {
        let (service, mock) = service(WeighingMode::Dynamic);
        assert!(service.connect());
        service.disconnect();

        assert!(!service.ensure_connected());
        mock.inject_fault(TransportFault::Timeout);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(mock.connect_calls(), 1);
    }

    #[test]
    fn test_connection_notifications_are_edge_triggered() {
        let (service, mock) = service(WeighingMode::Dynamic);
        let mut rx = service.subscribe_connection();

        assert!(service.connect());
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), ConnectionState::Connected);

        assert!(service.connect());
        assert!(!rx.has_changed().unwrap());

        mock.set_connected(false);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_failed_connect_reports_false() {
        let (service, mock) = service(WeighingMode::Dynamic);
        mock.set_accept_connect(false);
        assert!(!service.connect());
        assert_eq!(service.connection_state(), ConnectionState::Disconnected);
    }
}
