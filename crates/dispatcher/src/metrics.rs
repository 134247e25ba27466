//! Dispatcher metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Metrics for the actuation dispatcher
#[derive(Debug, Default)]
pub struct DispatcherMetrics {
    /// Parcels waiting in the FIFO
    queue_len: AtomicUsize,
    /// Dispatch tasks currently holding a permit
    in_flight: AtomicUsize,
    /// Highest `in_flight` observed
    peak_in_flight: AtomicUsize,
    /// Parcels accepted by `enqueue`
    enqueued: AtomicU64,
    /// Parcels refused by `enqueue`
    rejected: AtomicU64,
    /// Sequences where every car succeeded
    completed: AtomicU64,
    /// Sequences with at least one failed car
    failed: AtomicU64,
    /// Parcels whose chute had no sequence
    skipped: AtomicU64,
    /// Sequences aborted by cancellation
    cancelled: AtomicU64,
    /// Car frames written to the bus
    commands_sent: AtomicU64,
    /// Car commands rejected or not written
    commands_failed: AtomicU64,
    /// Forced reconnect cycles
    reconnects: AtomicU64,
}

impl DispatcherMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub(crate) fn inc_queue_len(&self) -> usize {
        self.queue_len.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn dec_queue_len(&self) -> usize {
        let previous = self
            .queue_len
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub(crate) fn task_started(&self) -> usize {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        now
    }

    pub(crate) fn task_finished(&self) -> usize {
        self.in_flight.fetch_sub(1, Ordering::SeqCst).saturating_sub(1)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn inc_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_commands_sent(&self) {
        self.commands_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_commands_failed(&self) {
        self.commands_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_reconnects(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> DispatcherMetricsSnapshot {
        DispatcherMetricsSnapshot {
            queue_len: self.queue_len(),
            in_flight: self.in_flight(),
            peak_in_flight: self.peak_in_flight(),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            commands_failed: self.commands_failed.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatcher metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherMetricsSnapshot {
    pub queue_len: usize,
    pub in_flight: usize,
    pub peak_in_flight: usize,
    pub enqueued: u64,
    pub rejected: u64,
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub cancelled: u64,
    pub commands_sent: u64,
    pub commands_failed: u64,
    pub reconnects: u64,
}

impl DispatcherMetricsSnapshot {
    /// Sequences that ran to an outcome
    pub fn dispatched(&self) -> u64 {
        self.completed + self.failed + self.skipped + self.cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_tracks_highest_in_flight() {
        let metrics = DispatcherMetrics::new();
        metrics.task_started();
        metrics.task_started();
        metrics.task_finished();
        metrics.task_started();
        metrics.task_finished();
        metrics.task_finished();

        let snap = metrics.snapshot();
        assert_eq!(snap.in_flight, 0);
        assert_eq!(snap.peak_in_flight, 2);
    }

    #[test]
    fn test_queue_len_never_underflows() {
        let metrics = DispatcherMetrics::new();
        assert_eq!(metrics.dec_queue_len(), 0);
        assert_eq!(metrics.inc_queue_len(), 1);
        assert_eq!(metrics.dec_queue_len(), 0);
    }
}
