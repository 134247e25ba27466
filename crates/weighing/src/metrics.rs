//! Weighing counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Weighing metrics
#[derive(Debug, Default)]
pub struct WeighingMetrics {
    /// Raw bytes received from the scale
    pub bytes_received: AtomicU64,

    /// Readings decoded from the wire
    pub readings_parsed: AtomicU64,

    /// Samples published into the cache
    pub samples_published: AtomicU64,

    /// Accumulator clears (overflow, garbage, corrupt text)
    pub buffer_discards: AtomicU64,

    /// Nearest-weight queries answered with a positive weight
    pub query_hits: AtomicU64,

    /// Queries answered with a zero sample
    pub query_zero_fallbacks: AtomicU64,

    /// Queries with no sample in the window
    pub query_misses: AtomicU64,

    /// Forced reconnect cycles
    pub reconnects: AtomicU64,
}

impl WeighingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WeighingMetricsSnapshot {
        WeighingMetricsSnapshot {
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            readings_parsed: self.readings_parsed.load(Ordering::Relaxed),
            samples_published: self.samples_published.load(Ordering::Relaxed),
            buffer_discards: self.buffer_discards.load(Ordering::Relaxed),
            query_hits: self.query_hits.load(Ordering::Relaxed),
            query_zero_fallbacks: self.query_zero_fallbacks.load(Ordering::Relaxed),
            query_misses: self.query_misses.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeighingMetricsSnapshot {
    pub bytes_received: u64,
    pub readings_parsed: u64,
    pub samples_published: u64,
    pub buffer_discards: u64,
    pub query_hits: u64,
    pub query_zero_fallbacks: u64,
    pub query_misses: u64,
    pub reconnects: u64,
}
