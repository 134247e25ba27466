//! Correlation buffer

use std::time::{Duration, Instant};

use contracts::{is_valid_barcode, CorrelationConfig, ParcelEvent};
use observability::metrics as obs;
use tracing::{debug, instrument, trace};

use crate::dedup::DuplicateFilter;
use crate::merge::{merge_burst, next_sequence};
use crate::stats::CorrelationStats;

/// Burst merger followed by the repeat filter
#[derive(Debug)]
pub struct CorrelationBuffer {
    merge_window: Duration,
    noread_token: String,
    pending: Vec<ParcelEvent>,
    burst_started: Option<Instant>,
    filter: DuplicateFilter,
    stats: CorrelationStats,
}

impl CorrelationBuffer {
    pub fn new(config: &CorrelationConfig) -> Self {
        Self {
            merge_window: config.merge_window(),
            noread_token: config.noread_token.clone(),
            pending: Vec::new(),
            burst_started: None,
            filter: DuplicateFilter::new(
                config.repeat_window(),
                config.max_repeats,
                config.noread_token.clone(),
            ),
            stats: CorrelationStats::default(),
        }
    }

    /// Add one scanner event observed at `now`
    ///
    /// Returns the previous burst's record when this event falls outside
    /// its merge window and that record is not a repeat.
    #[instrument(
        level = "trace",
        name = "correlation_ingest",
        skip(self, event),
        fields(barcode = %event.barcode, index = event.index)
    )]
    pub fn ingest_parcel_event(&mut self, event: ParcelEvent, now: Instant) -> Option<ParcelEvent> {
        self.stats.events_ingested += 1;

        let released = match self.burst_started {
            Some(started) if now.saturating_duration_since(started) >= self.merge_window => {
                self.close_burst()
            }
            _ => None,
        };

        if self.burst_started.is_none() {
            self.burst_started = Some(now);
        }
        self.pending.push(event);
        trace!(pending = self.pending.len(), "event buffered");
        released
    }

    /// Close the open burst once its merge window has passed
    pub fn poll_expired(&mut self, now: Instant) -> Option<ParcelEvent> {
        match self.next_deadline() {
            Some(deadline) if now >= deadline => self.close_burst(),
            _ => None,
        }
    }

    /// Close the open burst regardless of its window
    pub fn flush(&mut self) -> Option<ParcelEvent> {
        if self.pending.is_empty() {
            return None;
        }
        self.close_burst()
    }

    /// When the open burst's window ends
    pub fn next_deadline(&self) -> Option<Instant> {
        self.burst_started.map(|started| started + self.merge_window)
    }

    /// Events in the open burst
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> CorrelationStats {
        self.stats
    }

    fn close_burst(&mut self) -> Option<ParcelEvent> {
        let started = self.burst_started.take()?;
        let reads = self.pending.len();
        let merged = merge_burst(std::mem::take(&mut self.pending), &self.noread_token, next_sequence())?;
        self.stats.bursts_closed += 1;

        if !self.filter.admit(&merged.barcode, started) {
            self.stats.duplicates_suppressed += 1;
            obs::record_duplicate_suppressed();
            debug!(barcode = %merged.barcode, reads, "repeat read suppressed");
            return None;
        }

        if !is_valid_barcode(&merged.barcode, &self.noread_token) {
            self.stats.noread_records += 1;
        }
        self.stats.records_released += 1;
        obs::record_parcel_correlated(reads);
        debug!(
            barcode = %merged.barcode,
            index = merged.index,
            reads,
            "parcel correlated"
        );
        Some(merged)
    }
}
