//! Correlation counters

/// Correlation statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelationStats {
    /// Raw scanner events received
    pub events_ingested: u64,

    /// Bursts closed (one merged record each)
    pub bursts_closed: u64,

    /// Records released downstream
    pub records_released: u64,

    /// Records dropped as repeats
    pub duplicates_suppressed: u64,

    /// Released records without a usable barcode
    pub noread_records: u64,
}

impl CorrelationStats {
    /// Events folded into another event of their burst
    pub fn reads_merged(&self) -> u64 {
        self.events_ingested.saturating_sub(self.bursts_closed)
    }
}
