//! Sorter metric helpers
//!
//! Thin wrappers over the `metrics` facade so every crate records the same
//! `sorter_*` names and labels, plus an in-memory aggregator for run summaries.

use std::collections::BTreeMap;

use metrics::{counter, gauge, histogram};

/// Record a weight published into the sample cache
pub fn record_weight_published(mode: &str, weight_grams: f64) {
    counter!("sorter_weight_samples_total", "mode" => mode.to_string()).increment(1);
    gauge!("sorter_last_weight_grams").set(weight_grams);
    histogram!("sorter_weight_grams").record(weight_grams);
}

/// Record scale bytes thrown away (`overflow`, `no_frame`, `corrupt`)
pub fn record_scale_discard(reason: &str) {
    counter!("sorter_scale_discards_total", "reason" => reason.to_string()).increment(1);
}

/// Record a nearest-weight query (`hit`, `zero`, `miss`) and how long it blocked
pub fn record_weight_query(outcome: &str, wait_ms: f64) {
    counter!("sorter_weight_queries_total", "outcome" => outcome.to_string()).increment(1);
    histogram!("sorter_weight_query_wait_ms").record(wait_ms);
}

/// Record a link state edge
pub fn record_link_state(link: &str, connected: bool) {
    gauge!("sorter_link_connected", "link" => link.to_string())
        .set(if connected { 1.0 } else { 0.0 });
    if !connected {
        counter!("sorter_link_drops_total", "link" => link.to_string()).increment(1);
    }
}

/// Record a forced reconnect cycle
pub fn record_reconnect(link: &str) {
    counter!("sorter_link_reconnects_total", "link" => link.to_string()).increment(1);
}

/// Record a merged parcel leaving correlation
pub fn record_parcel_correlated(merged_reads: usize) {
    counter!("sorter_parcels_correlated_total").increment(1);
    histogram!("sorter_burst_reads").record(merged_reads as f64);
}

/// Record a duplicate read dropped by the repeat filter
pub fn record_duplicate_suppressed() {
    counter!("sorter_duplicates_suppressed_total").increment(1);
}

/// Record the chute decided for a parcel
pub fn record_parcel_routed(chute: i32) {
    counter!("sorter_parcels_routed_total", "chute" => chute.to_string()).increment(1);
}

/// Record one finished chute sequence
pub fn record_dispatch(success: bool, duration_ms: f64) {
    let status = if success { "success" } else { "failure" };
    counter!("sorter_dispatches_total", "status" => status.to_string()).increment(1);
    histogram!("sorter_dispatch_duration_ms").record(duration_ms);
}

/// Record one car command sent (or rejected)
pub fn record_car_command(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("sorter_car_commands_total", "status" => status.to_string()).increment(1);
}

/// Record the number of dispatch tasks holding a permit
pub fn record_dispatch_in_flight(in_flight: usize) {
    gauge!("sorter_dispatch_in_flight").set(in_flight as f64);
}

/// Record the number of parcels waiting for a permit
pub fn record_queue_depth(depth: usize) {
    gauge!("sorter_dispatch_queue_depth").set(depth as f64);
}

/// Per-parcel result fed to the aggregator
#[derive(Debug, Clone, Default)]
pub struct ParcelOutcome {
    /// Barcode was readable
    pub readable: bool,
    /// Weight attached (grams), None when the scale had nothing
    pub weight_grams: Option<f64>,
    /// Time spent waiting for the scale
    pub weigh_wait_ms: f64,
    /// Chute decided, None when the resolver gave up
    pub chute: Option<i32>,
    /// Dispatcher accepted the parcel
    pub dispatched: bool,
}

/// Run-level aggregator
#[derive(Debug, Clone, Default)]
pub struct SortingMetricsAggregator {
    /// Parcels after correlation
    pub total_parcels: u64,

    /// Parcels without a readable barcode
    pub noread_parcels: u64,

    /// Parcels without a weight
    pub unweighed_parcels: u64,

    /// Parcels the dispatcher refused
    pub rejected_parcels: u64,

    /// Scale wait time
    pub weigh_wait_stats: RunningStats,

    /// Attached weights
    pub weight_stats: RunningStats,

    /// Parcels per chute
    pub chute_counts: BTreeMap<i32, u64>,
}

impl SortingMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, outcome: &ParcelOutcome) {
        self.total_parcels += 1;
        if !outcome.readable {
            self.noread_parcels += 1;
        }
        match outcome.weight_grams {
            Some(grams) => self.weight_stats.push(grams),
            None => self.unweighed_parcels += 1,
        }
        self.weigh_wait_stats.push(outcome.weigh_wait_ms);
        if let Some(chute) = outcome.chute {
            *self.chute_counts.entry(chute).or_insert(0) += 1;
        }
        if !outcome.dispatched {
            self.rejected_parcels += 1;
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let rate = |n: u64| {
            if self.total_parcels > 0 {
                n as f64 / self.total_parcels as f64 * 100.0
            } else {
                0.0
            }
        };
        MetricsSummary {
            total_parcels: self.total_parcels,
            noread_parcels: self.noread_parcels,
            unweighed_parcels: self.unweighed_parcels,
            rejected_parcels: self.rejected_parcels,
            noread_rate: rate(self.noread_parcels),
            unweighed_rate: rate(self.unweighed_parcels),
            weigh_wait_ms: StatsSummary::from(&self.weigh_wait_stats),
            weight_grams: StatsSummary::from(&self.weight_stats),
            chute_counts: self.chute_counts.clone(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Aggregated run summary
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_parcels: u64,
    pub noread_parcels: u64,
    pub unweighed_parcels: u64,
    pub rejected_parcels: u64,
    pub noread_rate: f64,
    pub unweighed_rate: f64,
    pub weigh_wait_ms: StatsSummary,
    pub weight_grams: StatsSummary,
    pub chute_counts: BTreeMap<i32, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Sorting Metrics Summary ===")?;
        writeln!(f, "Total parcels: {}", self.total_parcels)?;
        writeln!(
            f,
            "No-read parcels: {} ({:.2}%)",
            self.noread_parcels, self.noread_rate
        )?;
        writeln!(
            f,
            "Unweighed parcels: {} ({:.2}%)",
            self.unweighed_parcels, self.unweighed_rate
        )?;
        writeln!(f, "Rejected by dispatcher: {}", self.rejected_parcels)?;
        writeln!(f, "Scale wait (ms): {}", self.weigh_wait_ms)?;
        writeln!(f, "Weight (g): {}", self.weight_grams)?;

        if !self.chute_counts.is_empty() {
            writeln!(f, "Parcels per chute:")?;
            for (chute, count) in &self.chute_counts {
                writeln!(f, "  {}: {}", chute, count)?;
            }
        }

        Ok(())
    }
}

/// Statistic summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online mean / variance (Welford)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
