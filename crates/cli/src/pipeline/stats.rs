//! Pipeline statistics and metrics.

use std::time::Duration;

use correlation::CorrelationStats;
use dispatcher::DispatcherMetricsSnapshot;
use observability::{ParcelOutcome, SortingMetricsAggregator};
use weighing::WeighingMetricsSnapshot;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Parcels that left the correlation stage
    pub parcels: u64,

    /// Parcels accepted by the dispatcher
    pub dispatched: u64,

    /// Total duration of the pipeline run
    pub duration: Duration,

    /// Correlation counters at shutdown
    pub correlation: CorrelationStats,

    /// Scale link counters at shutdown
    pub weighing: WeighingMetricsSnapshot,

    /// Actuation counters at shutdown
    pub actuation: DispatcherMetricsSnapshot,

    /// Frames seen on the simulated bus, None on a real link
    pub bus_frames: Option<usize>,

    /// Per-parcel aggregator
    pub sorting: SortingMetricsAggregator,
}

impl PipelineStats {
    /// Fold one routed parcel into the run totals
    pub fn record(&mut self, outcome: &ParcelOutcome) {
        self.parcels += 1;
        if outcome.dispatched {
            self.dispatched += 1;
        }
        self.sorting.update(outcome);
    }

    /// Parcels per second
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.parcels as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Pipeline Statistics                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Parcels: {}", self.parcels);
        println!("   ├─ Dispatched: {}", self.dispatched);
        println!("   └─ Throughput: {:.2} parcels/s", self.throughput());

        let c = &self.correlation;
        println!("\n🔗 Correlation");
        println!("   ├─ Scanner events: {}", c.events_ingested);
        println!("   ├─ Reads merged: {}", c.reads_merged());
        println!("   ├─ Duplicates suppressed: {}", c.duplicates_suppressed);
        println!("   └─ No-read records: {}", c.noread_records);

        let w = &self.weighing;
        println!("\n⚖️  Weighing");
        println!("   ├─ Bytes received: {}", w.bytes_received);
        println!("   ├─ Samples published: {}", w.samples_published);
        println!("   ├─ Buffer discards: {}", w.buffer_discards);
        println!(
            "   ├─ Queries: {} hit / {} zero / {} miss",
            w.query_hits, w.query_zero_fallbacks, w.query_misses
        );
        println!("   └─ Reconnects: {}", w.reconnects);

        let a = &self.actuation;
        println!("\n🔌 Actuation");
        println!(
            "   ├─ Sequences: {} completed / {} failed / {} skipped / {} cancelled",
            a.completed, a.failed, a.skipped, a.cancelled
        );
        println!(
            "   ├─ Car commands: {} sent / {} failed",
            a.commands_sent, a.commands_failed
        );
        println!("   ├─ Peak in flight: {}", a.peak_in_flight);
        match self.bus_frames {
            Some(frames) => {
                println!("   ├─ Reconnects: {}", a.reconnects);
                println!("   └─ Simulated bus frames: {}", frames);
            }
            None => println!("   └─ Reconnects: {}", a.reconnects),
        }

        let summary = self.sorting.summary();
        println!("\n📦 Sorting");
        println!(
            "   ├─ No-read: {} ({:.2}%)",
            summary.noread_parcels, summary.noread_rate
        );
        println!(
            "   ├─ Unweighed: {} ({:.2}%)",
            summary.unweighed_parcels, summary.unweighed_rate
        );
        println!("   ├─ Rejected: {}", summary.rejected_parcels);
        println!("   ├─ Scale wait (ms): {}", summary.weigh_wait_ms);
        println!("   └─ Weight (g): {}", summary.weight_grams);

        if !summary.chute_counts.is_empty() {
            println!("\n🗂️  Parcels per chute");
            let last = summary.chute_counts.len() - 1;
            for (i, (chute, count)) in summary.chute_counts.iter().enumerate() {
                let prefix = if i == last { "└─" } else { "├─" };
                println!("   {} {}: {}", prefix, chute, count);
            }
        }

        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts_dispatched() {
        let mut stats = PipelineStats::default();
        stats.record(&ParcelOutcome {
            readable: true,
            weight_grams: Some(1200.0),
            weigh_wait_ms: 3.0,
            chute: Some(2),
            dispatched: true,
        });
        stats.record(&ParcelOutcome {
            readable: false,
            weight_grams: None,
            weigh_wait_ms: 0.0,
            chute: None,
            dispatched: false,
        });

        assert_eq!(stats.parcels, 2);
        assert_eq!(stats.dispatched, 1);
        let summary = stats.sorting.summary();
        assert_eq!(summary.noread_parcels, 1);
        assert_eq!(summary.rejected_parcels, 1);
        assert_eq!(summary.chute_counts.get(&2), Some(&1));
    }

    #[test]
    fn test_throughput() {
        let mut stats = PipelineStats::default();
        assert_eq!(stats.throughput(), 0.0);
        stats.parcels = 10;
        stats.duration = Duration::from_secs(4);
        assert!((stats.throughput() - 2.5).abs() < 1e-9);
    }
}
