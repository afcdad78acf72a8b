//! Pipeline statistics and metrics.

use std::fmt;
use std::time::Duration;

use contracts::SampleIndex;
use dispatcher::DispatchReport;
use ingestion::MetricsSnapshot as IngestionSnapshot;
use observability::PipelineMetricsAggregator;

/// Why the pipeline stopped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StopReason {
    /// Ctrl+C or SIGTERM
    #[default]
    Signal,
    /// `--timeout` elapsed
    Timeout,
    /// Ingestion halted on its own (gap or lost source)
    Halted(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal => write!(f, "shutdown signal"),
            Self::Timeout => write!(f, "timeout"),
            Self::Halted(reason) => write!(f, "halted ({reason})"),
        }
    }
}

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Why the run ended
    pub stop_reason: StopReason,

    /// Total duration of the pipeline run
    pub duration: Duration,

    /// Source sample rate (Hz)
    pub sample_rate: f64,

    /// Number of buffered channels
    pub channels: usize,

    /// Samples committed per channel when ingestion stopped
    pub current_index: SampleIndex,

    /// Ingestion counters
    pub ingestion: IngestionSnapshot,

    /// Index where the last snapshot ended
    pub last_snapshot_index: SampleIndex,

    /// Per-sink delivery counters
    pub sinks: DispatchReport,

    /// Snapshot and event aggregates
    pub snapshot_metrics: PipelineMetricsAggregator,
}

impl PipelineStats {
    /// Ingested samples per second (per channel)
    pub fn sample_throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.current_index as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    pub fn halted(&self) -> Option<&str> {
        match &self.stop_reason {
            StopReason::Halted(reason) => Some(reason),
            _ => None,
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Pipeline Statistics                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Stopped by: {}", self.stop_reason);
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Channels: {} @ {} Hz", self.channels, self.sample_rate);
        println!("   ├─ Samples per channel: {}", self.current_index);
        println!("   └─ Throughput: {:.1} samples/s", self.sample_throughput());

        println!("\n📥 Ingestion");
        println!("   ├─ Frames appended: {}", self.ingestion.frames_appended);
        println!("   ├─ Frames rejected: {}", self.ingestion.frames_rejected);
        println!("   ├─ Decode errors: {}", self.ingestion.decode_errors);
        println!("   └─ Empty polls: {}", self.ingestion.empty_polls);

        let summary = self.snapshot_metrics.summary();

        println!("\n📈 Snapshots");
        println!("   ├─ Emitted: {}", summary.total_snapshots);
        println!("   ├─ Skipped firings: {}", summary.skipped_firings);
        println!("   ├─ Samples covered: {}", summary.total_samples);
        println!("   ├─ Last snapshot index: {}", self.last_snapshot_index);
        println!("   ├─ Samples per snapshot: {}", summary.samples_per_snapshot);
        println!("   └─ Interval (ms): {}", summary.snapshot_interval_ms);

        if !summary.event_counts.is_empty() {
            println!("\n⚡ Events ({})", summary.total_events);
            for (channel, count) in &summary.event_counts {
                println!("   ├─ {}: {}", channel, count);
            }
        }

        if !self.sinks.is_empty() {
            println!("\n📤 Sinks ({})", self.sinks.len());
            for (i, (name, m)) in self.sinks.iter().enumerate() {
                let prefix = if i == self.sinks.len() - 1 { "└─" } else { "├─" };
                println!(
                    "   {} {}: {} snapshots, {} event batches, {} failed, {} dropped, {} decimated",
                    prefix,
                    name,
                    m.write_count,
                    m.event_write_count,
                    m.failure_count,
                    m.dropped_count,
                    m.decimated_count
                );
            }
        }

        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throughput() {
        let stats = PipelineStats {
            duration: Duration::from_secs(2),
            current_index: 2000,
            ..Default::default()
        };
        assert_eq!(stats.sample_throughput(), 1000.0);
        assert_eq!(PipelineStats::default().sample_throughput(), 0.0);
    }

    #[test]
    fn test_halted_reason() {
        let stats = PipelineStats {
            stop_reason: StopReason::Halted("sequence gap".into()),
            ..Default::default()
        };
        assert_eq!(stats.halted(), Some("sequence gap"));
        assert_eq!(stats.stop_reason.to_string(), "halted (sequence gap)");

        assert!(PipelineStats::default().halted().is_none());
    }
}
