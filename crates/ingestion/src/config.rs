//! Ingestion loop configuration and metrics

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use contracts::SourceConfig;

/// Ingestion loop configuration
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    /// Bounded wait per `receive` call; shutdown is checked between polls
    pub poll_interval: Duration,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl From<&SourceConfig> for IngestionConfig {
    fn from(config: &SourceConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
        }
    }
}

/// Ingestion metrics
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Frames accepted into the buffer
    pub frames_appended: AtomicU64,

    /// Samples (rows) accepted into the buffer
    pub samples_appended: AtomicU64,

    /// Frames rejected by the buffer (column mismatch)
    pub frames_rejected: AtomicU64,

    /// Frames that could not be decoded
    pub decode_errors: AtomicU64,

    /// Polls that returned no frame
    pub empty_polls: AtomicU64,

    /// Last accepted sequence number + 1 (0 = none yet)
    pub next_sequence: AtomicU64,
}

impl IngestionMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an appended frame
    pub fn record_appended(&self, sequence: u64, rows: usize) {
        self.frames_appended.fetch_add(1, Ordering::Relaxed);
        self.samples_appended
            .fetch_add(rows as u64, Ordering::Relaxed);
        self.next_sequence
            .store(sequence.wrapping_add(1), Ordering::Relaxed);
    }

    /// Record a frame rejected by the buffer
    pub fn record_rejected(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record decode error
    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record empty poll
    pub fn record_empty_poll(&self) {
        self.empty_polls.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_appended: self.frames_appended.load(Ordering::Relaxed),
            samples_appended: self.samples_appended.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            empty_polls: self.empty_polls.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub frames_appended: u64,
    pub samples_appended: u64,
    pub frames_rejected: u64,
    pub decode_errors: u64,
    pub empty_polls: u64,
}
