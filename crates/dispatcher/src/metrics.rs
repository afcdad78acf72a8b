//! Per-sink delivery counters

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Metrics for a single sink
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Current queue length
    queue_len: AtomicUsize,
    /// Successful snapshot writes
    write_count: AtomicU64,
    /// Successful event batch writes
    event_write_count: AtomicU64,
    /// Failed writes of either kind
    failure_count: AtomicU64,
    /// Messages dropped due to a full queue
    dropped_count: AtomicU64,
    /// Snapshots held back by the cadence gate
    decimated_count: AtomicU64,
    /// Snapshots rejected for starting before the last delivered end
    out_of_order_count: AtomicU64,
}

impl SinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::Relaxed)
    }

    pub fn inc_write_count(&self) {
        self.write_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_write_count(&self) -> u64 {
        self.event_write_count.load(Ordering::Relaxed)
    }

    pub fn inc_event_write_count(&self) {
        self.event_write_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    pub fn inc_dropped_count(&self) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decimated_count(&self) -> u64 {
        self.decimated_count.load(Ordering::Relaxed)
    }

    pub fn inc_decimated_count(&self) {
        self.decimated_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn out_of_order_count(&self) -> u64 {
        self.out_of_order_count.load(Ordering::Relaxed)
    }

    pub fn inc_out_of_order_count(&self) {
        self.out_of_order_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            write_count: self.write_count(),
            event_write_count: self.event_write_count(),
            failure_count: self.failure_count(),
            dropped_count: self.dropped_count(),
            decimated_count: self.decimated_count(),
            out_of_order_count: self.out_of_order_count(),
        }
    }
}

/// Snapshot of sink metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub write_count: u64,
    pub event_write_count: u64,
    pub failure_count: u64,
    pub dropped_count: u64,
    pub decimated_count: u64,
    pub out_of_order_count: u64,
}
