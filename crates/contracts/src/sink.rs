//! DataSink trait - Dispatcher output interface
//!
//! Storage sinks are implemented by collaborators (files, message buses, ...).

use crate::{ContractError, Event, Snapshot};

/// Storage sink
///
/// Writes are append-only. Within one sink, snapshots arrive strictly ordered
/// by increasing index range, at most once per scheduler firing.
#[trait_variant::make(DataSink: Send)]
pub trait LocalDataSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one snapshot, already restricted to this sink's channels
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), ContractError>;

    /// Write detected events
    async fn write_events(&mut self, events: &[Event]) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
