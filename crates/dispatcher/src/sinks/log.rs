//! LogSink - logs snapshot and event summaries via tracing

use contracts::{ContractError, DataSink, Event, Snapshot};
use tracing::{info, instrument};

/// Sink that logs snapshot summaries for debugging
pub struct LogSink {
    name: String,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn log_snapshot_summary(&self, snapshot: &Snapshot) {
        let scalars = snapshot
            .values
            .iter()
            .filter_map(|(ch, v)| v.as_scalar().map(|v| format!("{ch}={v:.3}")))
            .collect::<Vec<_>>()
            .join(" ");

        info!(
            sink = %self.name,
            snapshot_id = snapshot.snapshot_id,
            range = %snapshot.range,
            outputs = snapshot.values.len(),
            "Snapshot received: {scalars}"
        );
    }
}

impl DataSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write_snapshot",
        skip(self, snapshot),
        fields(sink = %self.name, snapshot_id = snapshot.snapshot_id)
    )]
    async fn write_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), ContractError> {
        self.log_snapshot_summary(snapshot);
        Ok(())
    }

    #[instrument(
        name = "log_sink_write_events",
        skip(self, events),
        fields(sink = %self.name, count = events.len())
    )]
    async fn write_events(&mut self, events: &[Event]) -> Result<(), ContractError> {
        for event in events {
            info!(
                sink = %self.name,
                channel = %event.channel,
                kind = ?event.kind,
                edge = ?event.edge,
                index = event.sample_index,
                value = event.value,
                "Event"
            );
        }
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        // Nothing to flush for log sink
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, "LogSink closed");
        Ok(())
    }
}
