//! CsvSink - appends snapshots as CSV records

use contracts::{ChannelId, ContractError, DataSink, Event, EventEdge, EventKind, Snapshot, SnapshotValue};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, error, instrument};

/// Configuration for CsvSink
#[derive(Debug, Clone)]
pub struct CsvSinkConfig {
    /// Snapshot file
    pub path: PathBuf,
    /// Separate event file (events are discarded when absent)
    pub events_path: Option<PathBuf>,
}

impl CsvSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let path = params
            .get("path")
            .map(PathBuf::from)
            .ok_or_else(|| "missing 'path' parameter".to_string())?;

        Ok(Self {
            path,
            events_path: params.get("events_path").map(PathBuf::from),
        })
    }
}

/// Sink that writes one CSV record per snapshot.
///
/// The header `timestamp,<keys>` is fixed by the first snapshot. The
/// timestamp column is in seconds, values use three decimals, and
/// non-scalar or absent values leave the field empty.
pub struct CsvSink {
    name: String,
    config: CsvSinkConfig,
    writer: Option<csv::Writer<BufWriter<File>>>,
    events_writer: Option<csv::Writer<BufWriter<File>>>,
    columns: Vec<ChannelId>,
}

const EVENT_HEADER: [&str; 6] = ["timestamp", "channel", "kind", "edge", "sample_index", "value"];

fn create(path: &Path) -> Result<csv::Writer<BufWriter<File>>, csv::Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    Ok(csv::WriterBuilder::new()
        .delimiter(b',')
        .from_writer(BufWriter::new(file)))
}

fn seconds(timestamp_us: i64) -> String {
    format!("{:.3}", timestamp_us as f64 / 1_000_000.0)
}

fn kind_label(kind: EventKind) -> &'static str {
    match kind {
        EventKind::LevelLow => "level_low",
        EventKind::LevelHigh => "level_high",
    }
}

fn edge_label(edge: EventEdge) -> &'static str {
    match edge {
        EventEdge::Enter => "enter",
        EventEdge::Exit => "exit",
    }
}

impl CsvSink {
    /// Create a new CsvSink, truncating existing files
    pub fn new(name: impl Into<String>, config: CsvSinkConfig) -> Result<Self, csv::Error> {
        let writer = create(&config.path)?;
        let events_writer = match &config.events_path {
            Some(path) => {
                let mut w = create(path)?;
                w.write_record(EVENT_HEADER)?;
                Some(w)
            }
            None => None,
        };

        Ok(Self {
            name: name.into(),
            config,
            writer: Some(writer),
            events_writer,
            columns: Vec::new(),
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, csv::Error> {
        let config = CsvSinkConfig::from_params(params)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        Self::new(name, config)
    }

    fn write_row(&mut self, snapshot: &Snapshot) -> Result<(), csv::Error> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| std::io::Error::other("sink closed"))?;

        if self.columns.is_empty() {
            self.columns = snapshot.values.keys().cloned().collect();
            let header = std::iter::once("timestamp").chain(self.columns.iter().map(|c| c.as_str()));
            writer.write_record(header)?;
        }

        let mut record = Vec::with_capacity(self.columns.len() + 1);
        record.push(seconds(snapshot.timestamp_us));
        for column in &self.columns {
            match snapshot.values.get(column) {
                Some(SnapshotValue::Scalar(v)) => record.push(format!("{v:.3}")),
                _ => record.push(String::new()),
            }
        }
        writer.write_record(&record)
    }

    fn write_event_rows(&mut self, events: &[Event]) -> Result<(), csv::Error> {
        let Some(writer) = self.events_writer.as_mut() else {
            return Ok(());
        };
        for event in events {
            writer.write_record([
                seconds(event.timestamp_us).as_str(),
                event.channel.as_str(),
                kind_label(event.kind),
                edge_label(event.edge),
                event.sample_index.to_string().as_str(),
                format!("{:.3}", event.value).as_str(),
            ])?;
        }
        Ok(())
    }

    fn csv_error(&self, e: csv::Error) -> ContractError {
        error!(sink = %self.name, path = %self.config.path.display(), error = %e, "Write failed");
        ContractError::sink_write(&self.name, e.to_string())
    }
}

impl DataSink for CsvSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "csv_sink_write_snapshot",
        skip(self, snapshot),
        fields(sink = %self.name, snapshot_id = snapshot.snapshot_id)
    )]
    async fn write_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), ContractError> {
        self.write_row(snapshot).map_err(|e| self.csv_error(e))
    }

    #[instrument(
        name = "csv_sink_write_events",
        skip(self, events),
        fields(sink = %self.name, count = events.len())
    )]
    async fn write_events(&mut self, events: &[Event]) -> Result<(), ContractError> {
        self.write_event_rows(events).map_err(|e| self.csv_error(e))
    }

    #[instrument(name = "csv_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        if let Some(w) = self.writer.as_mut() {
            w.flush()?;
        }
        if let Some(w) = self.events_writer.as_mut() {
            w.flush()?;
        }
        Ok(())
    }

    #[instrument(name = "csv_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.flush().await?;
        self.writer = None;
        self.events_writer = None;
        debug!(sink = %self.name, "CsvSink closed");
        Ok(())
    }
}
