//! PipelineBlueprint - Config Loader output
//!
//! Describes the complete pipeline: frame source endpoint, buffer retention,
//! display span bounds, engine channel bindings, snapshot trigger, storage
//! plans and event detectors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::{ChannelId, EventKind, OutputChannelSet};

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineBlueprint {
    #[serde(default)]
    pub version: ConfigVersion,

    /// Frame source settings
    pub source: SourceConfig,

    /// Rolling buffer settings
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Live display bounds
    #[serde(default)]
    pub display: DisplayConfig,

    /// Derived-quantity engine bindings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Snapshot scheduler settings
    #[serde(default)]
    pub snapshot: SnapshotConfig,

    /// Storage plans (one sink each)
    #[serde(default)]
    pub storage: Vec<StoragePlanConfig>,

    /// Event detector thresholds
    #[serde(default)]
    pub detectors: Vec<DetectorConfig>,
}

/// Where frames come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Length-prefixed frames over TCP
    #[default]
    Tcp,
    /// Built-in sine generator (no acquisition hardware needed)
    Synthetic,
}

/// Frame source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,

    /// Acquisition server host
    #[serde(default = "default_source_host")]
    pub host: String,

    /// Acquisition server port
    #[serde(default = "default_source_port")]
    pub port: u16,

    /// Bounded wait for the next frame (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Generator settings, used when `kind = "synthetic"`
    #[serde(default)]
    pub synthetic: SyntheticConfig,
}

impl SourceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_source_host() -> String {
    "localhost".to_string()
}

fn default_source_port() -> u16 {
    50001
}

fn default_poll_interval_ms() -> u64 {
    50
}

/// Sine generator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    /// Samples per second per channel
    pub sample_rate: f64,
    /// Channel names (payload column order)
    pub channels: Vec<String>,
    /// Rows per frame
    pub frame_rows: usize,
    /// Fundamental frequency of the generated signal (Hz)
    pub signal_hz: f64,
    /// Peak amplitude
    pub amplitude: f64,
    /// Pace frames to wall-clock time
    pub realtime: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            sample_rate: 1000.0,
            channels: vec!["u1".into(), "i1".into()],
            frame_rows: 100,
            signal_hz: 50.0,
            amplitude: 325.0,
            realtime: true,
        }
    }
}

/// Rolling buffer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Retained history (seconds); capacity = retention * sample rate
    pub retention_sec: f64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            retention_sec: 10.0,
        }
    }
}

/// Live display span bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub min_span_sec: f64,
    pub max_span_sec: f64,
    pub default_span_sec: f64,
    /// Display refresh period (milliseconds)
    pub refresh_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            min_span_sec: 0.01,
            max_span_sec: 10.0,
            default_span_sec: 0.1,
            refresh_ms: 100,
        }
    }
}

/// Per-phase channel binding (voltage/current pair)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseConfig {
    pub name: String,
    pub u_channel: String,
    pub i_channel: String,
}

/// Derived-quantity engine bindings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Input channels summarized individually (empty = every source channel)
    #[serde(default)]
    pub channels: Vec<String>,

    /// Voltage/current pairs
    #[serde(default)]
    pub phases: Vec<PhaseConfig>,
}

/// Per-channel statistics produced by the reference engine
pub const CHANNEL_STAT_SUFFIXES: [&str; 4] = ["mean", "rms", "min", "max"];

/// Per-phase quantities produced by the reference engine
pub const PHASE_STAT_SUFFIXES: [&str; 3] = ["u_rms", "i_rms", "p_avg"];

impl EngineConfig {
    /// Input channels to summarize, given the source layout
    pub fn input_channels(&self, source_channels: &[ChannelId]) -> Vec<ChannelId> {
        if self.channels.is_empty() {
            source_channels.to_vec()
        } else {
            self.channels.iter().map(ChannelId::from).collect()
        }
    }

    /// Output channels of the reference statistics engine
    pub fn output_channels(&self, source_channels: &[ChannelId]) -> OutputChannelSet {
        let per_channel = self
            .input_channels(source_channels)
            .into_iter()
            .flat_map(|ch| CHANNEL_STAT_SUFFIXES.map(|suffix| ch.suffixed(suffix)));
        let per_phase = self.phases.iter().flat_map(|phase| {
            let name = ChannelId::from(&phase.name);
            PHASE_STAT_SUFFIXES.map(|suffix| name.suffixed(suffix))
        });
        OutputChannelSet::new(per_channel.chain(per_phase))
    }
}

/// Interval expressed in wall seconds or in samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    Seconds(f64),
    Samples(u64),
}

impl Cadence {
    /// Equivalent sample count at `sample_rate` (at least 1)
    pub fn to_samples(self, sample_rate: f64) -> u64 {
        match self {
            Self::Seconds(s) => ((s * sample_rate).round() as u64).max(1),
            Self::Samples(n) => n.max(1),
        }
    }

    /// Equivalent duration at `sample_rate`
    pub fn to_duration(self, sample_rate: f64) -> Duration {
        match self {
            Self::Seconds(s) => Duration::from_secs_f64(s.max(0.0)),
            Self::Samples(n) if sample_rate > 0.0 => Duration::from_secs_f64(n as f64 / sample_rate),
            Self::Samples(_) => Duration::ZERO,
        }
    }

    pub fn is_positive(self) -> bool {
        match self {
            Self::Seconds(s) => s > 0.0,
            Self::Samples(n) => n > 0,
        }
    }
}

/// Snapshot scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Firing cadence
    #[serde(default = "default_snapshot_trigger")]
    pub trigger: Cadence,

    /// Tick period used to check sample-count triggers and run detectors
    /// (milliseconds)
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            trigger: default_snapshot_trigger(),
            tick_ms: default_tick_ms(),
        }
    }
}

fn default_snapshot_trigger() -> Cadence {
    Cadence::Seconds(1.0)
}

fn default_tick_ms() -> u64 {
    50
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Log output
    Log,
    /// CSV file
    Csv,
    /// UDP publisher
    Network,
}

/// Storage plan: one sink, a channel subset and a cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoragePlanConfig {
    /// Sink name
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Output channels delivered to this sink (empty = all)
    #[serde(default)]
    pub channels: Vec<String>,

    /// Delivery cadence (absent = every firing)
    #[serde(default)]
    pub cadence: Option<Cadence>,

    /// Whether detected events are delivered
    #[serde(default = "default_events")]
    pub events: bool,

    /// Queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_events() -> bool {
    true
}

fn default_queue_capacity() -> usize {
    100
}

/// Level detector thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Watched input channel
    pub channel: String,

    pub kind: EventKind,

    pub threshold: f64,

    /// Distance back across the threshold required to leave the condition
    #[serde(default)]
    pub hysteresis: f64,

    /// Minimum time the condition must hold before it is reported (seconds)
    #[serde(default)]
    pub min_duration_sec: f64,
}

impl PipelineBlueprint {
    /// Source channel names when they are known without connecting
    pub fn static_source_channels(&self) -> Option<Vec<ChannelId>> {
        match self.source.kind {
            SourceKind::Synthetic => Some(
                self.source
                    .synthetic
                    .channels
                    .iter()
                    .map(ChannelId::from)
                    .collect(),
            ),
            SourceKind::Tcp => None,
        }
    }
}
