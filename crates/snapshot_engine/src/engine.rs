//! Derived-quantity engines.
//!
//! An engine consumes committed samples incrementally (`process`) and
//! answers aggregation requests over absolute index ranges.

use std::collections::VecDeque;

use channel_buffer::{BufferReader, BufferSlice};
use contracts::{
    ChannelId, EngineConfig, IndexRange, OutputChannelSet, OutputValues, SampleIndex,
    SnapshotValue, CHANNEL_STAT_SUFFIXES, PHASE_STAT_SUFFIXES,
};
use tracing::{instrument, trace, warn};

use crate::error::EngineError;

/// Derived-quantity engine capability
pub trait DerivedQuantityEngine: Send {
    /// Statically known output channels
    fn output_channels(&self) -> &OutputChannelSet;

    /// Consume samples committed since the last call.
    ///
    /// Returns the newly processed range (empty when nothing was new).
    fn process(&mut self) -> Result<IndexRange, EngineError>;

    /// Aggregated outputs over the half-open range `range`.
    ///
    /// Every output channel is present in the result; channels with no
    /// contributing samples are `SnapshotValue::Missing`.
    fn get_aggregated_data(&mut self, range: IndexRange) -> Result<OutputValues, EngineError>;
}

/// Running moments of one channel
#[derive(Debug, Clone, Copy)]
struct Moments {
    count: u64,
    sum: f64,
    sum_sq: f64,
    min: f64,
    max: f64,
}

impl Default for Moments {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sum_sq: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl Moments {
    fn push(&mut self, v: f64) {
        self.count += 1;
        self.sum += v;
        self.sum_sq += v * v;
        self.min = self.min.min(v);
        self.max = self.max.max(v);
    }

    fn merge(&mut self, other: &Moments) {
        self.count += other.count;
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    fn values(&self) -> [SnapshotValue; 4] {
        if self.count == 0 {
            return [(); 4].map(|_| SnapshotValue::Missing);
        }
        let n = self.count as f64;
        [
            SnapshotValue::Scalar(self.sum / n),
            SnapshotValue::Scalar((self.sum_sq / n).sqrt()),
            SnapshotValue::Scalar(self.min),
            SnapshotValue::Scalar(self.max),
        ]
    }
}

/// Running products of one voltage/current pair
#[derive(Debug, Clone, Copy, Default)]
struct PhaseMoments {
    count: u64,
    u_sq: f64,
    i_sq: f64,
    ui: f64,
}

impl PhaseMoments {
    fn push(&mut self, u: f64, i: f64) {
        self.count += 1;
        self.u_sq += u * u;
        self.i_sq += i * i;
        self.ui += u * i;
    }

    fn merge(&mut self, other: &PhaseMoments) {
        self.count += other.count;
        self.u_sq += other.u_sq;
        self.i_sq += other.i_sq;
        self.ui += other.ui;
    }

    fn values(&self) -> [SnapshotValue; 3] {
        if self.count == 0 {
            return [(); 3].map(|_| SnapshotValue::Missing);
        }
        let n = self.count as f64;
        [
            SnapshotValue::Scalar((self.u_sq / n).sqrt()),
            SnapshotValue::Scalar((self.i_sq / n).sqrt()),
            SnapshotValue::Scalar(self.ui / n),
        ]
    }
}

/// Moments over one processed index range
#[derive(Debug, Clone)]
struct Chunk {
    range: IndexRange,
    channels: Vec<Moments>,
    phases: Vec<PhaseMoments>,
}

/// Input binding of one phase: positions in the read set
#[derive(Debug, Clone)]
struct PhaseBinding {
    name: ChannelId,
    u: usize,
    i: usize,
}

/// Reference engine: per-channel mean/rms/min/max and per-phase power.
///
/// Outputs `<ch>_mean`, `<ch>_rms`, `<ch>_min`, `<ch>_max` for every input
/// channel and `<phase>_u_rms`, `<phase>_i_rms`, `<phase>_p_avg` for every
/// configured phase.
pub struct WindowStatsEngine {
    reader: BufferReader,
    /// Channels read from the buffer (inputs first, then extra phase channels)
    read_set: Vec<ChannelId>,
    /// Number of summarized input channels (prefix of `read_set`)
    inputs: usize,
    phases: Vec<PhaseBinding>,
    outputs: OutputChannelSet,
    /// Processed ranges not yet superseded, oldest first
    chunks: VecDeque<Chunk>,
    /// Next index to process
    processed: SampleIndex,
}

impl std::fmt::Debug for WindowStatsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowStatsEngine")
            .field("inputs", &self.inputs)
            .field("phases", &self.phases.len())
            .field("chunks", &self.chunks.len())
            .field("processed", &self.processed)
            .finish()
    }
}

impl WindowStatsEngine {
    pub fn new(reader: BufferReader, config: &EngineConfig) -> Result<Self, EngineError> {
        let source_channels = reader.channel_names().to_vec();
        let mut read_set = config.input_channels(&source_channels);
        let inputs = read_set.len();

        let position = |name: &str, read_set: &mut Vec<ChannelId>| -> Result<usize, EngineError> {
            if !reader.has_channel(name) {
                return Err(EngineError::UnknownChannel {
                    channel: name.to_string(),
                });
            }
            Ok(match read_set.iter().position(|ch| ch == name) {
                Some(pos) => pos,
                None => {
                    read_set.push(ChannelId::from(name));
                    read_set.len() - 1
                }
            })
        };

        for ch in read_set.clone() {
            position(&ch, &mut read_set)?;
        }
        let phases = config
            .phases
            .iter()
            .map(|phase| {
                Ok(PhaseBinding {
                    name: ChannelId::from(&phase.name),
                    u: position(&phase.u_channel, &mut read_set)?,
                    i: position(&phase.i_channel, &mut read_set)?,
                })
            })
            .collect::<Result<Vec<_>, EngineError>>()?;

        let processed = reader.current_index();
        Ok(Self {
            outputs: config.output_channels(&source_channels),
            reader,
            read_set,
            inputs,
            phases,
            chunks: VecDeque::new(),
            processed,
        })
    }

    /// Next index the engine will process
    pub fn processed_index(&self) -> SampleIndex {
        self.processed
    }

    fn accumulate(&self, slice: &BufferSlice) -> Chunk {
        let mut channels = vec![Moments::default(); self.inputs];
        for (moments, column) in channels.iter_mut().zip(&slice.columns) {
            column.iter().for_each(|&v| moments.push(v));
        }

        let mut phases = vec![PhaseMoments::default(); self.phases.len()];
        for (moments, binding) in phases.iter_mut().zip(&self.phases) {
            let (u, i) = (&slice.columns[binding.u], &slice.columns[binding.i]);
            u.iter().zip(i).for_each(|(&u, &i)| moments.push(u, i));
        }

        Chunk {
            range: slice.range(),
            channels,
            phases,
        }
    }

    /// Process up to (not including) `until`, bounded by committed data.
    fn advance(&mut self, until: SampleIndex) -> Result<IndexRange, EngineError> {
        let until = until.min(self.reader.current_index());
        if until <= self.processed {
            return Ok(IndexRange::new(self.processed, self.processed));
        }

        let oldest = self.reader.oldest_index();
        if self.processed < oldest {
            warn!(
                lost = oldest - self.processed,
                processed = self.processed,
                "Engine fell behind buffer retention, samples skipped"
            );
        }

        let slice = self
            .reader
            .read_channels(&self.read_set, self.processed, until - 1)?;
        let chunk = self.accumulate(&slice);
        let range = chunk.range;
        trace!(start = range.start, end = range.end, "Engine processed");
        if !range.is_empty() {
            self.chunks.push_back(chunk);
        }
        self.processed = until;
        Ok(range)
    }

    /// Moments over `range`, re-read from the buffer.
    fn partial(&self, range: IndexRange) -> Result<Option<Chunk>, EngineError> {
        if range.is_empty() {
            return Ok(None);
        }
        let slice = self
            .reader
            .read_channels(&self.read_set, range.start, range.end - 1)?;
        if (slice.len() as u64) < range.len() {
            warn!(%range, retained = slice.len(), "Aggregation range partly evicted");
        }
        Ok(Some(self.accumulate(&slice)))
    }
}

impl DerivedQuantityEngine for WindowStatsEngine {
    fn output_channels(&self) -> &OutputChannelSet {
        &self.outputs
    }

    fn process(&mut self) -> Result<IndexRange, EngineError> {
        self.advance(SampleIndex::MAX)
    }

    #[instrument(
        level = "debug",
        name = "stats_engine_aggregate",
        skip_all,
        fields(range = %range)
    )]
    fn get_aggregated_data(&mut self, range: IndexRange) -> Result<OutputValues, EngineError> {
        if range.start > range.end {
            return Err(EngineError::InvalidRange {
                start: range.start,
                end: range.end,
            });
        }
        self.advance(range.end)?;

        let mut channels = vec![Moments::default(); self.inputs];
        let mut phases = vec![PhaseMoments::default(); self.phases.len()];
        let mut merge = |chunk: &Chunk| {
            channels
                .iter_mut()
                .zip(&chunk.channels)
                .for_each(|(acc, m)| acc.merge(m));
            phases
                .iter_mut()
                .zip(&chunk.phases)
                .for_each(|(acc, m)| acc.merge(m));
        };

        for chunk in &self.chunks {
            let overlap = IndexRange::new(
                chunk.range.start.max(range.start),
                chunk.range.end.min(range.end),
            );
            if overlap.is_empty() {
                continue;
            }
            if overlap == chunk.range {
                merge(chunk);
            } else if let Some(part) = self.partial(overlap)? {
                merge(&part);
            }
        }

        // Ranges before this request are not needed again
        while self
            .chunks
            .front()
            .is_some_and(|chunk| chunk.range.end <= range.start)
        {
            self.chunks.pop_front();
        }

        let mut values = OutputValues::new();
        for (ch, moments) in self.read_set[..self.inputs].iter().zip(&channels) {
            for (suffix, value) in CHANNEL_STAT_SUFFIXES.iter().zip(moments.values()) {
                values.insert(ch.suffixed(suffix), value);
            }
        }
        for (binding, moments) in self.phases.iter().zip(&phases) {
            for (suffix, value) in PHASE_STAT_SUFFIXES.iter().zip(moments.values()) {
                values.insert(binding.name.suffixed(suffix), value);
            }
        }
        Ok(values)
    }
}
