//! Rolling per-channel sample store addressed by absolute sample index.
//!
//! Each channel keeps its most recent `capacity` samples in a `HeapRb<f64>`.
//! All rings advance together, so ring position `k` of every channel holds
//! sample `oldest_index + k`.
//!
//! The store is shared through two handles:
//! - [`BufferWriter`]: the single writer (ingestion loop), not `Clone`
//! - [`BufferReader`]: cloneable read-only view (display, scheduler, engine)
//!
//! Payload and `current_index` are committed under one write lock, so a
//! reader that observes `current_index = n` also observes samples `< n`.
//!
//! Frame timestamps are kept per retained frame and stamp the frame's last
//! row; other rows are placed at `1 / sample_rate` spacing inside their own
//! frame, so arrival jitter between frames does not leak across them.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use contracts::{ChannelId, Frame, IndexRange, SampleIndex};
use parking_lot::RwLock;
use ringbuf::{traits::*, HeapRb};
use tracing::trace;

use crate::error::BufferError;
use crate::window::Window;

/// Samples of several channels over one contiguous index range
#[derive(Debug, Clone, PartialEq)]
pub struct BufferSlice {
    /// Absolute index of the first value in every column
    pub start_index: SampleIndex,
    /// One column per requested channel, in request order
    pub columns: Vec<Vec<f64>>,
}

impl BufferSlice {
    /// Samples per column
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Half-open range covered by this slice
    pub fn range(&self) -> IndexRange {
        IndexRange::new(self.start_index, self.start_index + self.len() as u64)
    }
}

/// Shared buffer state
pub struct ChannelBuffer {
    rings: Vec<HeapRb<f64>>,
    lookup: HashMap<ChannelId, usize>,
    capacity: usize,
    sample_rate: f64,
    current_index: SampleIndex,
    /// `(end_index, timestamp_us)` of every frame with retained rows
    frame_times: VecDeque<(SampleIndex, i64)>,
}

impl fmt::Debug for ChannelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelBuffer")
            .field("channels", &self.rings.len())
            .field("capacity", &self.capacity)
            .field("current_index", &self.current_index)
            .finish()
    }
}

impl ChannelBuffer {
    fn new(channels: &[ChannelId], capacity: usize, sample_rate: f64) -> Self {
        Self {
            rings: channels.iter().map(|_| HeapRb::new(capacity)).collect(),
            lookup: channels
                .iter()
                .enumerate()
                .map(|(i, ch)| (ch.clone(), i))
                .collect(),
            capacity,
            sample_rate,
            current_index: 0,
            frame_times: VecDeque::new(),
        }
    }

    #[inline]
    fn oldest_index(&self) -> SampleIndex {
        self.current_index.saturating_sub(self.capacity as u64)
    }

    fn append(&mut self, frame: &Frame) -> Result<IndexRange, BufferError> {
        if frame.columns() != self.rings.len() {
            return Err(BufferError::ChannelMismatch {
                expected: self.rings.len(),
                actual: frame.columns(),
            });
        }

        let start = self.current_index;
        let rows = frame.rows();
        if rows == 0 {
            return Ok(IndexRange::new(start, start));
        }

        for (ring, column) in self.rings.iter_mut().zip(frame.samples.column_iter()) {
            for value in column.iter() {
                ring.push_overwrite(*value);
            }
        }

        self.current_index += rows as u64;
        self.frame_times.push_back((self.current_index, frame.timestamp_us));
        let oldest = self.oldest_index();
        while self.frame_times.front().is_some_and(|&(end, _)| end <= oldest) {
            self.frame_times.pop_front();
        }
        Ok(IndexRange::new(start, self.current_index))
    }

    /// Retained intersection of the inclusive range `[start, end]`, as
    /// `(first_index, ring_skip, count)`.
    fn clamp(
        &self,
        start: SampleIndex,
        end: SampleIndex,
    ) -> Result<Option<(SampleIndex, usize, usize)>, BufferError> {
        if start > end {
            return Err(BufferError::InvalidRange { start, end });
        }
        if self.current_index == 0 {
            return Ok(None);
        }
        let oldest = self.oldest_index();
        let lo = start.max(oldest);
        let hi = end.min(self.current_index - 1);
        if lo > hi {
            return Ok(None);
        }
        Ok(Some((lo, (lo - oldest) as usize, (hi - lo + 1) as usize)))
    }

    fn ring(&self, channel: &str) -> Result<&HeapRb<f64>, BufferError> {
        self.lookup
            .get(channel)
            .map(|&i| &self.rings[i])
            .ok_or_else(|| BufferError::UnknownChannel {
                channel: channel.to_string(),
            })
    }

    fn read(
        &self,
        channel: &str,
        start: SampleIndex,
        end: SampleIndex,
    ) -> Result<Vec<f64>, BufferError> {
        let ring = self.ring(channel)?;
        Ok(match self.clamp(start, end)? {
            Some((_, skip, take)) => ring.iter().skip(skip).take(take).copied().collect(),
            None => Vec::new(),
        })
    }

    fn read_channels(
        &self,
        channels: &[ChannelId],
        start: SampleIndex,
        end: SampleIndex,
    ) -> Result<BufferSlice, BufferError> {
        let rings = channels
            .iter()
            .map(|ch| self.ring(ch))
            .collect::<Result<Vec<_>, _>>()?;
        match self.clamp(start, end)? {
            Some((lo, skip, take)) => Ok(BufferSlice {
                start_index: lo,
                columns: rings
                    .into_iter()
                    .map(|ring| ring.iter().skip(skip).take(take).copied().collect())
                    .collect(),
            }),
            None => Ok(BufferSlice {
                start_index: start.max(self.oldest_index()),
                columns: vec![Vec::new(); channels.len()],
            }),
        }
    }

    fn last_timestamp_us(&self) -> Option<i64> {
        self.frame_times.back().map(|&(_, ts)| ts)
    }

    /// Acquisition time of `index`, placed relative to the frame holding it.
    /// Indices outside the retained frames use the nearest one.
    fn timestamp_at(&self, index: SampleIndex) -> Option<i64> {
        let pos = self.frame_times.partition_point(|&(end, _)| end <= index);
        let &(end, ts) = self
            .frame_times
            .get(pos)
            .or_else(|| self.frame_times.back())?;
        let behind = (end - 1) as f64 - index as f64;
        Some(ts - (behind * 1e6 / self.sample_rate).round() as i64)
    }
}

/// Create a buffer and its handles.
///
/// Capacity is `ceil(retention_sec * sample_rate)` samples per channel.
pub fn channel_buffer(
    channels: Vec<ChannelId>,
    sample_rate: f64,
    retention_sec: f64,
) -> Result<(BufferWriter, BufferReader), BufferError> {
    if channels.is_empty() {
        return Err(BufferError::InvalidConfig("no channels".into()));
    }
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        return Err(BufferError::InvalidConfig(format!(
            "sample rate must be positive, got {sample_rate}"
        )));
    }
    if !(retention_sec.is_finite() && retention_sec > 0.0) {
        return Err(BufferError::InvalidConfig(format!(
            "retention must be positive, got {retention_sec}"
        )));
    }
    let capacity = (retention_sec * sample_rate).ceil() as usize;

    let channels: Arc<[ChannelId]> = channels.into();
    let shared = Arc::new(RwLock::new(ChannelBuffer::new(&channels, capacity, sample_rate)));

    let reader = BufferReader {
        shared: Arc::clone(&shared),
        channels: Arc::clone(&channels),
        capacity,
        sample_rate,
    };
    let writer = BufferWriter {
        shared,
        reader: reader.clone(),
    };
    Ok((writer, reader))
}

/// Sole writer handle
#[derive(Debug)]
pub struct BufferWriter {
    shared: Arc<RwLock<ChannelBuffer>>,
    reader: BufferReader,
}

impl BufferWriter {
    /// Append one frame, returning the index range it occupies.
    pub fn append(&mut self, frame: &Frame) -> Result<IndexRange, BufferError> {
        let range = self.shared.write().append(frame)?;
        trace!(
            sequence = frame.sequence_number,
            start = range.start,
            end = range.end,
            "Frame appended"
        );
        Ok(range)
    }

    /// Read-only view of the same buffer
    pub fn reader(&self) -> BufferReader {
        self.reader.clone()
    }
}

/// Read-only handle, cheap to clone
#[derive(Clone)]
pub struct BufferReader {
    shared: Arc<RwLock<ChannelBuffer>>,
    channels: Arc<[ChannelId]>,
    capacity: usize,
    sample_rate: f64,
}

impl fmt::Debug for BufferReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferReader")
            .field("channels", &self.channels)
            .field("capacity", &self.capacity)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

impl BufferReader {
    /// Samples of `channel` in the inclusive range `[start, end]`.
    ///
    /// Indices outside the retained history are dropped; an empty
    /// intersection yields an empty vector.
    pub fn read(&self, channel: &str, start: SampleIndex, end: SampleIndex) -> Result<Vec<f64>, BufferError> {
        self.shared.read().read(channel, start, end)
    }

    /// Samples of `channel` covered by a resolved window
    pub fn read_window(&self, channel: &str, window: Window) -> Result<Vec<f64>, BufferError> {
        self.read(channel, window.start_index, window.end_index)
    }

    /// Several channels over the same inclusive range, read under one lock
    pub fn read_channels(
        &self,
        channels: &[ChannelId],
        start: SampleIndex,
        end: SampleIndex,
    ) -> Result<BufferSlice, BufferError> {
        self.shared.read().read_channels(channels, start, end)
    }

    /// Number of committed samples (next index to be written)
    pub fn current_index(&self) -> SampleIndex {
        self.shared.read().current_index
    }

    /// Oldest retained index
    pub fn oldest_index(&self) -> SampleIndex {
        self.shared.read().oldest_index()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn channel_names(&self) -> &[ChannelId] {
        &self.channels
    }

    pub fn has_channel(&self, channel: &str) -> bool {
        self.channels.iter().any(|ch| ch == channel)
    }

    /// Timestamp of the newest appended frame (microseconds)
    pub fn last_timestamp_us(&self) -> Option<i64> {
        self.shared.read().last_timestamp_us()
    }

    /// Estimated acquisition time of `index` (microseconds)
    pub fn timestamp_at(&self, index: SampleIndex) -> Option<i64> {
        self.shared.read().timestamp_at(index)
    }

    /// Retained samples over capacity, in `[0, 1]`
    pub fn fill_ratio(&self) -> f64 {
        let current = self.current_index();
        current.min(self.capacity as u64) as f64 / self.capacity as f64
    }

    /// Whether a full capacity of samples has ever been committed
    pub fn has_filled(&self) -> bool {
        self.current_index() >= self.capacity as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;
    use rand::Rng;

    fn channels() -> Vec<ChannelId> {
        vec!["u1".into(), "i1".into()]
    }

    /// Frame whose u1 column holds the absolute index and i1 its negation
    fn ramp_frame(seq: u64, first_index: u64, rows: usize) -> Frame {
        let samples = DMatrix::from_fn(rows, 2, |r, c| {
            let v = (first_index + r as u64) as f64;
            if c == 0 {
                v
            } else {
                -v
            }
        });
        Frame::new(seq, 0, samples)
    }

    #[test]
    fn test_append_assigns_contiguous_indices() {
        let (mut writer, reader) = channel_buffer(channels(), 100.0, 1.0).unwrap();

        assert_eq!(writer.append(&ramp_frame(0, 0, 30)).unwrap(), IndexRange::new(0, 30));
        assert_eq!(writer.append(&ramp_frame(1, 30, 20)).unwrap(), IndexRange::new(30, 50));
        assert_eq!(reader.current_index(), 50);
        assert_eq!(reader.read("u1", 28, 31).unwrap(), vec![28.0, 29.0, 30.0, 31.0]);
        assert_eq!(reader.read("i1", 49, 49).unwrap(), vec![-49.0]);
    }

    #[test]
    fn test_eviction_keeps_most_recent_capacity() {
        // capacity 50
        let (mut writer, reader) = channel_buffer(channels(), 100.0, 0.5).unwrap();
        let mut next = 0;
        for seq in 0..4 {
            writer.append(&ramp_frame(seq, next, 40)).unwrap();
            next += 40;
        }

        assert_eq!(reader.capacity(), 50);
        assert_eq!(reader.current_index(), 160);
        assert_eq!(reader.oldest_index(), 110);

        // Evicted indices read empty, retained ones are exact
        assert!(reader.read("u1", 0, 109).unwrap().is_empty());
        let tail = reader.read("u1", 0, 1_000).unwrap();
        assert_eq!(tail.len(), 50);
        assert_eq!(tail.first(), Some(&110.0));
        assert_eq!(tail.last(), Some(&159.0));
    }

    #[test]
    fn test_single_row_past_capacity_evicts_oldest() {
        // capacity 50
        let (mut writer, reader) = channel_buffer(channels(), 100.0, 0.5).unwrap();
        writer.append(&ramp_frame(0, 0, 50)).unwrap();
        assert_eq!(reader.read("u1", 0, 49).unwrap().len(), 50);

        writer.append(&ramp_frame(1, 50, 1)).unwrap();
        assert_eq!(reader.oldest_index(), 1);

        let values = reader.read("u1", 0, 49).unwrap();
        assert_eq!(values.len(), 49);
        assert_eq!(values.first(), Some(&1.0));
        assert_eq!(values.last(), Some(&49.0));
        assert_eq!(reader.read("i1", 50, 50).unwrap(), vec![-50.0]);
    }

    #[test]
    fn test_read_is_idempotent() {
        let (mut writer, reader) = channel_buffer(channels(), 100.0, 1.0).unwrap();
        writer.append(&ramp_frame(0, 0, 60)).unwrap();

        let first = reader.read("u1", 10, 40).unwrap();
        let second = reader.read("u1", 10, 40).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_read_errors() {
        let (mut writer, reader) = channel_buffer(channels(), 100.0, 1.0).unwrap();
        writer.append(&ramp_frame(0, 0, 10)).unwrap();

        assert!(matches!(
            reader.read("u1", 5, 4),
            Err(BufferError::InvalidRange { start: 5, end: 4 })
        ));
        assert!(matches!(
            reader.read("u9", 0, 1),
            Err(BufferError::UnknownChannel { .. })
        ));
        // Future indices intersect nothing
        assert!(reader.read("u1", 20, 30).unwrap().is_empty());
    }

    #[test]
    fn test_channel_mismatch_rejected() {
        let (mut writer, reader) = channel_buffer(channels(), 100.0, 1.0).unwrap();
        let frame = Frame::new(0, 0, DMatrix::zeros(10, 3));

        assert!(matches!(
            writer.append(&frame),
            Err(BufferError::ChannelMismatch { expected: 2, actual: 3 })
        ));
        assert_eq!(reader.current_index(), 0);
    }

    #[test]
    fn test_random_frame_sizes_sum() {
        let mut rng = rand::rng();
        let (mut writer, reader) = channel_buffer(channels(), 1000.0, 0.25).unwrap();

        let mut total = 0u64;
        for seq in 0..50 {
            let rows = rng.random_range(1..=120);
            let range = writer.append(&ramp_frame(seq, total, rows)).unwrap();
            assert_eq!(range.start, total);
            total += rows as u64;
        }

        assert_eq!(reader.current_index(), total);
        let newest = reader.read("u1", total - 1, total - 1).unwrap();
        assert_eq!(newest, vec![(total - 1) as f64]);
    }

    #[test]
    fn test_read_channels_shares_range() {
        let (mut writer, reader) = channel_buffer(channels(), 100.0, 1.0).unwrap();
        writer.append(&ramp_frame(0, 0, 20)).unwrap();

        let slice = reader
            .read_channels(&["i1".into(), "u1".into()], 15, 25)
            .unwrap();
        assert_eq!(slice.start_index, 15);
        assert_eq!(slice.range(), IndexRange::new(15, 20));
        assert_eq!(slice.columns[0], vec![-15.0, -16.0, -17.0, -18.0, -19.0]);
        assert_eq!(slice.columns[1][0], 15.0);
    }

    #[test]
    fn test_timestamp_extrapolation() {
        let (mut writer, reader) = channel_buffer(channels(), 1000.0, 1.0).unwrap();
        let mut frame = ramp_frame(0, 0, 100);
        frame.timestamp_us = 5_000_000;
        writer.append(&frame).unwrap();

        assert_eq!(reader.timestamp_at(99), Some(5_000_000));
        assert_eq!(reader.timestamp_at(89), Some(4_990_000));
        assert_eq!(reader.last_timestamp_us(), Some(5_000_000));
    }

    #[test]
    fn test_timestamps_follow_their_own_frame() {
        // 100 Hz, capacity 50
        let (mut writer, reader) = channel_buffer(channels(), 100.0, 0.5).unwrap();
        let mut first = ramp_frame(0, 0, 10);
        first.timestamp_us = 1_000_000;
        let mut second = ramp_frame(1, 10, 10);
        // arrives late
        second.timestamp_us = 1_500_000;
        writer.append(&first).unwrap();
        writer.append(&second).unwrap();

        assert_eq!(reader.timestamp_at(9), Some(1_000_000));
        assert_eq!(reader.timestamp_at(5), Some(960_000));
        assert_eq!(reader.timestamp_at(10), Some(1_410_000));
        assert_eq!(reader.timestamp_at(19), Some(1_500_000));

        // evicting the first frame drops its anchor
        let mut third = ramp_frame(2, 20, 40);
        third.timestamp_us = 1_900_000;
        writer.append(&third).unwrap();
        assert_eq!(reader.oldest_index(), 10);
        assert_eq!(reader.timestamp_at(15), Some(1_460_000));
        assert_eq!(reader.timestamp_at(59), Some(1_900_000));
        // before the retained frames: placed from the oldest one
        assert_eq!(reader.timestamp_at(9), Some(1_400_000));
        assert_eq!(reader.last_timestamp_us(), Some(1_900_000));
    }

    #[test]
    fn test_fill_ratio() {
        let (mut writer, reader) = channel_buffer(channels(), 100.0, 1.0).unwrap();
        assert_eq!(reader.fill_ratio(), 0.0);
        writer.append(&ramp_frame(0, 0, 50)).unwrap();
        assert!((reader.fill_ratio() - 0.5).abs() < 1e-12);
        assert!(!reader.has_filled());
        writer.append(&ramp_frame(1, 50, 80)).unwrap();
        assert_eq!(reader.fill_ratio(), 1.0);
        assert!(reader.has_filled());
    }

    #[test]
    fn test_invalid_construction() {
        assert!(channel_buffer(vec![], 100.0, 1.0).is_err());
        assert!(channel_buffer(channels(), 0.0, 1.0).is_err());
        assert!(channel_buffer(channels(), 100.0, -1.0).is_err());
    }
}
