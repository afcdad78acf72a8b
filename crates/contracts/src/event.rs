//! Event - Event Detector output

use serde::{Deserialize, Serialize};

use crate::{ChannelId, SampleIndex};

/// Which threshold the detector watches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Value fell below the threshold
    LevelLow,
    /// Value rose above the threshold
    LevelHigh,
}

/// Whether the channel entered or left the event condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventEdge {
    Enter,
    Exit,
}

/// Discrete occurrence on one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub channel: ChannelId,
    pub kind: EventKind,
    pub edge: EventEdge,
    /// Index of the sample where the condition began (enter) or ended (exit)
    pub sample_index: SampleIndex,
    /// Acquisition time of that sample (microseconds)
    pub timestamp_us: i64,
    pub value: f64,
}

/// Contiguous slice of one buffered channel handed to detectors
#[derive(Debug, Clone)]
pub struct ChannelWindow {
    pub channel: ChannelId,
    /// Absolute index of `values[0]`
    pub start_index: SampleIndex,
    pub sample_rate: f64,
    /// Acquisition time of `values[0]` (microseconds)
    pub start_timestamp_us: i64,
    pub values: Vec<f64>,
}

impl ChannelWindow {
    /// Absolute index of `values[offset]`
    #[inline]
    pub fn index_at(&self, offset: usize) -> SampleIndex {
        self.start_index + offset as u64
    }

    /// Acquisition time of `values[offset]`
    pub fn timestamp_at(&self, offset: usize) -> i64 {
        if self.sample_rate <= 0.0 {
            return self.start_timestamp_us;
        }
        self.start_timestamp_us + (offset as f64 * 1e6 / self.sample_rate).round() as i64
    }
}

/// Event detector capability
///
/// Detectors are stateful: consecutive windows of the same channel are
/// contiguous, so a condition spanning two windows is reported once.
pub trait EventDetector: Send {
    /// Channel this detector watches
    fn channel(&self) -> &ChannelId;

    /// Evaluate newly buffered samples
    fn evaluate(&mut self, window: &ChannelWindow) -> Vec<Event>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_index_and_time() {
        let window = ChannelWindow {
            channel: "u1".into(),
            start_index: 500,
            sample_rate: 1000.0,
            start_timestamp_us: 2_000_000,
            values: vec![0.0; 10],
        };
        assert_eq!(window.index_at(3), 503);
        assert_eq!(window.timestamp_at(3), 2_003_000);
    }

    #[test]
    fn test_event_kind_serde() {
        let json = serde_json::to_string(&EventKind::LevelHigh).unwrap();
        assert_eq!(json, "\"level_high\"");
    }
}
