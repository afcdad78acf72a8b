//! Level event detectors.

use channel_buffer::BufferReader;
use contracts::{
    ChannelId, ChannelWindow, DetectorConfig, Event, EventDetector, EventEdge, EventKind,
    SampleIndex,
};
use tracing::{debug, warn};

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq)]
enum LevelState {
    /// Condition not present
    Idle,
    /// Condition present, minimum duration not reached yet
    Pending {
        since: SampleIndex,
        since_us: i64,
        value: f64,
    },
    /// Condition reported
    Active,
}

/// Threshold detector with hysteresis and minimum duration.
///
/// `LevelHigh` enters when a sample exceeds `threshold` and exits once a
/// sample drops below `threshold - hysteresis`. `LevelLow` mirrors this.
/// The enter event carries the index where the condition began.
#[derive(Debug, Clone)]
pub struct LevelDetector {
    channel: ChannelId,
    kind: EventKind,
    threshold: f64,
    hysteresis: f64,
    min_samples: u64,
    state: LevelState,
}

impl LevelDetector {
    pub fn new(
        channel: impl Into<ChannelId>,
        kind: EventKind,
        threshold: f64,
        hysteresis: f64,
        min_samples: u64,
    ) -> Self {
        Self {
            channel: channel.into(),
            kind,
            threshold,
            hysteresis: hysteresis.max(0.0),
            min_samples: min_samples.max(1),
            state: LevelState::Idle,
        }
    }

    pub fn from_config(config: &DetectorConfig, sample_rate: f64) -> Self {
        let min_samples = (config.min_duration_sec * sample_rate).ceil().max(1.0) as u64;
        Self::new(
            config.channel.as_str(),
            config.kind,
            config.threshold,
            config.hysteresis,
            min_samples,
        )
    }

    fn entered(&self, v: f64) -> bool {
        match self.kind {
            EventKind::LevelHigh => v > self.threshold,
            EventKind::LevelLow => v < self.threshold,
        }
    }

    fn exited(&self, v: f64) -> bool {
        match self.kind {
            EventKind::LevelHigh => v < self.threshold - self.hysteresis,
            EventKind::LevelLow => v > self.threshold + self.hysteresis,
        }
    }

    fn event(&self, edge: EventEdge, sample_index: SampleIndex, timestamp_us: i64, value: f64) -> Event {
        Event {
            channel: self.channel.clone(),
            kind: self.kind,
            edge,
            sample_index,
            timestamp_us,
            value,
        }
    }
}

impl EventDetector for LevelDetector {
    fn channel(&self) -> &ChannelId {
        &self.channel
    }

    fn evaluate(&mut self, window: &ChannelWindow) -> Vec<Event> {
        let mut events = Vec::new();
        for (offset, &v) in window.values.iter().enumerate() {
            let index = window.index_at(offset);
            self.state = match self.state {
                LevelState::Idle if self.entered(v) => LevelState::Pending {
                    since: index,
                    since_us: window.timestamp_at(offset),
                    value: v,
                },
                LevelState::Idle => LevelState::Idle,
                LevelState::Pending { .. } if !self.entered(v) => LevelState::Idle,
                pending @ LevelState::Pending { .. } => pending,
                LevelState::Active if self.exited(v) => {
                    events.push(self.event(EventEdge::Exit, index, window.timestamp_at(offset), v));
                    LevelState::Idle
                }
                LevelState::Active => LevelState::Active,
            };

            if let LevelState::Pending {
                since,
                since_us,
                value,
            } = self.state
            {
                if index + 1 - since >= self.min_samples {
                    events.push(self.event(EventEdge::Enter, since, since_us, value));
                    self.state = LevelState::Active;
                }
            }
        }
        events
    }
}

/// Detectors sharing one cursor over the buffer
pub struct DetectorBank {
    reader: BufferReader,
    detectors: Vec<Box<dyn EventDetector>>,
    /// Next index to evaluate
    cursor: SampleIndex,
}

impl std::fmt::Debug for DetectorBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorBank")
            .field("detectors", &self.detectors.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl DetectorBank {
    pub fn new(reader: BufferReader) -> Self {
        let cursor = reader.current_index();
        Self {
            reader,
            detectors: Vec::new(),
            cursor,
        }
    }

    /// Build level detectors from configuration
    pub fn from_configs(reader: BufferReader, configs: &[DetectorConfig]) -> Result<Self, EngineError> {
        let sample_rate = reader.sample_rate();
        let mut bank = Self::new(reader);
        for config in configs {
            bank.add(Box::new(LevelDetector::from_config(config, sample_rate)))?;
        }
        Ok(bank)
    }

    /// Register a detector; its channel must exist in the buffer
    pub fn add(&mut self, detector: Box<dyn EventDetector>) -> Result<(), EngineError> {
        if !self.reader.has_channel(detector.channel()) {
            return Err(EngineError::UnknownChannel {
                channel: detector.channel().to_string(),
            });
        }
        self.detectors.push(detector);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Evaluate every detector over samples committed since the last call.
    ///
    /// Events are ordered by sample index.
    pub fn evaluate(&mut self) -> Result<Vec<Event>, EngineError> {
        let current = self.reader.current_index();
        if current <= self.cursor {
            return Ok(Vec::new());
        }
        if self.detectors.is_empty() {
            self.cursor = current;
            return Ok(Vec::new());
        }

        let oldest = self.reader.oldest_index();
        if self.cursor < oldest {
            warn!(
                lost = oldest - self.cursor,
                "Detectors fell behind buffer retention, samples skipped"
            );
        }
        let start = self.cursor.max(oldest);
        let start_timestamp_us = self.reader.timestamp_at(start).unwrap_or_default();
        let sample_rate = self.reader.sample_rate();

        let mut events = Vec::new();
        for detector in &mut self.detectors {
            let channel = detector.channel().clone();
            let values = self.reader.read(&channel, start, current - 1)?;
            let window = ChannelWindow {
                channel,
                start_index: start,
                sample_rate,
                start_timestamp_us,
                values,
            };
            events.extend(detector.evaluate(&window));
        }
        self.cursor = current;

        events.sort_by_key(|e| e.sample_index);
        if !events.is_empty() {
            debug!(count = events.len(), "Events detected");
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(start: SampleIndex, values: Vec<f64>) -> ChannelWindow {
        ChannelWindow {
            channel: "u1".into(),
            start_index: start,
            sample_rate: 1000.0,
            start_timestamp_us: start as i64 * 1000,
            values,
        }
    }

    #[test]
    fn test_level_high_enter_and_exit() {
        let mut detector = LevelDetector::new("u1", EventKind::LevelHigh, 10.0, 0.0, 1);
        let events = detector.evaluate(&window(0, vec![5.0, 11.0, 12.0, 9.0]));

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].edge, EventEdge::Enter);
        assert_eq!(events[0].sample_index, 1);
        assert_eq!(events[1].edge, EventEdge::Exit);
        assert_eq!(events[1].sample_index, 3);
        assert_eq!(events[1].timestamp_us, 3000);
    }

    #[test]
    fn test_hysteresis_suppresses_chatter() {
        let mut detector = LevelDetector::new("u1", EventKind::LevelHigh, 10.0, 2.0, 1);
        let events = detector.evaluate(&window(0, vec![11.0, 9.5, 10.5, 9.0, 7.5]));

        // one enter, exit only below 8.0
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].edge, EventEdge::Exit);
        assert_eq!(events[1].sample_index, 4);
    }

    #[test]
    fn test_min_duration_filters_short_dips() {
        let mut detector = LevelDetector::new("u1", EventKind::LevelLow, 200.0, 0.0, 3);
        let events = detector.evaluate(&window(0, vec![230.0, 190.0, 190.0, 230.0]));
        assert!(events.is_empty());

        let events = detector.evaluate(&window(4, vec![180.0, 180.0, 180.0, 230.0]));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sample_index, 4);
        assert_eq!(events[0].value, 180.0);
        assert_eq!(events[1].sample_index, 7);
    }

    #[test]
    fn test_condition_spanning_windows_reported_once() {
        let mut detector = LevelDetector::new("u1", EventKind::LevelHigh, 1.0, 0.0, 4);
        assert!(detector.evaluate(&window(0, vec![0.0, 2.0, 2.0])).is_empty());

        let events = detector.evaluate(&window(3, vec![2.0, 2.0, 2.0]));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sample_index, 1);
        assert_eq!(events[0].timestamp_us, 1000);
        assert!(detector.evaluate(&window(6, vec![2.0])).is_empty());
    }

    #[test]
    fn test_from_config_converts_duration() {
        let config = DetectorConfig {
            channel: "u1".into(),
            kind: EventKind::LevelLow,
            threshold: 207.0,
            hysteresis: 2.0,
            min_duration_sec: 0.01,
        };
        let detector = LevelDetector::from_config(&config, 1000.0);
        assert_eq!(detector.min_samples, 10);
        assert_eq!(detector.channel(), "u1");
    }
}
