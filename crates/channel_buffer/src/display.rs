//! Live display window access.
//!
//! A [`LiveView`] pulls the most recent span of one channel from the buffer at
//! whatever cadence the display refreshes. It only takes the read lock.

use contracts::{ChannelId, DisplayConfig};
use tracing::{debug, trace};

use crate::buffer::BufferReader;
use crate::error::BufferError;
use crate::window::{clamp_span, resolve, Window, WindowResolution};

/// Plot-ready window of one channel
#[derive(Debug, Clone)]
pub struct LiveWindow {
    pub channel: ChannelId,
    pub window: Window,
    /// Sample time axis: `index / sample_rate` (seconds)
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    sample_rate: f64,
}

/// Summary statistics of a live window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSummary {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub rms: f64,
    /// Fundamental frequency estimated from rising mean crossings (Hz)
    pub frequency: Option<f64>,
}

impl std::fmt::Display for WindowSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "mean: {:.3} min: {:.3} max: {:.3} rms: {:.3} freq: {:.4}",
            self.mean,
            self.min,
            self.max,
            self.rms,
            self.frequency.unwrap_or(0.0)
        )
    }
}

impl LiveWindow {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Statistics over `y`; `None` for an empty window
    pub fn summary(&self) -> Option<WindowSummary> {
        let count = self.y.len();
        if count == 0 {
            return None;
        }
        let n = count as f64;
        let mean = self.y.iter().sum::<f64>() / n;
        let min = self.y.iter().copied().fold(f64::INFINITY, f64::min);
        let max = self.y.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let rms = (self.y.iter().map(|v| v * v).sum::<f64>() / n).sqrt();

        Some(WindowSummary {
            count,
            mean,
            min,
            max,
            rms,
            frequency: estimate_frequency(&self.y, mean, self.sample_rate),
        })
    }
}

/// Frequency from the spacing of rising crossings through `level`.
///
/// Needs at least two crossings; linear interpolation between samples.
fn estimate_frequency(values: &[f64], level: f64, sample_rate: f64) -> Option<f64> {
    let crossings: Vec<f64> = values
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| pair[0] < level && pair[1] >= level)
        .map(|(i, pair)| i as f64 + (level - pair[0]) / (pair[1] - pair[0]))
        .collect();

    let (first, last) = (crossings.first()?, crossings.last()?);
    if crossings.len() < 2 || last <= first {
        return None;
    }
    let periods = (crossings.len() - 1) as f64;
    Some(periods * sample_rate / (last - first))
}

/// Display-side view of the buffer
#[derive(Debug, Clone)]
pub struct LiveView {
    reader: BufferReader,
    min_span: f64,
    max_span: f64,
    span_seconds: f64,
}

impl LiveView {
    pub fn new(reader: BufferReader, config: &DisplayConfig) -> Self {
        let buffer_span = reader.capacity() as f64 / reader.sample_rate();
        let max_span = config.max_span_sec.min(buffer_span);
        let min_span = config.min_span_sec.min(max_span);
        let mut view = Self {
            reader,
            min_span,
            max_span,
            span_seconds: min_span,
        };
        view.set_span(config.default_span_sec);
        view
    }

    /// Current span (seconds)
    pub fn span(&self) -> f64 {
        self.span_seconds
    }

    /// Set the displayed span, returning the clamped value actually used
    pub fn set_span(&mut self, requested: f64) -> f64 {
        let clamped = clamp_span(requested, self.reader.capacity(), self.reader.sample_rate())
            .clamp(self.min_span, self.max_span);
        self.span_seconds = clamped;
        clamped
    }

    pub fn reader(&self) -> &BufferReader {
        &self.reader
    }

    /// Window of the configured span
    pub fn current_window(&self, channel: &str) -> Result<Option<LiveWindow>, BufferError> {
        self.get_window(channel, self.span_seconds)
    }

    /// Most recent `span_seconds` of `channel`.
    ///
    /// Returns `Ok(None)` while the buffer holds less than the span.
    pub fn get_window(&self, channel: &str, span_seconds: f64) -> Result<Option<LiveWindow>, BufferError> {
        let channel_id = self
            .reader
            .channel_names()
            .iter()
            .find(|ch| *ch == channel)
            .cloned()
            .ok_or_else(|| BufferError::UnknownChannel {
                channel: channel.to_string(),
            })?;

        let sample_rate = self.reader.sample_rate();
        let current = self.reader.current_index();
        let window = match resolve(span_seconds, current, sample_rate, self.reader.capacity()) {
            WindowResolution::Ready(window) => window,
            WindowResolution::NotReady => {
                if self.reader.has_filled() {
                    debug!(channel, span_seconds, current, "Buffer underrun");
                } else {
                    trace!(channel, span_seconds, current, "Buffer warming up");
                }
                return Ok(None);
            }
        };

        let y = self.reader.read_window(channel, window)?;
        if y.is_empty() {
            debug!(channel, ?window, "Window evicted before read");
            return Ok(None);
        }
        // A concurrent eviction may trim the front between resolve and read
        let first = window.end_index + 1 - y.len() as u64;
        let x = (first..=window.end_index)
            .map(|i| i as f64 / sample_rate)
            .collect();

        Ok(Some(LiveWindow {
            channel: channel_id,
            window: Window {
                start_index: first,
                end_index: window.end_index,
            },
            x,
            y,
            sample_rate,
        }))
    }
}
