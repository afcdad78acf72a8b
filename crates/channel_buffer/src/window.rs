//! Time-span to index-window resolution.

use contracts::SampleIndex;

/// Inclusive index window `[start_index, end_index]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start_index: SampleIndex,
    pub end_index: SampleIndex,
}

impl Window {
    /// Number of samples in the window
    #[inline]
    pub fn len(&self) -> u64 {
        self.end_index - self.start_index + 1
    }
}

/// Outcome of resolving a span against the buffer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowResolution {
    Ready(Window),
    /// Not enough history yet (buffer underrun); skip this cycle
    NotReady,
}

impl WindowResolution {
    pub fn window(self) -> Option<Window> {
        match self {
            Self::Ready(window) => Some(window),
            Self::NotReady => None,
        }
    }
}

/// Span in samples, capped at the buffer capacity
pub fn span_samples(span_seconds: f64, sample_rate: f64, capacity: usize) -> u64 {
    if !(span_seconds.is_finite() && span_seconds > 0.0) {
        return 0;
    }
    let samples = (span_seconds * sample_rate).round() as u64;
    samples.min(capacity as u64)
}

/// Resolve the most recent `span_seconds` of history into an index window.
///
/// The window always ends at the newest committed sample
/// (`current_index - 1`). It is `NotReady` until more than the requested
/// span has been committed.
pub fn resolve(
    span_seconds: f64,
    current_index: SampleIndex,
    sample_rate: f64,
    capacity: usize,
) -> WindowResolution {
    let span = span_samples(span_seconds, sample_rate, capacity);
    if span == 0 || current_index == 0 {
        return WindowResolution::NotReady;
    }

    let raw_start = current_index as i128 - span as i128;
    if raw_start <= 0 {
        return WindowResolution::NotReady;
    }

    let oldest = current_index.saturating_sub(capacity as u64);
    let start_index = (raw_start as u64).max(oldest);
    let end_index = current_index - 1;
    if start_index > end_index {
        return WindowResolution::NotReady;
    }

    WindowResolution::Ready(Window {
        start_index,
        end_index,
    })
}

/// Clamp a user-entered span into `(0, capacity / sample_rate]`.
///
/// Returns the effective span to echo back to the user. Non-positive or
/// non-finite requests fall back to a single sample period.
pub fn clamp_span(requested: f64, capacity: usize, sample_rate: f64) -> f64 {
    let max_span = capacity as f64 / sample_rate;
    let min_span = (1.0 / sample_rate).min(max_span);
    if !(requested.is_finite() && requested > 0.0) {
        return min_span;
    }
    requested.clamp(min_span, max_span)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_two_seconds() {
        let resolution = resolve(2.0, 1000, 100.0, 500);
        assert_eq!(
            resolution,
            WindowResolution::Ready(Window {
                start_index: 800,
                end_index: 999
            })
        );
        assert_eq!(resolution.window().unwrap().len(), 200);
    }

    #[test]
    fn test_resolve_clamped_to_capacity() {
        let window = resolve(10.0, 1000, 100.0, 500).window().unwrap();
        assert_eq!(window.start_index, 500);
        assert_eq!(window.end_index, 999);
        assert!(window.len() <= 500);
    }

    #[test]
    fn test_not_ready_during_warm_up() {
        // 1.5 s requested, only 1.0 s committed
        assert_eq!(resolve(1.5, 100, 100.0, 500), WindowResolution::NotReady);
        // exactly the span committed is still not ready
        assert_eq!(resolve(1.0, 100, 100.0, 500), WindowResolution::NotReady);
        assert_eq!(resolve(1.0, 0, 100.0, 500), WindowResolution::NotReady);
    }

    #[test]
    fn test_zero_span_not_ready() {
        assert_eq!(resolve(0.0, 1000, 100.0, 500), WindowResolution::NotReady);
        assert_eq!(resolve(f64::NAN, 1000, 100.0, 500), WindowResolution::NotReady);
    }

    #[test]
    fn test_window_within_retained_history() {
        for current in [501u64, 750, 1000, 12_345] {
            let window = resolve(7.3, current, 100.0, 500).window().unwrap();
            assert!(window.start_index >= current.saturating_sub(500));
            assert_eq!(window.end_index, current - 1);
        }
    }

    #[test]
    fn test_clamp_span() {
        assert_eq!(clamp_span(10.0, 500, 100.0), 5.0);
        assert_eq!(clamp_span(2.0, 500, 100.0), 2.0);
        assert_eq!(clamp_span(-1.0, 500, 100.0), 0.01);
        assert_eq!(clamp_span(0.0001, 500, 100.0), 0.01);
    }
}
