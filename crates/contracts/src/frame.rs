//! Frame - Frame Source output
//!
//! One ingestion unit: a block of samples (rows) for every channel (columns).

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Absolute sample index, counted from stream start. Never reset, never reused.
pub type SampleIndex = u64;

/// Ingestion frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Monotonic packet sequence number assigned by the transport
    pub sequence_number: u64,

    /// Arrival timestamp of the newest sample (microseconds)
    pub timestamp_us: i64,

    /// Payload: rows = samples, columns = channels
    pub samples: DMatrix<f64>,
}

impl Frame {
    pub fn new(sequence_number: u64, timestamp_us: i64, samples: DMatrix<f64>) -> Self {
        Self {
            sequence_number,
            timestamp_us,
            samples,
        }
    }

    /// Build a frame from row-major data (`rows * columns` values).
    ///
    /// Returns `None` when the slice length does not match.
    pub fn from_row_slice(
        sequence_number: u64,
        timestamp_us: i64,
        rows: usize,
        columns: usize,
        data: &[f64],
    ) -> Option<Self> {
        if data.len() != rows * columns {
            return None;
        }
        Some(Self::new(
            sequence_number,
            timestamp_us,
            DMatrix::from_row_slice(rows, columns, data),
        ))
    }

    /// Number of samples per channel
    #[inline]
    pub fn rows(&self) -> usize {
        self.samples.nrows()
    }

    /// Number of channels
    #[inline]
    pub fn columns(&self) -> usize {
        self.samples.ncols()
    }

    /// Payload flattened row by row (wire order)
    pub fn to_row_major(&self) -> Vec<f64> {
        self.samples.transpose().as_slice().to_vec()
    }
}

/// Half-open range of absolute sample indices `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct IndexRange {
    pub start: SampleIndex,
    pub end: SampleIndex,
}

impl IndexRange {
    pub fn new(start: SampleIndex, end: SampleIndex) -> Self {
        Self { start, end }
    }

    /// Number of samples covered
    #[inline]
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    #[inline]
    pub fn contains(&self, index: SampleIndex) -> bool {
        index >= self.start && index < self.end
    }
}

impl std::fmt::Display for IndexRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
