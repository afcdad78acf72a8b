//! Buffer error types

use contracts::{ContractError, SampleIndex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BufferError {
    /// Read range with start after end
    #[error("invalid range: start {start} > end {end}")]
    InvalidRange {
        start: SampleIndex,
        end: SampleIndex,
    },

    /// Channel not configured on this buffer
    #[error("unknown channel '{channel}'")]
    UnknownChannel { channel: String },

    /// Frame column count differs from the configured channel count
    #[error("channel mismatch: buffer has {expected} channels, frame has {actual} columns")]
    ChannelMismatch { expected: usize, actual: usize },

    /// Construction parameters rejected
    #[error("invalid buffer config: {0}")]
    InvalidConfig(String),
}

impl From<BufferError> for ContractError {
    fn from(err: BufferError) -> Self {
        match err {
            BufferError::InvalidRange { start, end } => ContractError::InvalidRange { start, end },
            BufferError::UnknownChannel { channel } => ContractError::UnknownChannel { channel },
            other => ContractError::Other(other.to_string()),
        }
    }
}
