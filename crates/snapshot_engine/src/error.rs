//! Engine and scheduler errors

use channel_buffer::BufferError;
use contracts::{ContractError, SampleIndex};
use thiserror::Error;

/// Derived-quantity engine error
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid range: start {start} > end {end}")]
    InvalidRange {
        start: SampleIndex,
        end: SampleIndex,
    },

    /// Bound channel not present in the buffer
    #[error("unknown input channel '{channel}'")]
    UnknownChannel { channel: String },

    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Snapshot scheduler error
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// The dispatcher stopped accepting messages
    #[error("dispatch channel closed")]
    DispatchClosed,

    #[error("invalid trigger: {0}")]
    InvalidTrigger(String),
}

impl From<EngineError> for ContractError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidRange { start, end } => ContractError::InvalidRange { start, end },
            EngineError::UnknownChannel { channel } => ContractError::UnknownChannel { channel },
            EngineError::Buffer(e) => e.into(),
        }
    }
}
