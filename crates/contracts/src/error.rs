//! Layered error definitions
//!
//! Categorized by source: config / source / stream / sink

use thiserror::Error;

/// Unified error type shared by every crate boundary
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Frame Source Errors =====
    /// Connection to the frame source lost or never established
    #[error("frame source unavailable: {message}")]
    SourceUnavailable { message: String },

    /// Inbound frame could not be decoded
    #[error("frame decode error: {message}")]
    FrameDecode { message: String },

    // ===== Stream Errors =====
    /// Consecutive frames were not contiguous
    #[error("sequence gap: expected frame {expected}, got {actual}")]
    SequenceGap { expected: u64, actual: u64 },

    /// Malformed index range (start after end)
    #[error("invalid index range: start {start} > end {end}")]
    InvalidRange { start: u64, end: u64 },

    /// Channel name not known to the stream or engine
    #[error("unknown channel '{channel}'")]
    UnknownChannel { channel: String },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    /// Sink connection error
    #[error("sink '{sink_name}' connection error: {message}")]
    SinkConnection { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create source unavailable error
    pub fn source_unavailable(message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Whether the error must stop the ingestion loop
    pub fn is_fatal_for_ingestion(&self) -> bool {
        matches!(
            self,
            Self::SequenceGap { .. } | Self::SourceUnavailable { .. }
        )
    }
}
