//! Error types for CLI operations.

use std::path::Path;

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Frame source could not be opened
    #[error("Failed to open {source_kind} frame source: {message}")]
    SourceConnection {
        source_kind: String,
        message: String,
    },

    /// Ingestion stopped on its own (sequence gap or lost source)
    #[error("Pipeline halted: {reason}")]
    PipelineHalted { reason: String },
}

impl CliError {
    pub fn config_not_found(path: &Path) -> Self {
        Self::ConfigNotFound {
            path: path.display().to_string(),
        }
    }

    pub fn source_connection(source_kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceConnection {
            source_kind: source_kind.into(),
            message: message.into(),
        }
    }

    pub fn pipeline_halted(reason: impl Into<String>) -> Self {
        Self::PipelineHalted {
            reason: reason.into(),
        }
    }
}
