//! # Ingestion
//!
//! Frame ingestion for the acquisition pipeline.
//!
//! Responsibilities:
//! - Receive frames from a `FrameSource` (in-process, synthetic or TCP)
//! - Verify sequence continuity; any gap halts ingestion
//! - Append accepted frames to the rolling channel buffer (sole writer)
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{AnyFrameSource, IngestionConfig, IngestionLoop};
//!
//! let source = AnyFrameSource::open(&blueprint.source).await?;
//! let (writer, reader) = channel_buffer::channel_buffer(
//!     source.channel_names().to_vec(),
//!     source.sample_rate(),
//!     blueprint.buffer.retention_sec,
//! )?;
//! let report = IngestionLoop::new(source, writer, IngestionConfig::from(&blueprint.source))
//!     .run(shutdown_rx)
//!     .await?;
//! ```

mod config;
mod continuity;
mod error;
mod pipeline;
mod sources;
pub mod wire;

// Re-exports
pub use config::{IngestionConfig, IngestionMetrics, MetricsSnapshot};
pub use continuity::{check, ContinuityGuard, ContinuityResult};
pub use error::{IngestionError, Result};
pub use pipeline::{IngestionLoop, IngestionReport};
pub use sources::{
    AnyFrameSource, ChannelFrameSource, SyntheticFrameSource, TcpFrameSource, CONNECT_TIMEOUT,
};
