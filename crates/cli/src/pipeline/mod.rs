//! Pipeline orchestration: task wiring, ordered shutdown and run statistics.

mod orchestrator;
mod stats;

pub use orchestrator::{Pipeline, PipelineConfig};
pub use stats::{PipelineStats, StopReason};
