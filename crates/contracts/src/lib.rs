//! # Contracts
//!
//! Frozen interface contracts shared by every pipeline crate: data types,
//! traits at the component seams, errors and the configuration blueprint.
//! Business crates depend on this crate; reverse dependencies are prohibited.
//!
//! ## Index Model
//! - Every sample ever ingested has an absolute index (`SampleIndex`),
//!   starting at 0 and advanced by the row count of each accepted frame
//! - `current_index` is the number of committed samples, so the newest
//!   sample is `current_index - 1`
//! - Frame timestamps are microseconds; snapshots also carry wall time

mod blueprint;
mod channel_id;
mod dispatch;
mod error;
mod event;
mod frame;
mod frame_source;
mod sink;
mod snapshot;

pub use blueprint::*;
pub use channel_id::ChannelId;
pub use dispatch::DispatchMessage;
pub use error::*;
pub use event::*;
pub use frame::*;
pub use frame_source::{FrameSource, LocalFrameSource};
pub use sink::*;
pub use snapshot::*;
