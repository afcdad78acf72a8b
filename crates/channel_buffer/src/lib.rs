//! # Channel Buffer
//!
//! Rolling multi-channel sample history addressed by absolute sample index,
//! with span-based window resolution for live display and snapshotting.

mod buffer;
mod display;
mod error;
mod window;

pub use buffer::{channel_buffer, BufferReader, BufferSlice, BufferWriter, ChannelBuffer};
pub use display::{LiveView, LiveWindow, WindowSummary};
pub use error::BufferError;
pub use window::{clamp_span, resolve, span_samples, Window, WindowResolution};
