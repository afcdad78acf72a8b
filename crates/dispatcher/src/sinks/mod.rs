//! Sink implementations
//!
//! Contains LogSink, CsvSink, and NetworkSink.

mod csv;
mod log;
mod network;

pub use self::csv::{CsvSink, CsvSinkConfig};
pub use self::log::LogSink;
pub use self::network::{NetworkFormat, NetworkSink, NetworkSinkConfig};
