//! # Dispatcher
//!
//! 快照分发模块。
//!
//! 负责：
//! - 消费调度器产出的 `Snapshot` 与 `Event`
//! - 按存储计划过滤通道、按节奏抽取后 fan-out 到多个 sinks
//! - 隔离慢 sink，不阻塞主链路

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;

pub use contracts::{DataSink, DispatchMessage};
pub use dispatcher::{create_dispatcher, DispatchReport, Dispatcher, DispatcherBuilder};
pub use error::DispatcherError;
pub use handle::{DeliveryPlan, SinkHandle};
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{CsvSink, CsvSinkConfig, LogSink, NetworkFormat, NetworkSink, NetworkSinkConfig};
