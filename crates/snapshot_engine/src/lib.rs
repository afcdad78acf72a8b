//! # Snapshot Engine
//!
//! Derived-quantity computation and snapshot scheduling over the channel
//! buffer.
//!
//! Responsibilities:
//! - incremental per-channel and per-phase statistics (`WindowStatsEngine`)
//! - level event detection with hysteresis (`DetectorBank`)
//! - periodic snapshots over contiguous index ranges (`SnapshotScheduler`)
//!
//! ## Usage
//!
//! ```ignore
//! use snapshot_engine::{DetectorBank, SnapshotScheduler, SnapshotTrigger, WindowStatsEngine};
//!
//! let engine = WindowStatsEngine::new(reader.clone(), &blueprint.engine)?;
//! let detectors = DetectorBank::from_configs(reader.clone(), &blueprint.detectors)?;
//! let trigger = SnapshotTrigger::from_config(&blueprint.snapshot)?;
//!
//! let scheduler = SnapshotScheduler::new(engine, detectors, reader, trigger);
//! let report = scheduler.run(tick_period, dispatch_tx, shutdown_rx).await?;
//! ```

mod detector;
mod engine;
mod error;
mod scheduler;

pub use detector::{DetectorBank, LevelDetector};
pub use engine::{DerivedQuantityEngine, WindowStatsEngine};
pub use error::{EngineError, SchedulerError};
pub use scheduler::{SchedulerReport, SnapshotScheduler, SnapshotTrigger, TickOutput};
