//! DispatchMessage - Snapshot Scheduler to Dispatcher hand-off

use std::sync::Arc;

use crate::{Event, Snapshot};

/// Message sent from the scheduler to the dispatcher
#[derive(Debug, Clone)]
pub enum DispatchMessage {
    /// Periodic snapshot (fanned out subject to channel subset and cadence)
    Snapshot(Arc<Snapshot>),
    /// Events detected since the previous tick
    Events(Arc<[Event]>),
}
