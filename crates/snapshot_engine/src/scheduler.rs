//! Snapshot scheduler.
//!
//! Driven by an external ticker. Every tick advances the engine and the
//! detectors over newly committed samples; when the trigger is due, the
//! scheduler fires and summarizes `[last_snapshot_index, current_index)`.
//!
//! Overlap policy is skip: the task ticker uses `MissedTickBehavior::Skip`,
//! so ticks missed while a firing (or its hand-off) is in progress are
//! dropped. Each snapshot starts where the previous one ended, so skipped
//! ticks lower snapshot density without losing samples.

use std::sync::Arc;
use std::time::Duration;

use channel_buffer::BufferReader;
use chrono::Utc;
use contracts::{Cadence, DispatchMessage, Event, IndexRange, SampleIndex, Snapshot, SnapshotConfig};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::detector::DetectorBank;
use crate::engine::DerivedQuantityEngine;
use crate::error::SchedulerError;

/// When the scheduler fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotTrigger {
    /// Wall-clock period
    Interval(Duration),
    /// Every N newly committed samples
    EverySamples(u64),
}

impl SnapshotTrigger {
    pub fn from_config(config: &SnapshotConfig) -> Result<Self, SchedulerError> {
        match config.trigger {
            Cadence::Seconds(s) if s.is_finite() && s > 0.0 => {
                Ok(Self::Interval(Duration::from_secs_f64(s)))
            }
            Cadence::Samples(n) if n > 0 => Ok(Self::EverySamples(n)),
            other => Err(SchedulerError::InvalidTrigger(format!("{other:?}"))),
        }
    }
}

/// Result of one tick
#[derive(Debug, Default)]
pub struct TickOutput {
    pub events: Vec<Event>,
    pub snapshot: Option<Arc<Snapshot>>,
}

/// Counters of a finished scheduler run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    pub snapshots: u64,
    pub skipped: u64,
    pub events: u64,
    pub last_snapshot_index: SampleIndex,
}

/// Snapshot scheduler
pub struct SnapshotScheduler<E> {
    engine: E,
    detectors: DetectorBank,
    reader: BufferReader,
    trigger: SnapshotTrigger,
    last_snapshot_index: SampleIndex,
    last_fire: Instant,
    next_snapshot_id: u64,
    report: SchedulerReport,
}

impl<E: DerivedQuantityEngine> SnapshotScheduler<E> {
    pub fn new(engine: E, detectors: DetectorBank, reader: BufferReader, trigger: SnapshotTrigger) -> Self {
        let last_snapshot_index = reader.current_index();
        Self {
            engine,
            detectors,
            reader,
            trigger,
            last_snapshot_index,
            last_fire: Instant::now(),
            next_snapshot_id: 0,
            report: SchedulerReport {
                last_snapshot_index,
                ..Default::default()
            },
        }
    }

    pub fn last_snapshot_index(&self) -> SampleIndex {
        self.last_snapshot_index
    }

    pub fn report(&self) -> &SchedulerReport {
        &self.report
    }

    fn is_due(&self, now: Instant) -> bool {
        match self.trigger {
            SnapshotTrigger::Interval(period) => now.duration_since(self.last_fire) >= period,
            SnapshotTrigger::EverySamples(n) => {
                self.reader.current_index().saturating_sub(self.last_snapshot_index) >= n
            }
        }
    }

    /// Fire now, regardless of the trigger.
    ///
    /// Returns `None` when no sample was committed since the last firing.
    pub fn fire(&mut self) -> Result<Option<Arc<Snapshot>>, SchedulerError> {
        self.last_fire = Instant::now();

        let end = self.reader.current_index();
        if end == self.last_snapshot_index {
            debug!(index = end, "No new samples, firing skipped");
            self.report.skipped += 1;
            observability::record_snapshot_skipped();
            return Ok(None);
        }

        let range = IndexRange::new(self.last_snapshot_index, end);
        let values = self.engine.get_aggregated_data(range)?;
        let snapshot = Arc::new(Snapshot {
            snapshot_id: self.next_snapshot_id,
            range,
            timestamp_us: self.reader.timestamp_at(end - 1).unwrap_or_default(),
            wall_time: Utc::now(),
            values,
        });

        self.next_snapshot_id += 1;
        self.last_snapshot_index = end;
        self.report.snapshots += 1;
        self.report.last_snapshot_index = end;
        observability::record_snapshot(&snapshot);
        debug!(id = snapshot.snapshot_id, %range, "Snapshot produced");
        Ok(Some(snapshot))
    }

    /// Advance engine and detectors, then fire if the trigger is due.
    pub fn tick(&mut self, now: Instant) -> Result<TickOutput, SchedulerError> {
        self.engine.process()?;
        let events = self.detectors.evaluate()?;
        self.report.events += events.len() as u64;
        if !events.is_empty() {
            observability::record_events(&events);
        }

        let snapshot = if self.is_due(now) { self.fire()? } else { None };
        Ok(TickOutput { events, snapshot })
    }

    /// Final tick at shutdown: evaluates the tail and always fires.
    pub fn finish(&mut self) -> Result<TickOutput, SchedulerError> {
        self.engine.process()?;
        let events = self.detectors.evaluate()?;
        self.report.events += events.len() as u64;
        let snapshot = self.fire()?;
        Ok(TickOutput { events, snapshot })
    }

    /// Scheduler task body.
    ///
    /// Ticks every `period` until `shutdown` turns true (or its sender is
    /// dropped), then performs a final firing. Fails only when the dispatch
    /// channel is closed.
    #[instrument(name = "snapshot_scheduler", skip_all, fields(trigger = ?self.trigger))]
    pub async fn run(
        mut self,
        period: Duration,
        out: mpsc::Sender<DispatchMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<SchedulerReport, SchedulerError> {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period_ms = period.as_millis() as u64, "Snapshot scheduler started");

        loop {
            tokio::select! {
                instant = ticker.tick() => {
                    match self.tick(instant) {
                        Ok(output) => forward(output, &out).await?,
                        Err(e) => warn!(error = %e, "Scheduler tick failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        match self.finish() {
            Ok(output) => forward(output, &out).await?,
            Err(e) => warn!(error = %e, "Final firing failed"),
        }
        info!(
            snapshots = self.report.snapshots,
            skipped = self.report.skipped,
            events = self.report.events,
            last_index = self.report.last_snapshot_index,
            "Snapshot scheduler stopped"
        );
        Ok(self.report)
    }
}

/// Hand a tick's results to the dispatcher, events first.
async fn forward(output: TickOutput, out: &mpsc::Sender<DispatchMessage>) -> Result<(), SchedulerError> {
    if !output.events.is_empty() {
        out.send(DispatchMessage::Events(output.events.into()))
            .await
            .map_err(|_| SchedulerError::DispatchClosed)?;
    }
    if let Some(snapshot) = output.snapshot {
        out.send(DispatchMessage::Snapshot(snapshot))
            .await
            .map_err(|_| SchedulerError::DispatchClosed)?;
    }
    Ok(())
}
