//! Pipeline orchestrator - coordinates all components.
//!
//! Task layout: ingestion (sole buffer writer), snapshot scheduler,
//! dispatch loop (one worker per sink behind it) and an optional live
//! monitor. Shutdown runs in pipeline order so nothing committed to the
//! buffer is lost: ingestion stops first, the scheduler fires over the
//! tail, and the dispatcher drains before flushing and closing sinks.

use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use channel_buffer::LiveView;
use contracts::{DispatchMessage, FrameSource, PipelineBlueprint, SourceKind};
use ingestion::{AnyFrameSource, IngestionConfig, IngestionLoop};
use observability::PipelineMetricsAggregator;
use snapshot_engine::{
    DerivedQuantityEngine, DetectorBank, SnapshotScheduler, SnapshotTrigger, WindowStatsEngine,
};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::{PipelineStats, StopReason};
use crate::error::CliError;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The pipeline blueprint
    pub blueprint: PipelineBlueprint,

    /// Pipeline timeout (None = run until signalled)
    pub timeout: Option<Duration>,

    /// Scheduler to dispatcher queue capacity
    pub queue_size: usize,

    /// Log live window statistics
    pub monitor: bool,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until `shutdown_signal` resolves, the timeout elapses or
    /// ingestion halts, then shut down in order.
    pub async fn run<F>(self, shutdown_signal: F) -> Result<PipelineStats>
    where
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        // Open Frame Source
        info!(kind = ?blueprint.source.kind, "Opening frame source...");
        let source = AnyFrameSource::open(&blueprint.source)
            .await
            .map_err(|e| CliError::source_connection(describe_source(blueprint), e.to_string()))?;

        let channels = source.channel_names().to_vec();
        let sample_rate = source.sample_rate();
        info!(
            source = source.kind(),
            channels = ?channels,
            sample_rate,
            "Frame source ready"
        );

        // Setup Channel Buffer
        let (writer, reader) =
            channel_buffer::channel_buffer(channels.clone(), sample_rate, blueprint.buffer.retention_sec)
                .context("Failed to create channel buffer")?;
        info!(
            capacity = reader.capacity(),
            retention_sec = blueprint.buffer.retention_sec,
            "Channel buffer allocated"
        );

        // Setup Snapshot Engine
        let engine = WindowStatsEngine::new(reader.clone(), &blueprint.engine)
            .context("Failed to configure derived-quantity engine")?;
        let outputs = engine.output_channels().clone();
        let detectors = DetectorBank::from_configs(reader.clone(), &blueprint.detectors)
            .context("Failed to configure event detectors")?;
        let trigger =
            SnapshotTrigger::from_config(&blueprint.snapshot).context("Invalid snapshot trigger")?;

        info!(
            outputs = outputs.len(),
            detectors = detectors.len(),
            trigger = ?trigger,
            "Snapshot engine configured"
        );

        // Setup Dispatcher
        if blueprint.storage.is_empty() {
            warn!("No storage plans configured - snapshots will only be counted");
        }
        let dispatcher = dispatcher::create_dispatcher(blueprint.storage.clone(), outputs, sample_rate)
            .await
            .context("Failed to create dispatcher")?;
        info!(sinks = dispatcher.sink_count(), "Dispatcher started");

        let (dispatch_tx, dispatch_rx) = mpsc::channel::<DispatchMessage>(self.config.queue_size.max(1));
        let dispatch_task = tokio::spawn(async move {
            let mut aggregator = PipelineMetricsAggregator::new();
            let report = dispatcher
                .run_with(dispatch_rx, |message| match message {
                    DispatchMessage::Snapshot(snapshot) => aggregator.record_snapshot(snapshot),
                    DispatchMessage::Events(events) => aggregator.record_events(events),
                })
                .await;
            (report, aggregator)
        });

        // Start Ingestion
        let (ingest_tx, ingest_rx) = watch::channel(false);
        let ingestion = IngestionLoop::new(source, writer, IngestionConfig::from(&blueprint.source));
        let ingestion_metrics = ingestion.metrics();
        let mut ingestion_task = tokio::spawn(ingestion.run(ingest_rx));

        // Start Scheduler
        let (sched_tx, sched_rx) = watch::channel(false);
        let scheduler = SnapshotScheduler::new(engine, detectors, reader.clone(), trigger);
        let tick = Duration::from_millis(blueprint.snapshot.tick_ms);
        let scheduler_task = tokio::spawn(scheduler.run(tick, dispatch_tx, sched_rx));

        // Optional Monitor
        let (monitor_tx, monitor_rx) = watch::channel(false);
        let monitor_task = self.config.monitor.then(|| {
            let view = LiveView::new(reader.clone(), &blueprint.display);
            let refresh = Duration::from_millis(blueprint.display.refresh_ms);
            tokio::spawn(monitor_loop(view, refresh, monitor_rx))
        });

        info!(timeout = ?self.config.timeout, "Pipeline running");

        let timeout = self.config.timeout;
        let deadline = async move {
            match timeout {
                Some(t) => tokio::time::sleep(t).await,
                None => std::future::pending().await,
            }
        };

        let (mut stop_reason, finished) = tokio::select! {
            joined = &mut ingestion_task => (StopReason::Signal, Some(joined)),
            _ = shutdown_signal => {
                warn!("Received shutdown signal, stopping pipeline...");
                (StopReason::Signal, None)
            }
            _ = deadline => {
                warn!(timeout = ?timeout, "Pipeline timed out");
                (StopReason::Timeout, None)
            }
        };

        // Shutdown: ingestion, then scheduler, then dispatcher
        info!("Shutting down pipeline...");
        let joined = match finished {
            Some(joined) => joined,
            None => {
                ingest_tx.send_replace(true);
                ingestion_task.await
            }
        };
        match joined.context("Ingestion task panicked")? {
            Ok(report) => debug!(frames = report.frames, current_index = report.current_index, "Ingestion joined"),
            Err(e) => {
                error!(error = %e, "Ingestion halted");
                stop_reason = StopReason::Halted(e.to_string());
            }
        }

        sched_tx.send_replace(true);
        let scheduler_report = match scheduler_task.await.context("Scheduler task panicked")? {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Snapshot scheduler failed");
                Default::default()
            }
        };

        let (sinks, mut snapshot_metrics) = dispatch_task.await.context("Dispatcher task panicked")?;
        snapshot_metrics.skipped_firings = scheduler_report.skipped;

        monitor_tx.send_replace(true);
        if let Some(task) = monitor_task {
            let _ = task.await;
        }

        let stats = PipelineStats {
            stop_reason,
            duration: start_time.elapsed(),
            sample_rate,
            channels: channels.len(),
            current_index: reader.current_index(),
            ingestion: ingestion_metrics.snapshot(),
            last_snapshot_index: scheduler_report.last_snapshot_index,
            sinks,
            snapshot_metrics,
        };

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            current_index = stats.current_index,
            snapshots = scheduler_report.snapshots,
            events = scheduler_report.events,
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }
}

/// Periodically log a summary of the current display window of every channel
async fn monitor_loop(view: LiveView, refresh: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(refresh.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let channels = view.reader().channel_names().to_vec();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let reader = view.reader();
                observability::record_buffer_fill(reader.fill_ratio(), reader.current_index());

                for channel in &channels {
                    match view.current_window(channel) {
                        Ok(Some(window)) => {
                            if let Some(summary) = window.summary() {
                                info!(channel = %channel, span_sec = view.span(), "{summary}");
                            }
                        }
                        Ok(None) => debug!(channel = %channel, "Window not ready"),
                        Err(e) => warn!(channel = %channel, error = %e, "Window read failed"),
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

fn describe_source(blueprint: &PipelineBlueprint) -> String {
    match blueprint.source.kind {
        SourceKind::Tcp => format!("tcp://{}:{}", blueprint.source.host, blueprint.source.port),
        SourceKind::Synthetic => "synthetic".to_string(),
    }
}
