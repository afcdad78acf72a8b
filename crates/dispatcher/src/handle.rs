//! SinkHandle - manages a sink with isolated queue and worker task

use std::sync::Arc;

use contracts::{
    ChannelId, DataSink, DispatchMessage, Event, OutputChannelSet, SampleIndex, Snapshot,
    StoragePlanConfig,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, instrument, warn};

use crate::error::DispatcherError;
use crate::metrics::{MetricsSnapshot, SinkMetrics};

/// Storage plan resolved against the engine's output channels
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryPlan {
    /// Delivered output channels (`None` = all)
    pub channels: Option<Vec<ChannelId>>,
    /// Minimum samples between delivered snapshot ends (`None` = every firing)
    pub cadence_samples: Option<u64>,
    /// Whether event batches are forwarded
    pub events: bool,
    pub queue_capacity: usize,
}

impl Default for DeliveryPlan {
    fn default() -> Self {
        Self {
            channels: None,
            cadence_samples: None,
            events: true,
            queue_capacity: 100,
        }
    }
}

impl DeliveryPlan {
    /// Check a configured plan against the engine outputs.
    ///
    /// Seconds cadences are converted with `sample_rate`.
    pub fn resolve(
        config: &StoragePlanConfig,
        outputs: &OutputChannelSet,
        sample_rate: f64,
    ) -> Result<Self, DispatcherError> {
        if let Some(unknown) = config.channels.iter().find(|ch| !outputs.contains(ch)) {
            return Err(DispatcherError::UnknownOutputChannel {
                sink_name: config.name.clone(),
                channel: unknown.clone(),
            });
        }
        let channels = if config.channels.is_empty() {
            None
        } else {
            Some(config.channels.iter().map(ChannelId::from).collect())
        };

        Ok(Self {
            channels,
            cadence_samples: config.cadence.map(|c| c.to_samples(sample_rate)),
            events: config.events,
            queue_capacity: config.queue_capacity.max(1),
        })
    }
}

/// Handle to a running sink worker
pub struct SinkHandle {
    /// Sink name
    name: String,
    plan: DeliveryPlan,
    /// Channel to send messages to worker
    tx: mpsc::Sender<DispatchMessage>,
    /// Shared metrics
    metrics: Arc<SinkMetrics>,
    /// End of the last snapshot handed to the worker
    last_delivered_end: Option<SampleIndex>,
    /// Reference point of the cadence gate
    cadence_base: Option<SampleIndex>,
    /// Worker task handle
    worker_handle: JoinHandle<()>,
}

impl SinkHandle {
    /// Create a new SinkHandle and spawn the worker task
    pub fn spawn<S: DataSink + 'static>(sink: S, plan: DeliveryPlan) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(plan.queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();

        let worker_handle = tokio::spawn(async move {
            sink_worker(sink, rx, worker_metrics, worker_name).await;
        });

        Self {
            name,
            plan,
            tx,
            metrics,
            last_delivered_end: None,
            cadence_base: None,
            worker_handle,
        }
    }

    /// Get sink name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plan(&self) -> &DeliveryPlan {
        &self.plan
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Queue a snapshot, subject to ordering and cadence (non-blocking)
    ///
    /// Returns true if queued.
    pub fn offer_snapshot(&mut self, snapshot: &Snapshot) -> bool {
        let range = snapshot.range;
        if let Some(last) = self.last_delivered_end {
            if range.start < last {
                self.metrics.inc_out_of_order_count();
                warn!(
                    sink = %self.name,
                    %range,
                    last_delivered_end = last,
                    "Snapshot out of order, rejected"
                );
                return false;
            }
        }

        let base = *self.cadence_base.get_or_insert(range.start);
        if let Some(every) = self.plan.cadence_samples {
            if range.end.saturating_sub(base) < every {
                self.metrics.inc_decimated_count();
                return false;
            }
        }

        let selected = match &self.plan.channels {
            Some(channels) => snapshot.select(channels),
            None => snapshot.clone(),
        };
        if !self.try_send(DispatchMessage::Snapshot(Arc::new(selected))) {
            return false;
        }
        self.last_delivered_end = Some(range.end);
        self.cadence_base = Some(range.end);
        true
    }

    /// Queue an event batch if this sink takes events
    pub fn offer_events(&self, events: &Arc<[Event]>) -> bool {
        if !self.plan.events || events.is_empty() {
            return false;
        }
        self.try_send(DispatchMessage::Events(Arc::clone(events)))
    }

    /// Returns true if sent, false if queue full (message dropped)
    fn try_send(&self, message: DispatchMessage) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => {
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                true
            }
            Err(mpsc::error::TrySendError::Full(message)) => {
                self.metrics.inc_dropped_count();
                observability::record_sink_dropped(&self.name);
                match message {
                    DispatchMessage::Snapshot(s) => warn!(
                        sink = %self.name,
                        snapshot_id = s.snapshot_id,
                        "Queue full, snapshot dropped"
                    ),
                    DispatchMessage::Events(e) => warn!(
                        sink = %self.name,
                        count = e.len(),
                        "Queue full, events dropped"
                    ),
                }
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(sink = %self.name, "Sink worker closed unexpectedly");
                false
            }
        }
    }

    /// Shutdown the sink worker gracefully
    ///
    /// The worker drains its queue, then flushes and closes the sink.
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) -> MetricsSnapshot {
        // Drop sender to signal worker to stop
        drop(self.tx);
        if let Err(e) = self.worker_handle.await {
            error!(sink = %self.name, error = ?e, "Worker task panicked");
        }
        debug!(sink = %self.name, "SinkHandle shutdown complete");
        self.metrics.snapshot()
    }
}

/// Worker task that consumes messages and writes to sink
#[instrument(
    name = "sink_worker_loop",
    skip(sink, rx, metrics),
    fields(sink = %name)
)]
async fn sink_worker<S: DataSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<DispatchMessage>,
    metrics: Arc<SinkMetrics>,
    name: String,
) {
    debug!(sink = %name, "Sink worker started");

    while let Some(message) = rx.recv().await {
        metrics.set_queue_len(rx.len());
        let started = Instant::now();

        match message {
            DispatchMessage::Snapshot(snapshot) => match sink.write_snapshot(&snapshot).await {
                Ok(()) => {
                    metrics.inc_write_count();
                    observability::record_sink_delivery(&name, "snapshot", true);
                }
                Err(e) => {
                    metrics.inc_failure_count();
                    observability::record_sink_delivery(&name, "snapshot", false);
                    error!(
                        sink = %name,
                        snapshot_id = snapshot.snapshot_id,
                        error = %e,
                        "Snapshot write failed"
                    );
                }
            },
            DispatchMessage::Events(events) => match sink.write_events(&events).await {
                Ok(()) => {
                    metrics.inc_event_write_count();
                    observability::record_sink_delivery(&name, "events", true);
                }
                Err(e) => {
                    metrics.inc_failure_count();
                    observability::record_sink_delivery(&name, "events", false);
                    error!(sink = %name, count = events.len(), error = %e, "Event write failed");
                }
            },
        }

        observability::record_sink_latency_ms(&name, started.elapsed().as_secs_f64() * 1000.0);
    }

    // Cleanup
    if let Err(e) = sink.flush().await {
        error!(sink = %name, error = %e, "Flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(sink = %name, error = %e, "Close failed on shutdown");
    }

    debug!(sink = %name, "Sink worker stopped");
}
