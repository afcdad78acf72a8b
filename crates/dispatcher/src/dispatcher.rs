//! Dispatcher - main loop for fan-out to sinks

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use contracts::{
    DataSink, DispatchMessage, Event, OutputChannelSet, SinkType, Snapshot, StoragePlanConfig,
};

use crate::error::DispatcherError;
use crate::handle::{DeliveryPlan, SinkHandle};
use crate::metrics::MetricsSnapshot;
use crate::sinks::{CsvSink, LogSink, NetworkSink};

/// Final per-sink counters, in registration order
pub type DispatchReport = Vec<(String, MetricsSnapshot)>;

/// Builder for creating a Dispatcher from storage plans
pub struct DispatcherBuilder {
    plans: Vec<StoragePlanConfig>,
    outputs: OutputChannelSet,
    sample_rate: f64,
}

impl DispatcherBuilder {
    /// Create a new DispatcherBuilder
    ///
    /// `outputs` are the engine's output channels; `sample_rate` converts
    /// cadences given in seconds.
    pub fn new(plans: Vec<StoragePlanConfig>, outputs: OutputChannelSet, sample_rate: f64) -> Self {
        Self {
            plans,
            outputs,
            sample_rate,
        }
    }

    /// Validate every plan, create the sinks and start their workers
    #[instrument(
        name = "dispatcher_builder_build",
        skip(self),
        fields(sink_count = self.plans.len())
    )]
    pub async fn build(self) -> Result<Dispatcher, DispatcherError> {
        // validate everything before spawning any worker
        let mut seen = HashSet::new();
        for plan in &self.plans {
            if !seen.insert(plan.name.as_str()) {
                return Err(DispatcherError::DuplicateSink {
                    name: plan.name.clone(),
                });
            }
            DeliveryPlan::resolve(plan, &self.outputs, self.sample_rate)?;
        }

        let mut dispatcher = Dispatcher::new(self.outputs, self.sample_rate);
        for plan in &self.plans {
            register_from_config(&mut dispatcher, plan).await?;
        }
        Ok(dispatcher)
    }
}

/// Create the sink a plan names and register it
#[instrument(
    name = "dispatcher_create_sink",
    skip(dispatcher, plan),
    fields(sink = %plan.name, sink_type = ?plan.sink_type)
)]
async fn register_from_config(
    dispatcher: &mut Dispatcher,
    plan: &StoragePlanConfig,
) -> Result<(), DispatcherError> {
    match plan.sink_type {
        SinkType::Log => dispatcher.register(LogSink::new(&plan.name), plan),
        SinkType::Csv => {
            let sink = CsvSink::from_params(&plan.name, &plan.params)
                .map_err(|e| DispatcherError::sink_creation(&plan.name, e.to_string()))?;
            dispatcher.register(sink, plan)
        }
        SinkType::Network => {
            let sink = NetworkSink::from_params(&plan.name, &plan.params)
                .await
                .map_err(|e| DispatcherError::sink_creation(&plan.name, e.to_string()))?;
            dispatcher.register(sink, plan)
        }
    }
}

/// Fans snapshots and events out to registered sinks.
///
/// Every sink has its own bounded queue and worker, so a slow or failing
/// sink only loses its own messages.
pub struct Dispatcher {
    handles: Vec<SinkHandle>,
    outputs: OutputChannelSet,
    sample_rate: f64,
}

impl Dispatcher {
    pub fn new(outputs: OutputChannelSet, sample_rate: f64) -> Self {
        Self {
            handles: Vec::new(),
            outputs,
            sample_rate,
        }
    }

    /// Attach a sink under a storage plan and start its worker.
    ///
    /// Must be called inside a tokio runtime.
    pub fn register<S: DataSink + 'static>(
        &mut self,
        sink: S,
        plan: &StoragePlanConfig,
    ) -> Result<(), DispatcherError> {
        if self.handles.iter().any(|h| h.name() == sink.name()) {
            return Err(DispatcherError::DuplicateSink {
                name: sink.name().to_string(),
            });
        }
        let plan = DeliveryPlan::resolve(plan, &self.outputs, self.sample_rate)?;
        debug!(
            sink = sink.name(),
            channels = plan.channels.as_ref().map_or(self.outputs.len(), Vec::len),
            cadence_samples = ?plan.cadence_samples,
            "Sink registered"
        );
        self.handles.push(SinkHandle::spawn(sink, plan));
        Ok(())
    }

    pub fn sink_count(&self) -> usize {
        self.handles.len()
    }

    /// Get metrics for all sinks
    pub fn metrics(&self) -> DispatchReport {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Offer a snapshot to every sink; returns how many queued it
    pub fn dispatch_snapshot(&mut self, snapshot: &Snapshot) -> usize {
        self.handles
            .iter_mut()
            .map(|h| h.offer_snapshot(snapshot))
            .filter(|queued| *queued)
            .count()
    }

    /// Offer events to every sink that takes them; returns how many queued them
    pub fn dispatch_events(&mut self, events: &[Event]) -> usize {
        if events.is_empty() {
            return 0;
        }
        let shared: Arc<[Event]> = Arc::from(events);
        self.handles
            .iter()
            .filter(|h| h.offer_events(&shared))
            .count()
    }

    /// Run the dispatcher main loop
    ///
    /// Consumes messages until the input channel closes, then drains and
    /// closes every sink.
    pub async fn run(self, input_rx: mpsc::Receiver<DispatchMessage>) -> DispatchReport {
        self.run_with(input_rx, |_| {}).await
    }

    /// Same as [`run`](Self::run), handing every message to `observe`
    /// before it is fanned out.
    #[instrument(name = "dispatcher_run", skip_all)]
    pub async fn run_with<F>(
        mut self,
        mut input_rx: mpsc::Receiver<DispatchMessage>,
        mut observe: F,
    ) -> DispatchReport
    where
        F: FnMut(&DispatchMessage) + Send,
    {
        info!(sinks = self.handles.len(), "Dispatcher started");

        let mut snapshot_count: u64 = 0;

        while let Some(message) = input_rx.recv().await {
            observe(&message);
            match &message {
                DispatchMessage::Snapshot(snapshot) => {
                    snapshot_count += 1;
                    let delivered = self.dispatch_snapshot(snapshot);
                    debug!(
                        snapshot_id = snapshot.snapshot_id,
                        range = %snapshot.range,
                        delivered,
                        "Snapshot dispatched"
                    );
                    if snapshot_count.is_multiple_of(100) {
                        info!(snapshots = snapshot_count, "Dispatcher progress");
                    }
                }
                DispatchMessage::Events(events) => {
                    let delivered = self.dispatch_events(events);
                    debug!(count = events.len(), delivered, "Events dispatched");
                }
            }
        }

        info!(
            snapshots = snapshot_count,
            "Dispatcher input closed, shutting down"
        );

        let report = self.shutdown().await;
        info!("Dispatcher shutdown complete");
        report
    }

    /// Spawn the dispatcher as a background task
    pub fn spawn(self, input_rx: mpsc::Receiver<DispatchMessage>) -> JoinHandle<DispatchReport> {
        tokio::spawn(self.run(input_rx))
    }

    /// Close every queue and wait for the workers to drain, flush and close
    pub async fn shutdown(self) -> DispatchReport {
        let mut report = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            let name = handle.name().to_string();
            report.push((name, handle.shutdown().await));
        }
        report
    }
}

/// Convenience function to create a dispatcher from storage plans
#[instrument(name = "dispatcher_create", skip(plans, outputs))]
pub async fn create_dispatcher(
    plans: Vec<StoragePlanConfig>,
    outputs: OutputChannelSet,
    sample_rate: f64,
) -> Result<Dispatcher, DispatcherError> {
    DispatcherBuilder::new(plans, outputs, sample_rate).build().await
}
