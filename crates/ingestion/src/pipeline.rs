//! Ingestion loop: frame source → continuity guard → rolling buffer

use std::sync::Arc;

use channel_buffer::{BufferError, BufferWriter};
use contracts::{ContractError, Frame, FrameSource, SampleIndex};
use metrics::{counter, gauge};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{IngestionConfig, IngestionMetrics};
use crate::continuity::{ContinuityGuard, ContinuityResult};
use crate::error::{IngestionError, Result};

/// Summary of an ingestion run stopped by shutdown
#[derive(Debug, Clone)]
pub struct IngestionReport {
    pub frames: u64,
    pub current_index: SampleIndex,
    pub last_sequence: Option<u64>,
}

/// Sole writer of the rolling buffer
pub struct IngestionLoop<S> {
    source: S,
    writer: BufferWriter,
    guard: ContinuityGuard,
    config: IngestionConfig,
    metrics: Arc<IngestionMetrics>,
    current_index: SampleIndex,
    frames: u64,
}

impl<S: FrameSource> IngestionLoop<S> {
    pub fn new(source: S, writer: BufferWriter, config: IngestionConfig) -> Self {
        Self {
            source,
            writer,
            guard: ContinuityGuard::new(),
            config,
            metrics: Arc::new(IngestionMetrics::new()),
            current_index: 0,
            frames: 0,
        }
    }

    /// Get metrics reference
    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.metrics.clone()
    }

    /// Run until shutdown, a sequence gap or loss of the source.
    ///
    /// The source is closed on every exit path. A frame that fails the
    /// continuity check is never appended.
    #[instrument(name = "ingestion_run", skip_all)]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<IngestionReport> {
        info!(
            poll_ms = self.config.poll_interval.as_millis() as u64,
            channels = self.source.channel_names().len(),
            sample_rate = self.source.sample_rate(),
            "Ingestion started"
        );

        let outcome = loop {
            if *shutdown.borrow_and_update() {
                break Ok(());
            }

            match self.source.receive(self.config.poll_interval).await {
                Ok(Some(frame)) => {
                    if let Err(e) = self.accept(frame) {
                        break Err(e);
                    }
                }
                Ok(None) => self.metrics.record_empty_poll(),
                Err(ContractError::FrameDecode { message }) => {
                    self.metrics.record_decode_error();
                    counter!("daq_pipeline_frames_rejected_total", "reason" => "decode").increment(1);
                    warn!(%message, "Dropping undecodable frame");
                }
                Err(e) if e.is_fatal_for_ingestion() => {
                    error!(error = %e, "Frame source lost, stopping ingestion");
                    break Err(IngestionError::SourceUnavailable {
                        message: e.to_string(),
                    });
                }
                Err(e) => warn!(error = %e, "Frame source error"),
            }
        };

        self.source.close().await;
        outcome?;

        info!(
            frames = self.frames,
            current_index = self.current_index,
            "Ingestion stopped"
        );
        Ok(IngestionReport {
            frames: self.frames,
            current_index: self.current_index,
            last_sequence: self.guard.last_sequence(),
        })
    }

    fn accept(&mut self, frame: Frame) -> Result<()> {
        let sequence = frame.sequence_number;
        match self.guard.observe(sequence) {
            ContinuityResult::Gap { expected, actual } => {
                error!(
                    expected,
                    actual,
                    current_index = self.current_index,
                    "Sequence gap detected, stopping ingestion"
                );
                counter!("daq_pipeline_sequence_gaps_total").increment(1);
                return Err(IngestionError::SequenceGap { expected, actual });
            }
            ContinuityResult::FirstFrame => {
                debug!(sequence, "First frame");
            }
            ContinuityResult::Continuous => {}
        }

        match self.writer.append(&frame) {
            Ok(range) => {
                self.current_index = range.end;
                self.frames += 1;
                self.metrics.record_appended(sequence, frame.rows());
                counter!("daq_pipeline_frames_total").increment(1);
                counter!("daq_pipeline_samples_total").increment(range.len());
                gauge!("daq_pipeline_current_index").set(range.end as f64);
                Ok(())
            }
            Err(BufferError::ChannelMismatch { expected, actual }) => {
                self.metrics.record_rejected();
                counter!("daq_pipeline_frames_rejected_total", "reason" => "columns").increment(1);
                warn!(sequence, expected, actual, "Frame column count mismatch, frame dropped");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
