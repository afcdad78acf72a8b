//! In-process frame source fed through an `async-channel`.

use std::time::Duration;

use async_channel::{bounded, Receiver, Sender};
use contracts::{ChannelId, ContractError, Frame, FrameSource};
use tracing::debug;

/// Frame source whose frames are pushed by another task
pub struct ChannelFrameSource {
    rx: Receiver<Frame>,
    sample_rate: f64,
    channels: Vec<ChannelId>,
}

impl ChannelFrameSource {
    /// Create the source and the sender that feeds it
    pub fn new(
        sample_rate: f64,
        channels: Vec<ChannelId>,
        capacity: usize,
    ) -> (Sender<Frame>, Self) {
        let (tx, rx) = bounded(capacity.max(1));
        (
            tx,
            Self {
                rx,
                sample_rate,
                channels,
            },
        )
    }
}

impl FrameSource for ChannelFrameSource {
    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn channel_names(&self) -> &[ChannelId] {
        &self.channels
    }

    async fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>, ContractError> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Ok(frame)) => Ok(Some(frame)),
            Ok(Err(_)) => Err(ContractError::SourceUnavailable {
                message: "frame channel closed".into(),
            }),
            Err(_) => Ok(None),
        }
    }

    async fn close(&mut self) {
        self.rx.close();
        debug!("channel frame source closed");
    }
}
