//! FrameSource trait - acquisition/transport abstraction
//!
//! Decouples the ingestion loop from the concrete transport. In-process
//! channels, synthetic generators and network subscribers all implement it.

use std::time::Duration;

use crate::{ChannelId, ContractError, Frame};

/// Frame source
///
/// Stream metadata (sample rate, channel layout) is fixed for the lifetime of
/// a source. Frames are delivered in transport order; the ingestion loop, not
/// the source, decides whether a sequence number is acceptable.
///
/// # Example
///
/// ```ignore
/// let mut source = SyntheticFrameSource::new(config);
/// while let Some(frame) = source.receive(Duration::from_millis(50)).await? {
///     println!("frame {} with {} rows", frame.sequence_number, frame.rows());
/// }
/// source.close().await;
/// ```
#[trait_variant::make(FrameSource: Send)]
pub trait LocalFrameSource {
    /// Samples per second per channel
    fn sample_rate(&self) -> f64;

    /// Channel names, in payload column order
    fn channel_names(&self) -> &[ChannelId];

    /// Wait up to `timeout` for the next frame
    ///
    /// `Ok(None)` means nothing arrived within the poll interval and is not
    /// an error.
    ///
    /// # Errors
    /// `SourceUnavailable` when the connection is lost, `FrameDecode` for a
    /// malformed frame.
    async fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>, ContractError>;

    /// Terminate the subscription
    async fn close(&mut self);
}
