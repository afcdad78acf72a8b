//! Frame source implementations

mod channel;
mod synthetic;
mod tcp;

pub use channel::ChannelFrameSource;
pub use synthetic::SyntheticFrameSource;
pub use tcp::TcpFrameSource;

use std::time::Duration;

use contracts::{ChannelId, ContractError, Frame, FrameSource, SourceConfig, SourceKind};
use tracing::instrument;

use crate::error::{IngestionError, Result};

/// Connect timeout for network sources
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Any of the built-in frame sources
pub enum AnyFrameSource {
    Channel(ChannelFrameSource),
    Synthetic(SyntheticFrameSource),
    Tcp(TcpFrameSource),
}

impl AnyFrameSource {
    /// Open the source described by `config`
    #[instrument(name = "open_frame_source", skip(config), fields(kind = ?config.kind))]
    pub async fn open(config: &SourceConfig) -> Result<Self> {
        match config.kind {
            SourceKind::Synthetic => Ok(Self::Synthetic(SyntheticFrameSource::new(
                config.synthetic.clone(),
            )?)),
            SourceKind::Tcp => TcpFrameSource::connect(&config.host, config.port, CONNECT_TIMEOUT)
                .await
                .map(Self::Tcp)
                .map_err(|e| IngestionError::SourceUnavailable {
                    message: e.to_string(),
                }),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Channel(_) => "channel",
            Self::Synthetic(_) => "synthetic",
            Self::Tcp(_) => "tcp",
        }
    }
}

impl From<ChannelFrameSource> for AnyFrameSource {
    fn from(source: ChannelFrameSource) -> Self {
        Self::Channel(source)
    }
}

impl FrameSource for AnyFrameSource {
    fn sample_rate(&self) -> f64 {
        match self {
            Self::Channel(s) => s.sample_rate(),
            Self::Synthetic(s) => s.sample_rate(),
            Self::Tcp(s) => s.sample_rate(),
        }
    }

    fn channel_names(&self) -> &[ChannelId] {
        match self {
            Self::Channel(s) => s.channel_names(),
            Self::Synthetic(s) => s.channel_names(),
            Self::Tcp(s) => s.channel_names(),
        }
    }

    async fn receive(&mut self, timeout: Duration) -> std::result::Result<Option<Frame>, ContractError> {
        match self {
            Self::Channel(s) => s.receive(timeout).await,
            Self::Synthetic(s) => s.receive(timeout).await,
            Self::Tcp(s) => s.receive(timeout).await,
        }
    }

    async fn close(&mut self) {
        match self {
            Self::Channel(s) => s.close().await,
            Self::Synthetic(s) => s.close().await,
            Self::Tcp(s) => s.close().await,
        }
    }
}
