//! TCP frame source speaking the length-prefixed wire format.

use std::time::Duration;

use bytes::BytesMut;
use contracts::{ChannelId, ContractError, Frame, FrameSource};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::wire::{decode, WireMessage};

const READ_CHUNK: usize = 64 * 1024;

/// Frame source reading from an acquisition server
pub struct TcpFrameSource {
    stream: TcpStream,
    buf: BytesMut,
    sample_rate: f64,
    channels: Vec<ChannelId>,
    peer: String,
}

impl TcpFrameSource {
    /// Connect and read the stream-info header.
    ///
    /// Fails with `SourceUnavailable` if no connection or header arrives
    /// within `timeout`.
    #[instrument(name = "tcp_source_connect", skip(timeout))]
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, ContractError> {
        let peer = format!("{host}:{port}");
        let unavailable = |message: String| ContractError::SourceUnavailable { message };

        let stream = tokio::time::timeout(timeout, TcpStream::connect(&peer))
            .await
            .map_err(|_| unavailable(format!("connect to {peer} timed out")))?
            .map_err(|e| unavailable(format!("connect to {peer}: {e}")))?;
        stream.set_nodelay(true)?;

        let mut source = Self {
            stream,
            buf: BytesMut::with_capacity(READ_CHUNK),
            sample_rate: 0.0,
            channels: Vec::new(),
            peer,
        };

        let deadline = Instant::now() + timeout;
        match source.next_message(deadline).await? {
            Some(WireMessage::StreamInfo {
                sample_rate,
                channels,
            }) => {
                source.sample_rate = sample_rate;
                source.channels = channels.into_iter().map(ChannelId::from).collect();
            }
            Some(WireMessage::Frame(_)) => {
                return Err(ContractError::FrameDecode {
                    message: "frame received before stream info".into(),
                });
            }
            None => {
                return Err(unavailable(format!(
                    "no stream info from {} within {:?}",
                    source.peer, timeout
                )));
            }
        }

        info!(
            peer = %source.peer,
            sample_rate = source.sample_rate,
            channels = source.channels.len(),
            "Connected to acquisition server"
        );
        Ok(source)
    }

    /// Next complete message, or `None` at the deadline.
    async fn next_message(&mut self, deadline: Instant) -> Result<Option<WireMessage>, ContractError> {
        loop {
            if let Some(message) = decode(&mut self.buf)? {
                return Ok(Some(message));
            }
            self.buf.reserve(READ_CHUNK);
            // read_buf is cancel safe: bytes read so far stay in `buf`
            match tokio::time::timeout_at(deadline, self.stream.read_buf(&mut self.buf)).await {
                Ok(Ok(0)) => {
                    return Err(ContractError::SourceUnavailable {
                        message: format!("{} closed the connection", self.peer),
                    });
                }
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => {
                    return Err(ContractError::SourceUnavailable {
                        message: format!("{}: {e}", self.peer),
                    });
                }
                Err(_) => return Ok(None),
            }
        }
    }
}

impl FrameSource for TcpFrameSource {
    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn channel_names(&self) -> &[ChannelId] {
        &self.channels
    }

    async fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>, ContractError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.next_message(deadline).await? {
                Some(WireMessage::Frame(wire)) => return wire.into_frame().map(Some),
                Some(WireMessage::StreamInfo { .. }) => {
                    warn!(peer = %self.peer, "Ignoring repeated stream info");
                }
                None => return Ok(None),
            }
        }
    }

    async fn close(&mut self) {
        use tokio::io::AsyncWriteExt;
        if let Err(e) = self.stream.shutdown().await {
            debug!(peer = %self.peer, error = %e, "shutdown failed");
        }
        debug!(peer = %self.peer, "tcp source closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{write_message, WireFrame};
    use tokio::net::TcpListener;

    async fn serve(messages: Vec<WireMessage>) -> u16 {
        serve_with_tail(messages, Vec::new()).await
    }

    /// Serve `messages`, then write `tail` verbatim.
    async fn serve_with_tail(messages: Vec<WireMessage>, tail: Vec<u8>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            for message in &messages {
                write_message(&mut socket, message).await.unwrap();
            }
            if !tail.is_empty() {
                use tokio::io::AsyncWriteExt;
                socket.write_all(&tail).await.unwrap();
            }
            // keep the connection open until the client hangs up
            let mut sink = [0u8; 16];
            let _ = socket.read(&mut sink).await;
        });
        port
    }

    fn info() -> WireMessage {
        WireMessage::StreamInfo {
            sample_rate: 500.0,
            channels: vec!["u1".into(), "i1".into()],
        }
    }

    fn frame(seq: u64) -> WireMessage {
        WireMessage::Frame(WireFrame {
            sequence_number: seq,
            timestamp_us: seq as i64 * 1000,
            rows: 3,
            columns: 2,
            data: vec![1.0, -1.0, 2.0, -2.0, 3.0, -3.0],
        })
    }

    #[tokio::test]
    async fn test_connect_reads_stream_info() {
        let port = serve(vec![info(), frame(0), frame(1)]).await;
        let mut source = TcpFrameSource::connect("127.0.0.1", port, Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(source.sample_rate(), 500.0);
        assert_eq!(source.channel_names()[1], "i1");

        let first = source.receive(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(first.sequence_number, 0);
        assert_eq!(first.samples[(2, 1)], -3.0);
        let second = source.receive(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(second.sequence_number, 1);

        // nothing more within the poll interval
        assert!(source
            .receive(Duration::from_millis(20))
            .await
            .unwrap()
            .is_none());
        source.close().await;
    }

    #[tokio::test]
    async fn test_frame_before_info_rejected() {
        let port = serve(vec![frame(0)]).await;
        let result = TcpFrameSource::connect("127.0.0.1", port, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(ContractError::FrameDecode { .. })));
    }

    #[tokio::test]
    async fn test_connection_refused_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = TcpFrameSource::connect("127.0.0.1", port, Duration::from_millis(500)).await;
        assert!(matches!(result, Err(ContractError::SourceUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_corrupt_length_prefix_halts_ingestion() {
        use crate::{IngestionConfig, IngestionError, IngestionLoop};
        use tokio::sync::watch;

        let mut tail = u32::MAX.to_be_bytes().to_vec();
        tail.extend_from_slice(&[0u8; 64]);
        let port = serve_with_tail(vec![info(), frame(0)], tail).await;

        let source = TcpFrameSource::connect("127.0.0.1", port, Duration::from_secs(2))
            .await
            .unwrap();
        let (writer, reader) = channel_buffer::channel_buffer(
            source.channel_names().to_vec(),
            source.sample_rate(),
            1.0,
        )
        .unwrap();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let ingestion = IngestionLoop::new(
            source,
            writer,
            IngestionConfig {
                poll_interval: Duration::from_millis(50),
            },
        );
        let metrics = ingestion.metrics();
        let result = tokio::time::timeout(Duration::from_secs(5), ingestion.run(shutdown_rx))
            .await
            .expect("ingestion must stop on lost framing");

        assert!(matches!(result, Err(IngestionError::SourceUnavailable { .. })));
        assert_eq!(reader.current_index(), 3);
        assert_eq!(metrics.snapshot().decode_errors, 0);
    }
}
