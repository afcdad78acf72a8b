//! Length-prefixed frame transport.
//!
//! Every message is a big-endian `u32` payload length followed by a
//! bincode-encoded [`WireMessage`]. A connection starts with one
//! `StreamInfo` message, then carries `Frame` messages.

use bytes::{Buf, BufMut, BytesMut};
use contracts::{ContractError, Frame};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Upper bound on a single message payload
pub const MAX_MESSAGE_LEN: usize = 64 * 1024 * 1024;

const LEN_PREFIX: usize = 4;

/// Frame payload in row-major order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    pub sequence_number: u64,
    pub timestamp_us: i64,
    pub rows: u32,
    pub columns: u32,
    pub data: Vec<f64>,
}

impl WireFrame {
    pub fn into_frame(self) -> Result<Frame, ContractError> {
        let (rows, columns) = (self.rows as usize, self.columns as usize);
        Frame::from_row_slice(
            self.sequence_number,
            self.timestamp_us,
            rows,
            columns,
            &self.data,
        )
        .ok_or_else(|| ContractError::FrameDecode {
            message: format!(
                "frame {}: {} values for {}x{} payload",
                self.sequence_number,
                self.data.len(),
                rows,
                columns
            ),
        })
    }
}

impl From<&Frame> for WireFrame {
    fn from(frame: &Frame) -> Self {
        Self {
            sequence_number: frame.sequence_number,
            timestamp_us: frame.timestamp_us,
            rows: frame.rows() as u32,
            columns: frame.columns() as u32,
            data: frame.to_row_major(),
        }
    }
}

/// Messages exchanged with the acquisition server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireMessage {
    /// Stream layout, sent once per connection
    StreamInfo {
        sample_rate: f64,
        channels: Vec<String>,
    },
    Frame(WireFrame),
}

/// Append one encoded message to `dst`.
pub fn encode(message: &WireMessage, dst: &mut BytesMut) -> Result<(), ContractError> {
    let payload = bincode::serialize(message).map_err(|e| ContractError::FrameDecode {
        message: format!("encode failed: {e}"),
    })?;
    if payload.len() > MAX_MESSAGE_LEN {
        return Err(ContractError::FrameDecode {
            message: format!("message of {} bytes exceeds limit", payload.len()),
        });
    }
    dst.reserve(LEN_PREFIX + payload.len());
    dst.put_u32(payload.len() as u32);
    dst.put_slice(&payload);
    Ok(())
}

/// Take one complete message off the front of `src`.
///
/// Returns `Ok(None)` until a whole message is buffered; partial messages
/// stay in `src`. A malformed payload is consumed and reported as
/// `FrameDecode`. An out-of-range length prefix means message boundaries
/// are lost: `src` is cleared and `SourceUnavailable` is returned.
pub fn decode(src: &mut BytesMut) -> Result<Option<WireMessage>, ContractError> {
    if src.len() < LEN_PREFIX {
        return Ok(None);
    }
    let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
    if len > MAX_MESSAGE_LEN {
        src.clear();
        return Err(ContractError::SourceUnavailable {
            message: format!("framing lost: announced message length {len} exceeds limit"),
        });
    }
    if src.len() < LEN_PREFIX + len {
        src.reserve(LEN_PREFIX + len - src.len());
        return Ok(None);
    }

    src.advance(LEN_PREFIX);
    let payload = src.split_to(len);
    bincode::deserialize(&payload)
        .map(Some)
        .map_err(|e| ContractError::FrameDecode {
            message: format!("malformed message: {e}"),
        })
}

/// Encode and write one message.
pub async fn write_message<W>(writer: &mut W, message: &WireMessage) -> Result<(), ContractError>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::new();
    encode(message, &mut buf)?;
    writer.write_all(&buf).await?;
    Ok(())
}
