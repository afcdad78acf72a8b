//! Ingestion 错误类型

use channel_buffer::BufferError;
use contracts::ContractError;
use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 帧序号不连续（致命，停止采集）
    #[error("sequence gap: expected frame {expected}, got {actual}")]
    SequenceGap {
        /// 期望的序号
        expected: u64,
        /// 实际收到的序号
        actual: u64,
    },

    /// 数据源连接丢失或无法建立（致命）
    #[error("frame source unavailable: {message}")]
    SourceUnavailable {
        /// 错误消息
        message: String,
    },

    /// 缓冲区拒绝写入
    #[error("buffer error: {0}")]
    Buffer(#[from] BufferError),

    /// 数据源配置无效
    #[error("invalid source config: {0}")]
    InvalidConfig(String),
}

impl IngestionError {
    /// 是否需要停止采集
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SequenceGap { .. } | Self::SourceUnavailable { .. }
        )
    }
}

impl From<IngestionError> for ContractError {
    fn from(err: IngestionError) -> Self {
        match err {
            IngestionError::SequenceGap { expected, actual } => {
                ContractError::SequenceGap { expected, actual }
            }
            IngestionError::SourceUnavailable { message } => {
                ContractError::SourceUnavailable { message }
            }
            IngestionError::Buffer(e) => e.into(),
            IngestionError::InvalidConfig(message) => {
                ContractError::config_validation("source", message)
            }
        }
    }
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;
