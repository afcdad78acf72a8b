//! 合成数据源
//!
//! 生成正弦波帧，用于无采集硬件环境的测试和演示。

use std::f64::consts::PI;
use std::time::Duration;

use chrono::Utc;
use contracts::{ChannelId, ContractError, Frame, FrameSource, SyntheticConfig};
use nalgebra::DMatrix;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{IngestionError, Result};

/// 合成正弦波数据源
///
/// 第 k 个通道相位滞后 `k * 2π/3`（三相系统）。
pub struct SyntheticFrameSource {
    config: SyntheticConfig,
    channels: Vec<ChannelId>,
    /// 下一帧序号
    sequence: u64,
    /// 下一个样本索引
    next_index: u64,
    /// 流起始时刻（墙钟，微秒）
    start_us: i64,
    /// 流起始时刻（单调时钟，用于节拍）
    started: Instant,
}

impl SyntheticFrameSource {
    /// 创建新的合成数据源
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if !(config.sample_rate.is_finite() && config.sample_rate > 0.0) {
            return Err(IngestionError::InvalidConfig(format!(
                "synthetic sample rate must be positive, got {}",
                config.sample_rate
            )));
        }
        if config.frame_rows == 0 || config.channels.is_empty() {
            return Err(IngestionError::InvalidConfig(
                "synthetic source needs at least one channel and one row per frame".into(),
            ));
        }
        let channels = config.channels.iter().map(ChannelId::from).collect();
        Ok(Self {
            config,
            channels,
            sequence: 0,
            next_index: 0,
            start_us: Utc::now().timestamp_micros(),
            started: Instant::now(),
        })
    }

    /// 下一帧应就绪的时刻
    fn due_at(&self) -> Instant {
        let end_index = self.next_index + self.config.frame_rows as u64;
        self.started + Duration::from_secs_f64(end_index as f64 / self.config.sample_rate)
    }

    fn generate(&mut self) -> Frame {
        let rows = self.config.frame_rows;
        let rate = self.config.sample_rate;
        let omega = 2.0 * PI * self.config.signal_hz;
        let amplitude = self.config.amplitude;
        let first = self.next_index;

        let samples = DMatrix::from_fn(rows, self.channels.len(), |r, c| {
            let t = (first + r as u64) as f64 / rate;
            amplitude * (omega * t - c as f64 * 2.0 * PI / 3.0).sin()
        });

        let newest = first + rows as u64 - 1;
        let timestamp_us = self.start_us + (newest as f64 * 1e6 / rate).round() as i64;
        let frame = Frame::new(self.sequence, timestamp_us, samples);

        self.sequence += 1;
        self.next_index += rows as u64;
        frame
    }
}

impl FrameSource for SyntheticFrameSource {
    fn sample_rate(&self) -> f64 {
        self.config.sample_rate
    }

    fn channel_names(&self) -> &[ChannelId] {
        &self.channels
    }

    async fn receive(&mut self, timeout: Duration) -> std::result::Result<Option<Frame>, ContractError> {
        if self.config.realtime {
            let due = self.due_at();
            let deadline = Instant::now() + timeout;
            if due > deadline {
                tokio::time::sleep_until(deadline).await;
                return Ok(None);
            }
            tokio::time::sleep_until(due).await;
        } else {
            // unpaced generation never blocks; let other tasks run
            tokio::task::yield_now().await;
        }
        Ok(Some(self.generate()))
    }

    async fn close(&mut self) {
        debug!(frames = self.sequence, "synthetic source closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(realtime: bool) -> SyntheticConfig {
        SyntheticConfig {
            sample_rate: 1000.0,
            channels: vec!["u1".into(), "u2".into(), "u3".into()],
            frame_rows: 100,
            signal_hz: 50.0,
            amplitude: 10.0,
            realtime,
        }
    }

    #[tokio::test]
    async fn test_unpaced_frames_are_contiguous() {
        let mut source = SyntheticFrameSource::new(config(false)).unwrap();
        for expected in 0..5 {
            let frame = source
                .receive(Duration::from_millis(1))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(frame.sequence_number, expected);
            assert_eq!(frame.rows(), 100);
            assert_eq!(frame.columns(), 3);
        }
    }

    #[tokio::test]
    async fn test_phases_are_shifted() {
        let mut source = SyntheticFrameSource::new(config(false)).unwrap();
        let frame = source.receive(Duration::ZERO).await.unwrap().unwrap();
        // t = 0: sin(0), sin(-2π/3), sin(-4π/3)
        assert!(frame.samples[(0, 0)].abs() < 1e-9);
        assert!(frame.samples[(0, 1)] < 0.0);
        assert!(frame.samples[(0, 2)] > 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paced_source_waits_for_data() {
        let mut source = SyntheticFrameSource::new(config(true)).unwrap();
        // first frame is due after 100 ms
        assert!(source
            .receive(Duration::from_millis(50))
            .await
            .unwrap()
            .is_none());
        assert!(source
            .receive(Duration::from_millis(60))
            .await
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_rejects_bad_config() {
        let mut bad = config(false);
        bad.sample_rate = 0.0;
        assert!(SyntheticFrameSource::new(bad).is_err());
    }
}
