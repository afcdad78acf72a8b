//! 采集管道指标收集模块
//!
//! 记录快照、事件、缓冲区与分发相关的运行指标。

use std::collections::BTreeMap;

use contracts::{Event, EventEdge, Snapshot};
use metrics::{counter, gauge, histogram};

/// 记录一次快照触发
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_snapshot;
///
/// if let Some(snapshot) = scheduler.fire()? {
///     record_snapshot(&snapshot);
/// }
/// ```
pub fn record_snapshot(snapshot: &Snapshot) {
    // 快照计数器
    counter!("daq_pipeline_snapshots_total").increment(1);

    // 快照 ID 与覆盖范围末端
    gauge!("daq_pipeline_last_snapshot_id").set(snapshot.snapshot_id as f64);
    gauge!("daq_pipeline_last_snapshot_end").set(snapshot.range.end as f64);

    // 每个快照覆盖的样本数
    histogram!("daq_pipeline_snapshot_samples").record(snapshot.range.len() as f64);

    // 缺失值数量
    let missing = snapshot
        .values
        .values()
        .filter(|v| v.as_scalar().is_none())
        .count();
    gauge!("daq_pipeline_snapshot_missing_values").set(missing as f64);
}

/// 记录跳过的快照触发（无新数据）
pub fn record_snapshot_skipped() {
    counter!("daq_pipeline_snapshots_skipped_total").increment(1);
}

/// 记录检测到的事件
pub fn record_events(events: &[Event]) {
    for event in events {
        let edge = match event.edge {
            EventEdge::Enter => "enter",
            EventEdge::Exit => "exit",
        };
        counter!(
            "daq_pipeline_events_total",
            "channel" => event.channel.to_string(),
            "edge" => edge
        )
        .increment(1);
    }
}

/// 记录缓冲区填充率
pub fn record_buffer_fill(fill_ratio: f64, current_index: u64) {
    gauge!("daq_pipeline_buffer_fill_ratio").set(fill_ratio);
    gauge!("daq_pipeline_buffer_current_index").set(current_index as f64);
}

/// 记录分发到 sink 的结果
pub fn record_sink_delivery(sink_name: &str, kind: &'static str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "daq_pipeline_sink_deliveries_total",
        "sink" => sink_name.to_string(),
        "kind" => kind,
        "status" => status
    )
    .increment(1);
}

/// 记录因队列满被丢弃的消息
pub fn record_sink_dropped(sink_name: &str) {
    counter!(
        "daq_pipeline_sink_dropped_total",
        "sink" => sink_name.to_string()
    )
    .increment(1);
}

/// 记录 sink 写入耗时
pub fn record_sink_latency_ms(sink_name: &str, latency_ms: f64) {
    histogram!(
        "daq_pipeline_sink_write_ms",
        "sink" => sink_name.to_string()
    )
    .record(latency_ms);
}

/// 管道指标聚合器
///
/// 在内存中聚合指标，便于运行结束时输出摘要。
#[derive(Debug, Clone, Default)]
pub struct PipelineMetricsAggregator {
    /// 快照总数
    pub total_snapshots: u64,

    /// 跳过的触发次数
    pub skipped_firings: u64,

    /// 快照覆盖的样本总数
    pub total_samples: u64,

    /// 事件总数
    pub total_events: u64,

    /// 每个快照的样本数统计
    pub samples_per_snapshot: RunningStats,

    /// 相邻快照的墙钟间隔统计 (毫秒)
    pub snapshot_interval_ms: RunningStats,

    /// 各通道事件次数
    pub event_counts: BTreeMap<String, u64>,

    last_wall_ms: Option<i64>,
}

impl PipelineMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新快照统计
    pub fn record_snapshot(&mut self, snapshot: &Snapshot) {
        self.total_snapshots += 1;
        self.total_samples += snapshot.range.len();
        self.samples_per_snapshot.push(snapshot.range.len() as f64);

        let wall_ms = snapshot.wall_time.timestamp_millis();
        if let Some(last) = self.last_wall_ms {
            self.snapshot_interval_ms.push((wall_ms - last) as f64);
        }
        self.last_wall_ms = Some(wall_ms);
    }

    /// 更新跳过统计
    pub fn record_skipped(&mut self) {
        self.skipped_firings += 1;
    }

    /// 更新事件统计
    pub fn record_events(&mut self, events: &[Event]) {
        self.total_events += events.len() as u64;
        for event in events {
            *self
                .event_counts
                .entry(event.channel.to_string())
                .or_insert(0) += 1;
        }
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_snapshots: self.total_snapshots,
            skipped_firings: self.skipped_firings,
            total_samples: self.total_samples,
            total_events: self.total_events,
            samples_per_snapshot: StatsSummary::from(&self.samples_per_snapshot),
            snapshot_interval_ms: StatsSummary::from(&self.snapshot_interval_ms),
            event_counts: self.event_counts.clone(),
        }
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_snapshots: u64,
    pub skipped_firings: u64,
    pub total_samples: u64,
    pub total_events: u64,
    pub samples_per_snapshot: StatsSummary,
    pub snapshot_interval_ms: StatsSummary,
    pub event_counts: BTreeMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Pipeline Metrics Summary ===")?;
        writeln!(f, "Snapshots: {}", self.total_snapshots)?;
        writeln!(f, "Skipped firings: {}", self.skipped_firings)?;
        writeln!(f, "Samples covered: {}", self.total_samples)?;
        writeln!(f, "Samples per snapshot: {}", self.samples_per_snapshot)?;
        writeln!(f, "Snapshot interval (ms): {}", self.snapshot_interval_ms)?;
        writeln!(f, "Events: {}", self.total_events)?;

        for (channel, count) in &self.event_counts {
            writeln!(f, "  {}: {}", channel, count)?;
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            return write!(f, "N/A");
        }
        write!(
            f,
            "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
            self.min, self.max, self.mean, self.std_dev, self.count
        )
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
            return;
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
