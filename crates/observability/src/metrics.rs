//! 广播写入器指标收集模块
//!
//! 记录写入器和各 sink 的运行指标，并在内存中聚合运行摘要。

use metrics::{counter, gauge, histogram};
use std::collections::BTreeMap;

/// 记录一次被写入器接收的缓冲区
pub fn record_buffer_accepted(bytes: usize) {
    counter!("nbtee_buffers_accepted_total").increment(1);
    counter!("nbtee_bytes_accepted_total").increment(bytes as u64);
    histogram!("nbtee_buffer_size_bytes").record(bytes as f64);
}

/// 记录 sink 成功写入
pub fn record_sink_write(sink_name: &str, bytes: usize) {
    counter!("nbtee_sink_writes_total", "sink" => sink_name.to_string()).increment(1);
    counter!("nbtee_sink_bytes_total", "sink" => sink_name.to_string()).increment(bytes as u64);
}

/// 记录 sink 丢弃的缓冲区数量
pub fn record_sink_dropped(sink_name: &str, count: u64) {
    counter!("nbtee_sink_dropped_total", "sink" => sink_name.to_string()).increment(count);
}

/// 记录 sink 写入失败
pub fn record_sink_failure(sink_name: &str) {
    counter!("nbtee_sink_failures_total", "sink" => sink_name.to_string()).increment(1);
}

/// 记录当前注册的 sink 数量
pub fn record_sink_count(count: usize) {
    gauge!("nbtee_sinks").set(count as f64);
}

/// 单个 sink 的投递统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkDelivery {
    /// 成功写入次数
    pub writes: u64,
    /// 成功写入字节数
    pub bytes: u64,
    /// 丢弃的缓冲区数
    pub dropped: u64,
    /// 错误信息 (None = 正常结束)
    pub error: Option<String>,
}

impl SinkDelivery {
    /// 投递率 (百分比)
    pub fn delivery_rate(&self) -> f64 {
        let offered = self.writes + self.dropped;
        if offered == 0 {
            100.0
        } else {
            self.writes as f64 / offered as f64 * 100.0
        }
    }
}

/// 运行指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct DeliveryAggregator {
    /// 写入器接收的缓冲区数
    pub total_buffers: u64,

    /// 写入器接收的字节数
    pub total_bytes: u64,

    /// 缓冲区大小统计
    pub buffer_stats: RunningStats,

    /// 各 sink 投递统计 (按名称排序)
    pub sinks: BTreeMap<String, SinkDelivery>,
}

impl DeliveryAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一个被接收的缓冲区
    pub fn record_buffer(&mut self, bytes: usize) {
        self.total_buffers += 1;
        self.total_bytes += bytes as u64;
        self.buffer_stats.push(bytes as f64);
    }

    /// 写入某个 sink 的最终统计，覆盖之前的值
    pub fn set_sink(&mut self, name: impl Into<String>, delivery: SinkDelivery) {
        self.sinks.insert(name.into(), delivery);
    }

    /// 标记某个 sink 出错
    pub fn set_sink_error(&mut self, name: &str, error: impl Into<String>) {
        self.sinks.entry(name.to_string()).or_default().error = Some(error.into());
    }

    /// 出错的 sink 数量
    pub fn failed_sinks(&self) -> usize {
        self.sinks.values().filter(|s| s.error.is_some()).count()
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_buffers: self.total_buffers,
            total_bytes: self.total_bytes,
            buffer_size: StatsSummary::from(&self.buffer_stats),
            sinks: self.sinks.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_buffers: u64,
    pub total_bytes: u64,
    pub buffer_size: StatsSummary,
    pub sinks: BTreeMap<String, SinkDelivery>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Broadcast Summary ===")?;
        writeln!(f, "Buffers written: {}", self.total_buffers)?;
        writeln!(f, "Bytes written: {}", self.total_bytes)?;
        writeln!(f, "Buffer size (bytes): {}", self.buffer_size)?;

        if !self.sinks.is_empty() {
            writeln!(f, "Sinks:")?;
            for (name, sink) in &self.sinks {
                write!(
                    f,
                    "  {}: {} writes, {} bytes, {} dropped ({:.2}% delivered)",
                    name,
                    sink.writes,
                    sink.bytes,
                    sink.dropped,
                    sink.delivery_rate()
                )?;
                match &sink.error {
                    Some(e) => writeln!(f, ", error: {}", e)?,
                    None => writeln!(f)?,
                }
            }
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
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.0}, max={:.0}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
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
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.mean }
    }

    /// 方差
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

    /// 最小值
    pub fn min(&self) -> f64 {
        self.min
    }

    /// 最大值
    pub fn max(&self) -> f64 {
        self.max
    }
}
