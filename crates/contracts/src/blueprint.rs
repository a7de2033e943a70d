//! TeeBlueprint - Config Loader 输出
//!
//! 描述广播写入器的完整配置：队列深度与输出目标列表。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的配置蓝图
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeeBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 广播写入器设置
    #[serde(default)]
    pub tee: TeeConfig,

    /// 输出目标列表
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

/// 广播写入器设置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeeConfig {
    /// 每个 sink 可排队的缓冲区数量，超出后该 sink 开始丢数据
    ///
    /// 大于 1 时，队列达到 capacity-1 后，后续写入会被该 sink 跳过，
    /// 直到队列被清空。
    #[serde(default = "default_bufs_per_sink")]
    pub bufs_per_sink: usize,
}

impl Default for TeeConfig {
    fn default() -> Self {
        Self {
            bufs_per_sink: default_bufs_per_sink(),
        }
    }
}

impl TeeConfig {
    /// Config with the given per-sink queue depth
    pub fn with_bufs_per_sink(bufs_per_sink: usize) -> Self {
        Self { bufs_per_sink }
    }
}

fn default_bufs_per_sink() -> usize {
    8
}

/// Sink 输出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink 名称
    pub name: String,

    /// Sink 类型
    pub sink_type: SinkType,

    /// 队列深度 (覆盖 `tee.bufs_per_sink`)
    #[serde(default)]
    pub bufs_per_sink: Option<usize>,

    /// 类型特定参数
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// Sink 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// 日志输出
    Log,
    /// 文件输出
    File,
    /// 标准输出
    Stdout,
    /// 网络输出 (TCP)
    Tcp,
}

impl SinkType {
    /// Parameters that must be present for this sink type
    pub fn required_params(&self) -> &'static [&'static str] {
        match self {
            SinkType::Log | SinkType::Stdout => &[],
            SinkType::File => &["path"],
            SinkType::Tcp => &["addr"],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tee_config_default() {
        assert_eq!(TeeConfig::default().bufs_per_sink, 8);
    }

    #[test]
    fn test_blueprint_defaults_from_json() {
        let bp: TeeBlueprint = serde_json::from_str(r#"{ "sinks": [] }"#).unwrap();
        assert_eq!(bp.version, ConfigVersion::V1);
        assert_eq!(bp.tee, TeeConfig::default());
        assert!(bp.sinks.is_empty());
    }

    #[test]
    fn test_sink_type_snake_case() {
        let sink: SinkConfig =
            serde_json::from_str(r#"{ "name": "out", "sink_type": "stdout" }"#).unwrap();
        assert_eq!(sink.sink_type, SinkType::Stdout);
        assert_eq!(sink.bufs_per_sink, None);
        assert!(sink.params.is_empty());
    }

    #[test]
    fn test_required_params() {
        assert_eq!(SinkType::File.required_params(), &["path"]);
        assert!(SinkType::Log.required_params().is_empty());
    }
}
