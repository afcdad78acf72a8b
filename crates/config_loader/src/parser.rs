//! 配置解析模块
//!
//! 支持 TOML (主要) 和 JSON (可选) 格式。

use contracts::{ContractError, PipelineBlueprint};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// 解析 TOML 格式配置
pub fn parse_toml(content: &str) -> Result<PipelineBlueprint, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 解析 JSON 格式配置
pub fn parse_json(content: &str) -> Result<PipelineBlueprint, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 根据格式解析配置
pub fn parse(content: &str, format: ConfigFormat) -> Result<PipelineBlueprint, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Cadence, SinkType, SourceKind};

    #[test]
    fn test_parse_toml_minimal() {
        let content = r#"
[source]
host = "daq.local"
port = 50001

[[storage]]
name = "log_sink"
sink_type = "log"
"#;
        let result = parse_toml(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.source.kind, SourceKind::Tcp);
        assert_eq!(bp.source.host, "daq.local");
        assert_eq!(bp.buffer.retention_sec, 10.0);
        assert_eq!(bp.snapshot.trigger, Cadence::Seconds(1.0));
        assert_eq!(bp.storage[0].sink_type, SinkType::Log);
        assert!(bp.storage[0].events);
    }

    #[test]
    fn test_parse_toml_partial_sections() {
        let content = r#"
[source]
kind = "synthetic"

[source.synthetic]
sample_rate = 2000.0

[display]
max_span_sec = 5.0

[snapshot]
trigger = { samples = 500 }
"#;
        let bp = parse_toml(content).unwrap();
        assert_eq!(bp.source.synthetic.sample_rate, 2000.0);
        assert_eq!(bp.source.synthetic.channels, vec!["u1", "i1"]);
        assert_eq!(bp.display.max_span_sec, 5.0);
        assert_eq!(bp.display.min_span_sec, 0.01);
        assert_eq!(bp.snapshot.trigger, Cadence::Samples(500));
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "source": { "kind": "tcp", "host": "127.0.0.1", "port": 6000 },
            "engine": {
                "channels": ["u1"],
                "phases": [{ "name": "L1", "u_channel": "u1", "i_channel": "i1" }]
            },
            "storage": [{
                "name": "csv",
                "sink_type": "csv",
                "channels": ["u1_rms"],
                "cadence": { "seconds": 10.0 },
                "params": { "path": "out/u1.csv" }
            }],
            "detectors": [{ "channel": "u1", "kind": "level_low", "threshold": 207.0 }]
        }"#;
        let result = parse_json(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.storage[0].cadence, Some(Cadence::Seconds(10.0)));
        assert_eq!(bp.detectors[0].hysteresis, 0.0);
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let content = "invalid toml [[[";
        let result = parse_toml(content);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_missing_source_section() {
        let result = parse_toml("[buffer]\nretention_sec = 5.0\n");
        assert!(matches!(result, Err(ContractError::ConfigParse { .. })));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_extension("toml"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("TOML"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("json"),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
