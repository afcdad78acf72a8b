//! 配置校验模块
//!
//! 校验规则：
//! - 数据源参数合法 (poll_interval_ms > 0, 合成源 sample_rate > 0)
//! - retention_sec > 0
//! - min_span_sec <= default_span_sec <= max_span_sec
//! - 快照触发间隔 > 0 且小于 retention
//! - storage 名称唯一、非空，节奏 > 0，通道属于引擎输出
//! - 检测器 hysteresis >= 0，通道存在

use std::collections::HashSet;

use contracts::{
    Cadence, ChannelId, ContractError, OutputChannelSet, PipelineBlueprint, SinkType, SourceKind,
};

/// 校验 PipelineBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    validate_source(blueprint)?;
    validate_buffer(blueprint)?;
    validate_display(blueprint)?;
    validate_engine(blueprint)?;
    validate_snapshot(blueprint)?;
    validate_storage(blueprint)?;
    validate_detectors(blueprint)?;
    Ok(())
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

/// 未连接数据源时已知的输入通道
fn known_input_channels(blueprint: &PipelineBlueprint) -> Option<Vec<ChannelId>> {
    blueprint.static_source_channels()
}

/// 未连接数据源时已知的引擎输出通道
fn known_output_channels(blueprint: &PipelineBlueprint) -> Option<OutputChannelSet> {
    let engine = &blueprint.engine;
    match known_input_channels(blueprint) {
        Some(source) => Some(engine.output_channels(&source)),
        None if !engine.channels.is_empty() => Some(engine.output_channels(&[])),
        None => None,
    }
}

/// 校验数据源配置
fn validate_source(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    let source = &blueprint.source;
    if source.poll_interval_ms == 0 {
        return Err(ContractError::config_validation(
            "source.poll_interval_ms",
            "poll_interval_ms must be > 0",
        ));
    }

    match source.kind {
        SourceKind::Tcp => {
            if source.host.is_empty() {
                return Err(ContractError::config_validation(
                    "source.host",
                    "host cannot be empty",
                ));
            }
        }
        SourceKind::Synthetic => {
            let synthetic = &source.synthetic;
            if !positive(synthetic.sample_rate) {
                return Err(ContractError::config_validation(
                    "source.synthetic.sample_rate",
                    format!("sample_rate must be > 0, got {}", synthetic.sample_rate),
                ));
            }
            if synthetic.frame_rows == 0 {
                return Err(ContractError::config_validation(
                    "source.synthetic.frame_rows",
                    "frame_rows must be > 0",
                ));
            }
            if synthetic.channels.is_empty() {
                return Err(ContractError::config_validation(
                    "source.synthetic.channels",
                    "at least one channel is required",
                ));
            }
            let mut seen = HashSet::new();
            for channel in &synthetic.channels {
                if !seen.insert(channel) {
                    return Err(ContractError::config_validation(
                        format!("source.synthetic.channels[{channel}]"),
                        "duplicate channel",
                    ));
                }
            }
        }
    }
    Ok(())
}

/// 校验缓冲区配置
fn validate_buffer(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    let retention = blueprint.buffer.retention_sec;
    if !positive(retention) {
        return Err(ContractError::config_validation(
            "buffer.retention_sec",
            format!("retention_sec must be > 0, got {retention}"),
        ));
    }
    Ok(())
}

/// 校验显示窗口范围
fn validate_display(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    let display = &blueprint.display;
    if !positive(display.min_span_sec) {
        return Err(ContractError::config_validation(
            "display.min_span_sec",
            format!("min_span_sec must be > 0, got {}", display.min_span_sec),
        ));
    }
    if display.min_span_sec > display.max_span_sec {
        return Err(ContractError::config_validation(
            "display.min_span_sec / display.max_span_sec",
            format!(
                "min_span_sec ({}) must be <= max_span_sec ({})",
                display.min_span_sec, display.max_span_sec
            ),
        ));
    }
    if display.default_span_sec < display.min_span_sec
        || display.default_span_sec > display.max_span_sec
    {
        return Err(ContractError::config_validation(
            "display.default_span_sec",
            format!(
                "default_span_sec ({}) must lie within [{}, {}]",
                display.default_span_sec, display.min_span_sec, display.max_span_sec
            ),
        ));
    }
    if display.refresh_ms == 0 {
        return Err(ContractError::config_validation(
            "display.refresh_ms",
            "refresh_ms must be > 0",
        ));
    }
    Ok(())
}

/// 校验引擎通道绑定
fn validate_engine(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    let engine = &blueprint.engine;
    let inputs: Option<HashSet<String>> = known_input_channels(blueprint)
        .map(|channels| channels.iter().map(|c| c.to_string()).collect());
    let check_known = |field: String, channel: &str| -> Result<(), ContractError> {
        match &inputs {
            Some(known) if !known.contains(channel) => Err(ContractError::config_validation(
                field,
                format!("channel '{channel}' not found in source channels"),
            )),
            _ => Ok(()),
        }
    };

    let mut seen = HashSet::new();
    for channel in &engine.channels {
        if !seen.insert(channel) {
            return Err(ContractError::config_validation(
                format!("engine.channels[{channel}]"),
                "duplicate channel",
            ));
        }
        check_known(format!("engine.channels[{channel}]"), channel.as_str())?;
    }

    let mut names = HashSet::new();
    for phase in &engine.phases {
        if phase.name.is_empty() {
            return Err(ContractError::config_validation(
                "engine.phases.name",
                "phase name cannot be empty",
            ));
        }
        if !names.insert(&phase.name) {
            return Err(ContractError::config_validation(
                format!("engine.phases[name={}]", phase.name),
                "duplicate phase name",
            ));
        }
        check_known(
            format!("engine.phases[{}].u_channel", phase.name),
            phase.u_channel.as_str(),
        )?;
        check_known(
            format!("engine.phases[{}].i_channel", phase.name),
            phase.i_channel.as_str(),
        )?;
    }
    Ok(())
}

/// 校验快照触发器
fn validate_snapshot(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    let snapshot = &blueprint.snapshot;
    if snapshot.tick_ms == 0 {
        return Err(ContractError::config_validation(
            "snapshot.tick_ms",
            "tick_ms must be > 0",
        ));
    }

    let retention = blueprint.buffer.retention_sec;
    match snapshot.trigger {
        Cadence::Seconds(s) if !positive(s) => Err(ContractError::config_validation(
            "snapshot.trigger",
            format!("trigger interval must be > 0, got {s}"),
        )),
        Cadence::Seconds(s) if s >= retention => Err(ContractError::config_validation(
            "snapshot.trigger",
            format!("trigger interval ({s}s) must be shorter than retention_sec ({retention}s)"),
        )),
        Cadence::Samples(0) => Err(ContractError::config_validation(
            "snapshot.trigger",
            "trigger sample count must be > 0",
        )),
        Cadence::Samples(n) if blueprint.source.kind == SourceKind::Synthetic => {
            let capacity = (retention * blueprint.source.synthetic.sample_rate).ceil() as u64;
            if n >= capacity {
                return Err(ContractError::config_validation(
                    "snapshot.trigger",
                    format!("trigger ({n} samples) must be below buffer capacity ({capacity})"),
                ));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// 校验存储计划
fn validate_storage(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    let outputs = known_output_channels(blueprint);
    let mut seen = HashSet::new();

    for (idx, plan) in blueprint.storage.iter().enumerate() {
        if plan.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("storage[{}].name", idx),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(plan.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("storage[name={}]", plan.name),
                "duplicate sink name",
            ));
        }
        if plan.queue_capacity == 0 {
            return Err(ContractError::config_validation(
                format!("storage[{}].queue_capacity", plan.name),
                "queue_capacity must be > 0",
            ));
        }
        if let Some(cadence) = plan.cadence {
            let valid = match cadence {
                Cadence::Seconds(s) => positive(s),
                Cadence::Samples(n) => n > 0,
            };
            if !valid {
                return Err(ContractError::config_validation(
                    format!("storage[{}].cadence", plan.name),
                    "cadence must be > 0",
                ));
            }
        }

        let required = match plan.sink_type {
            SinkType::Log => None,
            SinkType::Csv => Some("path"),
            SinkType::Network => Some("addr"),
        };
        if let Some(key) = required {
            if !plan.params.contains_key(key) {
                return Err(ContractError::config_validation(
                    format!("storage[{}].params.{key}", plan.name),
                    format!("{:?} sink requires '{key}'", plan.sink_type),
                ));
            }
        }

        if let Some(outputs) = &outputs {
            if let Err(ContractError::UnknownChannel { channel }) =
                outputs.resolve_subset(&plan.channels)
            {
                return Err(ContractError::config_validation(
                    format!("storage[{}].channels", plan.name),
                    format!("unknown output channel '{channel}'"),
                ));
            }
        }
    }
    Ok(())
}

/// 校验事件检测器
fn validate_detectors(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    let inputs = known_input_channels(blueprint);

    for (idx, detector) in blueprint.detectors.iter().enumerate() {
        if !detector.threshold.is_finite() {
            return Err(ContractError::config_validation(
                format!("detectors[{}].threshold", idx),
                "threshold must be finite",
            ));
        }
        if !non_negative(detector.hysteresis) {
            return Err(ContractError::config_validation(
                format!("detectors[{}].hysteresis", idx),
                format!("hysteresis must be >= 0, got {}", detector.hysteresis),
            ));
        }
        if !non_negative(detector.min_duration_sec) {
            return Err(ContractError::config_validation(
                format!("detectors[{}].min_duration_sec", idx),
                format!(
                    "min_duration_sec must be >= 0, got {}",
                    detector.min_duration_sec
                ),
            ));
        }
        if let Some(inputs) = &inputs {
            if !inputs.iter().any(|c| c == detector.channel.as_str()) {
                return Err(ContractError::config_validation(
                    format!("detectors[{}].channel", idx),
                    format!("channel '{}' not found in source channels", detector.channel),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        BufferConfig, ConfigVersion, DetectorConfig, DisplayConfig, EngineConfig, EventKind,
        PhaseConfig, SnapshotConfig, SourceConfig, StoragePlanConfig, SyntheticConfig,
    };
    use std::collections::HashMap;

    fn minimal_blueprint() -> PipelineBlueprint {
        PipelineBlueprint {
            version: ConfigVersion::V1,
            source: SourceConfig {
                kind: SourceKind::Synthetic,
                host: "localhost".into(),
                port: 50001,
                poll_interval_ms: 50,
                synthetic: SyntheticConfig::default(),
            },
            buffer: BufferConfig::default(),
            display: DisplayConfig::default(),
            engine: EngineConfig {
                channels: Vec::new(),
                phases: vec![PhaseConfig {
                    name: "L1".into(),
                    u_channel: "u1".into(),
                    i_channel: "i1".into(),
                }],
            },
            snapshot: SnapshotConfig::default(),
            storage: vec![StoragePlanConfig {
                name: "log".into(),
                sink_type: SinkType::Log,
                channels: vec!["u1_rms".into(), "L1_p_avg".into()],
                cadence: None,
                events: true,
                queue_capacity: 100,
                params: HashMap::new(),
            }],
            detectors: vec![DetectorConfig {
                channel: "u1".into(),
                kind: EventKind::LevelLow,
                threshold: 207.0,
                hysteresis: 2.0,
                min_duration_sec: 0.01,
            }],
        }
    }

    fn error_of(bp: &PipelineBlueprint) -> String {
        let result = validate(bp);
        assert!(result.is_err());
        result.unwrap_err().to_string()
    }

    #[test]
    fn test_valid_config() {
        let bp = minimal_blueprint();
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_zero_retention() {
        let mut bp = minimal_blueprint();
        bp.buffer.retention_sec = 0.0;
        let err = error_of(&bp);
        assert!(err.contains("retention_sec must be > 0"), "got: {err}");
    }

    #[test]
    fn test_invalid_span_range() {
        let mut bp = minimal_blueprint();
        bp.display.min_span_sec = 5.0;
        bp.display.max_span_sec = 1.0;
        let err = error_of(&bp);
        assert!(err.contains("min_span_sec"), "got: {err}");
    }

    #[test]
    fn test_default_span_outside_bounds() {
        let mut bp = minimal_blueprint();
        bp.display.default_span_sec = 20.0;
        let err = error_of(&bp);
        assert!(err.contains("default_span_sec"), "got: {err}");
    }

    #[test]
    fn test_trigger_must_fit_retention() {
        let mut bp = minimal_blueprint();
        bp.snapshot.trigger = Cadence::Seconds(10.0);
        let err = error_of(&bp);
        assert!(err.contains("shorter than retention_sec"), "got: {err}");

        bp.snapshot.trigger = Cadence::Samples(10_000);
        let err = error_of(&bp);
        assert!(err.contains("buffer capacity"), "got: {err}");

        bp.snapshot.trigger = Cadence::Seconds(0.0);
        let err = error_of(&bp);
        assert!(err.contains("must be > 0"), "got: {err}");
    }

    #[test]
    fn test_duplicate_sink_name() {
        let mut bp = minimal_blueprint();
        bp.storage.push(bp.storage[0].clone());
        let err = error_of(&bp);
        assert!(err.contains("duplicate sink name"), "got: {err}");
    }

    #[test]
    fn test_empty_sink_name() {
        let mut bp = minimal_blueprint();
        bp.storage[0].name = String::new();
        let err = error_of(&bp);
        assert!(err.contains("cannot be empty"), "got: {err}");
    }

    #[test]
    fn test_unknown_output_channel() {
        let mut bp = minimal_blueprint();
        bp.storage[0].channels.push("u3_rms".into());
        let err = error_of(&bp);
        assert!(err.contains("unknown output channel 'u3_rms'"), "got: {err}");
    }

    #[test]
    fn test_output_channels_unknown_for_tcp_source() {
        let mut bp = minimal_blueprint();
        bp.source.kind = SourceKind::Tcp;
        bp.detectors[0].channel = "anything".into();
        bp.storage[0].channels = vec!["anything_rms".into()];
        // checked at startup once the stream layout is known
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_zero_cadence() {
        let mut bp = minimal_blueprint();
        bp.storage[0].cadence = Some(Cadence::Samples(0));
        let err = error_of(&bp);
        assert!(err.contains("cadence must be > 0"), "got: {err}");
    }

    #[test]
    fn test_csv_sink_requires_path() {
        let mut bp = minimal_blueprint();
        bp.storage[0].sink_type = SinkType::Csv;
        let err = error_of(&bp);
        assert!(err.contains("requires 'path'"), "got: {err}");
    }

    #[test]
    fn test_negative_hysteresis() {
        let mut bp = minimal_blueprint();
        bp.detectors[0].hysteresis = -1.0;
        let err = error_of(&bp);
        assert!(err.contains("hysteresis must be >= 0"), "got: {err}");
    }

    #[test]
    fn test_unknown_detector_channel() {
        let mut bp = minimal_blueprint();
        bp.detectors[0].channel = "u7".into();
        let err = error_of(&bp);
        assert!(err.contains("not found in source channels"), "got: {err}");
    }

    #[test]
    fn test_duplicate_phase_name() {
        let mut bp = minimal_blueprint();
        bp.engine.phases.push(bp.engine.phases[0].clone());
        let err = error_of(&bp);
        assert!(err.contains("duplicate phase name"), "got: {err}");
    }

    #[test]
    fn test_phase_channel_must_exist() {
        let mut bp = minimal_blueprint();
        bp.engine.phases[0].i_channel = "i9".into();
        let err = error_of(&bp);
        assert!(err.contains("'i9' not found"), "got: {err}");
    }
}
