//! Pipeline configuration loading.
//!
//! A configuration file is parsed (TOML or JSON, picked by extension) into
//! a [`PipelineBlueprint`] and then checked as a whole: source, retention,
//! trigger, storage plans and detectors. Nothing downstream re-validates
//! the blueprint, so every `load_*` entry point goes through [`validator`].
//!
//! ```no_run
//! use config_loader::{ConfigLoader, SourceOverride};
//! use std::path::Path;
//!
//! let overrides = SourceOverride { host: Some("daq-01".into()), port: None };
//! let blueprint =
//!     ConfigLoader::load_with_overrides(Path::new("pipeline.toml"), &overrides).unwrap();
//! println!("Source: {}:{}", blueprint.source.host, blueprint.source.port);
//! ```

mod parser;
mod validator;

pub use contracts::PipelineBlueprint;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;
use tracing::debug;

/// Command-line or environment overrides for the acquisition endpoint
#[derive(Debug, Clone, Default)]
pub struct SourceOverride {
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl SourceOverride {
    pub fn is_empty(&self) -> bool {
        self.host.is_none() && self.port.is_none()
    }

    fn apply(&self, blueprint: &mut PipelineBlueprint) {
        if let Some(host) = &self.host {
            debug!(host = %host, "Overriding source host");
            blueprint.source.host = host.clone();
        }
        if let Some(port) = self.port {
            debug!(port, "Overriding source port");
            blueprint.source.port = port;
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate a pipeline file; the format follows the extension.
    pub fn load_from_path(path: &Path) -> Result<PipelineBlueprint, ContractError> {
        Self::load_with_overrides(path, &SourceOverride::default())
    }

    /// Load a pipeline file, patch the source endpoint, then validate the
    /// patched blueprint.
    pub fn load_with_overrides(
        path: &Path,
        overrides: &SourceOverride,
    ) -> Result<PipelineBlueprint, ContractError> {
        let format = detect_format(path)?;
        let content = std::fs::read_to_string(path)?;
        let mut blueprint = parser::parse(&content, format)?;
        overrides.apply(&mut blueprint);
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }

    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<PipelineBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }

    /// Re-run validation on a blueprint built or edited in code.
    pub fn validate(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
        validator::validate(blueprint)
    }

    pub fn to_toml(blueprint: &PipelineBlueprint) -> Result<String, ContractError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    pub fn to_json(blueprint: &PipelineBlueprint) -> Result<String, ContractError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ContractError::config_parse("cannot determine file format from extension"))?;

    ConfigFormat::from_extension(ext)
        .ok_or_else(|| ContractError::config_parse(format!("unsupported config format: .{ext}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Cadence, SourceKind};

    const MINIMAL_TOML: &str = r#"
[source]
kind = "synthetic"
poll_interval_ms = 20

[source.synthetic]
sample_rate = 1000.0
channels = ["u1", "i1"]
frame_rows = 100

[buffer]
retention_sec = 10.0

[engine]
phases = [{ name = "L1", u_channel = "u1", i_channel = "i1" }]

[snapshot]
trigger = { seconds = 1.0 }

[[storage]]
name = "log_sink"
sink_type = "log"
channels = ["u1_rms", "L1_p_avg"]

[[storage]]
name = "slow_csv"
sink_type = "csv"
cadence = { seconds = 5.0 }
events = false
params = { path = "out/slow.csv" }

[[detectors]]
channel = "u1"
kind = "level_low"
threshold = 207.0
hysteresis = 2.0
"#;

    #[test]
    fn test_load_from_str_toml() {
        let result = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.source.kind, SourceKind::Synthetic);
        assert_eq!(bp.storage.len(), 2);
        assert_eq!(bp.storage[1].cadence, Some(Cadence::Seconds(5.0)));
        assert!(!bp.storage[1].events);
    }

    #[test]
    fn test_round_trip_toml() {
        let bp = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(bp.storage.len(), bp2.storage.len());
        assert_eq!(bp.storage[0].channels, bp2.storage[0].channels);
        assert_eq!(bp.detectors[0].threshold, bp2.detectors[0].threshold);
    }

    #[test]
    fn test_round_trip_json() {
        let bp = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(bp.engine.phases[0].name, bp2.engine.phases[0].name);
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = MINIMAL_TOML.replace(r#"channels = ["u1_rms", "L1_p_avg"]"#, r#"channels = ["u1_thd"]"#);
        let result = ConfigLoader::load_from_str(&content, ConfigFormat::Toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("u1_thd"));
    }

    #[test]
    fn test_overrides_are_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        let content = MINIMAL_TOML.replace(r#"kind = "synthetic""#, r#"kind = "tcp""#);
        std::fs::write(&path, content).unwrap();

        let overrides = SourceOverride {
            host: Some("daq-01".into()),
            port: Some(6000),
        };
        let bp = ConfigLoader::load_with_overrides(&path, &overrides).unwrap();
        assert_eq!(bp.source.host, "daq-01");
        assert_eq!(bp.source.port, 6000);

        let bad = SourceOverride {
            host: Some(String::new()),
            port: None,
        };
        assert!(!bad.is_empty());
        assert!(ConfigLoader::load_with_overrides(&path, &bad).is_err());
    }

    #[test]
    fn test_load_from_path_detects_format() {
        let err = ConfigLoader::load_from_path(std::path::Path::new("pipeline.yaml")).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }
}
