//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON line configuration files
//! - Validate configuration legality
//! - Generate `SorterBlueprint`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("configs/line.toml")).unwrap();
//! println!("chutes: {}", blueprint.chutes.len());
//! ```

mod parser;
mod validator;

pub use contracts::SorterBlueprint;
pub use parser::ConfigFormat;
pub use validator::validate;

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<SorterBlueprint, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<SorterBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }

    /// Serialize SorterBlueprint to TOML string
    pub fn to_toml(blueprint: &SorterBlueprint) -> Result<String, ContractError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize SorterBlueprint to JSON string
    pub fn to_json(blueprint: &SorterBlueprint) -> Result<String, ContractError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{TransportConfig, WeighingMode};
    use std::io::Write;

    const LINE_TOML: &str = r#"
[scale]
mode = "static"
stable_check_count = 4
[scale.transport]
kind = "tcp"
addr = "192.168.1.20:4001"

[correlation]
merge_window_ms = 150

[actuation]
max_concurrency = 3

[car_defaults]
speed_rpm = 720

[[cars]]
address = 2
speed_rpm = 900

[[chutes]]
chute = 1
run_time_ms = 600
commands = [{ address = 1 }, { address = 2, reverse = true, delay_ms = 80 }]

[[chutes]]
chute = 2
commands = [{ address = 3 }]

[routing]
default_chute = 1
noread_chute = 2
prefixes = [{ prefix = "SF", chute = 2 }]
"#;

    #[test]
    fn test_load_from_str_toml() {
        let bp = ConfigLoader::load_from_str(LINE_TOML, ConfigFormat::Toml).unwrap();
        assert_eq!(bp.scale.mode, WeighingMode::Static);
        assert_eq!(bp.scale.stable_check_count, 4);
        assert_eq!(bp.correlation.merge_window_ms, 150);
        assert_eq!(bp.routing.noread_chute, Some(2));

        let plan = bp.to_actuation_plan();
        let chute = plan.chute(1).unwrap();
        assert_eq!(chute.cars[0].speed_rpm, 720);
        assert_eq!(chute.cars[1].speed_rpm, 900);
    }

    #[test]
    fn test_round_trip_toml() {
        let bp = ConfigLoader::load_from_str(LINE_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(bp.chutes, bp2.chutes);
        assert_eq!(bp.scale.transport, bp2.scale.transport);
        assert_eq!(bp.routing.prefixes, bp2.routing.prefixes);
    }

    #[test]
    fn test_round_trip_json() {
        let bp = ConfigLoader::load_from_str(LINE_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(bp.chutes, bp2.chutes);
        assert_eq!(bp2.actuation.max_concurrency, 3);
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = LINE_TOML.replace("chute = 2\ncommands", "chute = 1\ncommands");
        let err = ConfigLoader::load_from_str(&content, ConfigFormat::Toml).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_load_from_path_detects_format() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(LINE_TOML.as_bytes()).unwrap();

        let bp = ConfigLoader::load_from_path(file.path()).unwrap();
        assert!(matches!(bp.scale.transport, TransportConfig::Tcp { .. }));
        assert_eq!(bp.actuation.transport, TransportConfig::Simulated);
    }

    #[test]
    fn test_load_from_path_rejects_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        let err = ConfigLoader::load_from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[test]
    fn test_load_from_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigLoader::load_from_path(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ContractError::Io(_)));
    }
}
