//! Configuration parsing
//!
//! TOML is the primary format, JSON is accepted as well.

use contracts::{ContractError, SorterBlueprint};

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML (recommended)
    Toml,
    /// JSON
    Json,
}

impl ConfigFormat {
    /// Infer the format from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Parse a TOML blueprint
pub fn parse_toml(content: &str) -> Result<SorterBlueprint, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Parse a JSON blueprint
pub fn parse_json(content: &str) -> Result<SorterBlueprint, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Parse according to `format`
pub fn parse(content: &str, format: ConfigFormat) -> Result<SorterBlueprint, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{TransportConfig, WeighingMode};

    #[test]
    fn test_parse_toml_minimal() {
        let content = r#"
[scale]
mode = "static"

[actuation]

[[chutes]]
chute = 2
commands = [{ address = 4 }]
"#;
        let bp = parse_toml(content).unwrap();
        assert_eq!(bp.scale.mode, WeighingMode::Static);
        assert_eq!(bp.chutes.len(), 1);
        assert_eq!(bp.chutes[0].run_time_ms, 500);
        assert_eq!(bp.actuation.max_concurrency, 5);
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "scale": {
                "mode": "dynamic",
                "transport": { "kind": "tcp", "addr": "10.0.0.5:4001" }
            },
            "actuation": { "max_concurrency": 2 },
            "chutes": [{ "chute": 1, "commands": [{ "address": 1, "reverse": true }] }]
        }"#;
        let bp = parse_json(content).unwrap();
        assert_eq!(bp.scale.mode, WeighingMode::Dynamic);
        assert!(matches!(bp.scale.transport, TransportConfig::Tcp { .. }));
        assert!(bp.chutes[0].commands[0].reverse);
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let result = parse_toml("invalid toml [[[");
        assert!(matches!(result, Err(ContractError::ConfigParse { .. })));
    }

    #[test]
    fn test_unknown_weighing_mode() {
        let content = r#"
[scale]
mode = "hybrid"

[actuation]
"#;
        assert!(parse_toml(content).is_err());
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_extension("toml"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("TOML"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("json"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
