//! `validate` command implementation.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::SorterBlueprint;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    scale_mode: String,
    chute_count: usize,
    car_command_count: usize,
    prefix_routes: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    scale_mode: blueprint.scale.mode.as_str().to_string(),
                    chute_count: blueprint.chutes.len(),
                    car_command_count: blueprint.car_command_count(),
                    prefix_routes: blueprint.routing.prefixes.len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &SorterBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.chutes.is_empty() {
        warnings.push("No chutes configured - every parcel will be skipped".to_string());
    }

    let configured: BTreeSet<i32> = blueprint.chutes.iter().map(|c| c.chute).collect();
    let mut targets = vec![("routing.default_chute".to_string(), blueprint.routing.default_chute)];
    if let Some(noread) = blueprint.routing.noread_chute {
        targets.push(("routing.noread_chute".to_string(), noread));
    }
    for route in &blueprint.routing.prefixes {
        targets.push((format!("routing prefix '{}'", route.prefix), route.chute));
    }
    for (origin, chute) in targets {
        if !configured.contains(&chute) {
            warnings.push(format!(
                "{origin} targets chute {chute}, which has no car sequence"
            ));
        }
    }

    for chute in &blueprint.chutes {
        if chute.commands.is_empty() {
            warnings.push(format!("Chute {} has no car commands", chute.chute));
        }
    }

    let commanded: BTreeSet<u8> = blueprint
        .chutes
        .iter()
        .flat_map(|c| c.commands.iter().map(|cmd| cmd.address))
        .collect();
    for car in &blueprint.cars {
        if !commanded.contains(&car.address) {
            warnings.push(format!(
                "Car {} has a profile but no chute commands it",
                car.address
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Scale mode: {}", summary.scale_mode);
            println!("  Chutes: {}", summary.chute_count);
            println!("  Car commands: {}", summary.car_command_count);
            println!("  Prefix routes: {}", summary.prefix_routes);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
