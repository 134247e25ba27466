//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{error, info, warn};

use contracts::{SorterBlueprint, TransportConfig};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{EventSource, Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    info!(
        mode = blueprint.scale.mode.as_str(),
        chutes = blueprint.chutes.len(),
        car_commands = blueprint.car_command_count(),
        max_concurrency = blueprint.actuation.max_concurrency,
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let source = if args.simulate {
        EventSource::Simulated {
            interval: Duration::from_millis(args.scan_interval_ms),
            noread_ratio: args.noread_ratio,
            seed: args.seed,
        }
    } else {
        EventSource::JsonLines(args.events.clone())
    };

    let pipeline_config = PipelineConfig {
        blueprint,
        source,
        max_parcels: (args.max_parcels > 0).then_some(args.max_parcels),
        timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
        buffer_size: args.buffer_size.max(1),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    };

    let pipeline = Pipeline::new(pipeline_config);
    let shutdown_signal = shutdown_signal();

    info!("Starting pipeline...");

    tokio::select! {
        result = pipeline.run() => {
            let stats = result.context("Pipeline execution failed")?;
            info!(
                parcels = stats.parcels,
                dispatched = stats.dispatched,
                duration_secs = stats.duration.as_secs_f64(),
                throughput = format!("{:.2}", stats.throughput()),
                "Pipeline completed successfully"
            );
            stats.print_summary();
        }
        _ = shutdown_signal => {
            warn!("Received shutdown signal, stopping pipeline...");
        }
    }

    info!("Parcel sorter finished");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn describe_link(config: &TransportConfig) -> String {
    match config {
        TransportConfig::Serial { port, baud_rate } => format!("serial {port} @ {baud_rate} baud"),
        TransportConfig::Tcp { addr, .. } => format!("tcp {addr}"),
        TransportConfig::Simulated => "simulated".to_string(),
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &SorterBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Scale:");
    println!("  Mode: {}", blueprint.scale.mode.as_str());
    println!("  Link: {}", describe_link(&blueprint.scale.transport));
    println!(
        "  Window: [{:+} ms, {:+} ms]",
        blueprint.scale.window_lower_ms, blueprint.scale.window_upper_ms
    );
    println!("\nActuation:");
    println!("  Link: {}", describe_link(&blueprint.actuation.transport));
    println!("  Max concurrency: {}", blueprint.actuation.max_concurrency);

    println!("\nChutes ({}):", blueprint.chutes.len());
    for chute in &blueprint.chutes {
        println!(
            "  - {} ({} cars, run {} ms)",
            chute.chute,
            chute.commands.len(),
            chute.run_time_ms
        );
    }

    println!("\nRouting:");
    println!("  Default chute: {}", blueprint.routing.default_chute);
    if let Some(noread) = blueprint.routing.noread_chute {
        println!("  No-read chute: {}", noread);
    }
    for route in &blueprint.routing.prefixes {
        println!("  {} -> {}", route.prefix, route.chute);
    }

    println!();
}
