//! `info` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::{SorterBlueprint, TransportConfig};

use crate::cli::InfoArgs;
use crate::error::CliError;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    scale: ScaleInfo,
    actuation: ActuationInfo,
    chutes: Vec<ChuteInfo>,
    routing: RoutingInfo,
}

#[derive(Serialize)]
struct ScaleInfo {
    mode: String,
    link: String,
    stable_check_count: usize,
    window_ms: (i64, i64),
    cache_capacity: usize,
}

#[derive(Serialize)]
struct ActuationInfo {
    link: String,
    max_concurrency: usize,
    inter_command_delay_ms: u64,
}

#[derive(Serialize)]
struct ChuteInfo {
    chute: i32,
    run_time_ms: u16,
    car_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cars: Vec<CarInfo>,
}

#[derive(Serialize)]
struct CarInfo {
    address: u8,
    reverse: bool,
    delay_ms: u16,
    speed_rpm: u16,
    start_delay_ms: u16,
}

#[derive(Serialize)]
struct RoutingInfo {
    default_chute: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    noread_chute: Option<i32>,
    noread_token: String,
    prefixes: Vec<(String, i32)>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let info = build_config_info(&blueprint, args.chutes);
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn link_label(config: &TransportConfig) -> String {
    match config {
        TransportConfig::Serial { port, baud_rate } => format!("serial://{port}@{baud_rate}"),
        TransportConfig::Tcp { addr, .. } => format!("tcp://{addr}"),
        TransportConfig::Simulated => "simulated".to_string(),
    }
}

fn build_config_info(blueprint: &SorterBlueprint, with_cars: bool) -> ConfigInfo {
    let plan = blueprint.to_actuation_plan();

    let mut chutes: Vec<ChuteInfo> = plan
        .chutes
        .values()
        .map(|chute| ChuteInfo {
            chute: chute.chute,
            run_time_ms: chute.run_time_ms,
            car_count: chute.cars.len(),
            cars: if with_cars {
                chute
                    .cars
                    .iter()
                    .map(|car| CarInfo {
                        address: car.address,
                        reverse: car.reverse,
                        delay_ms: car.delay_ms,
                        speed_rpm: car.speed_rpm,
                        start_delay_ms: car.start_delay_ms,
                    })
                    .collect()
            } else {
                Vec::new()
            },
        })
        .collect();
    chutes.sort_by_key(|c| c.chute);

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        scale: ScaleInfo {
            mode: blueprint.scale.mode.as_str().to_string(),
            link: link_label(&blueprint.scale.transport),
            stable_check_count: blueprint.scale.stable_check_count,
            window_ms: (blueprint.scale.window_lower_ms, blueprint.scale.window_upper_ms),
            cache_capacity: blueprint.scale.cache_capacity,
        },
        actuation: ActuationInfo {
            link: link_label(&blueprint.actuation.transport),
            max_concurrency: plan.max_concurrency,
            inter_command_delay_ms: plan.inter_command_delay_ms,
        },
        chutes,
        routing: RoutingInfo {
            default_chute: blueprint.routing.default_chute,
            noread_chute: blueprint.routing.noread_chute,
            noread_token: blueprint.correlation.noread_token.clone(),
            prefixes: blueprint
                .routing
                .prefixes
                .iter()
                .map(|r| (r.prefix.clone(), r.chute))
                .collect(),
        },
    }
}

fn branch(is_last: bool) -> &'static str {
    if is_last {
        "└─"
    } else {
        "├─"
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Parcel Sorter Configuration                    ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("⚖️  Scale");
    println!("   ├─ Version: {}", info.version);
    println!("   ├─ Mode: {}", info.scale.mode);
    println!("   ├─ Link: {}", info.scale.link);
    println!("   ├─ Stability window: {} readings", info.scale.stable_check_count);
    println!("   ├─ Cache: {} samples", info.scale.cache_capacity);
    println!(
        "   └─ Match window: [{:+} ms, {:+} ms]",
        info.scale.window_ms.0, info.scale.window_ms.1
    );

    println!("\n🔌 Actuation");
    println!("   ├─ Link: {}", info.actuation.link);
    println!("   ├─ Max concurrency: {}", info.actuation.max_concurrency);
    println!(
        "   └─ Inter-command gap: {} ms",
        info.actuation.inter_command_delay_ms
    );

    println!("\n📦 Chutes ({})", info.chutes.len());
    for (i, chute) in info.chutes.iter().enumerate() {
        let is_last = i + 1 == info.chutes.len();
        let child_prefix = if is_last { "   " } else { "│  " };
        println!(
            "   {} chute {} ({} cars, run {} ms)",
            branch(is_last),
            chute.chute,
            chute.car_count,
            chute.run_time_ms
        );
        for (j, car) in chute.cars.iter().enumerate() {
            println!(
                "   {}  {} car {:>2} {} {} rpm, delay {} ms, start {} ms",
                child_prefix,
                branch(j + 1 == chute.cars.len()),
                car.address,
                if car.reverse { "◀" } else { "▶" },
                car.speed_rpm,
                car.delay_ms,
                car.start_delay_ms
            );
        }
    }

    println!("\n🧭 Routing");
    println!("   ├─ Default chute: {}", info.routing.default_chute);
    match info.routing.noread_chute {
        Some(chute) => println!(
            "   ├─ No-read chute: {} (token '{}')",
            chute, info.routing.noread_token
        ),
        None => println!("   ├─ No-read chute: default"),
    }
    if info.routing.prefixes.is_empty() {
        println!("   └─ Prefixes: none");
    } else {
        println!("   └─ Prefixes:");
        for (i, (prefix, chute)) in info.routing.prefixes.iter().enumerate() {
            println!(
                "      {} {} -> {}",
                branch(i + 1 == info.routing.prefixes.len()),
                prefix,
                chute
            );
        }
    }

    println!();
}
