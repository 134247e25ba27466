//! Configuration validation
//!
//! Rules:
//! - scale: stable_check_count >= 1, cache capacity >= 1, window lower < upper
//! - actuation: max_concurrency >= 1
//! - chute numbers positive and unique
//! - car addresses within the parameter frame range, profiles unique
//! - every command resolves to speed / delay values the codec accepts
//! - transport addresses non-empty

use std::collections::{HashMap, HashSet};

use contracts::{CarProfile, ContractError, SorterBlueprint, TransportConfig};
use frame_codec::{MAX_DELAY_MS, MAX_PARAMETER_ADDRESS, MAX_RUN_TIME_MS, MAX_SPEED_RPM, MIN_SPEED_RPM};

/// Validate a SorterBlueprint
///
/// Returns the first error encountered.
pub fn validate(blueprint: &SorterBlueprint) -> Result<(), ContractError> {
    validate_scale(blueprint)?;
    validate_correlation(blueprint)?;
    validate_actuation(blueprint)?;
    validate_car_defaults(blueprint)?;
    validate_cars(blueprint)?;
    validate_chutes(blueprint)?;
    validate_routing(blueprint)?;
    Ok(())
}

fn validate_scale(blueprint: &SorterBlueprint) -> Result<(), ContractError> {
    let scale = &blueprint.scale;

    if scale.stable_check_count < 1 {
        return Err(ContractError::config_validation(
            "scale.stable_check_count",
            "stable_check_count must be >= 1",
        ));
    }
    if scale.cache_capacity < 1 {
        return Err(ContractError::config_validation(
            "scale.cache_capacity",
            "cache_capacity must be >= 1",
        ));
    }
    if scale.cache_max_age_ms == 0 {
        return Err(ContractError::config_validation(
            "scale.cache_max_age_ms",
            "cache_max_age_ms must be > 0",
        ));
    }
    if scale.window_lower_ms >= scale.window_upper_ms {
        return Err(ContractError::config_validation(
            "scale.window_lower_ms / scale.window_upper_ms",
            format!(
                "window_lower_ms ({}) must be < window_upper_ms ({})",
                scale.window_lower_ms, scale.window_upper_ms
            ),
        ));
    }

    validate_transport("scale.transport", &scale.transport)
}

fn validate_correlation(blueprint: &SorterBlueprint) -> Result<(), ContractError> {
    if blueprint.correlation.noread_token.trim().is_empty() {
        return Err(ContractError::config_validation(
            "correlation.noread_token",
            "noread_token cannot be empty",
        ));
    }
    Ok(())
}

fn validate_actuation(blueprint: &SorterBlueprint) -> Result<(), ContractError> {
    if blueprint.actuation.max_concurrency < 1 {
        return Err(ContractError::config_validation(
            "actuation.max_concurrency",
            "max_concurrency must be >= 1",
        ));
    }
    validate_transport("actuation.transport", &blueprint.actuation.transport)
}

fn validate_transport(field: &str, transport: &TransportConfig) -> Result<(), ContractError> {
    match transport {
        TransportConfig::Tcp { addr, .. } if addr.trim().is_empty() => Err(
            ContractError::config_validation(format!("{field}.addr"), "address cannot be empty"),
        ),
        TransportConfig::Serial { port, .. } if port.trim().is_empty() => Err(
            ContractError::config_validation(format!("{field}.port"), "port cannot be empty"),
        ),
        TransportConfig::Serial { baud_rate: 0, .. } => Err(ContractError::config_validation(
            format!("{field}.baud_rate"),
            "baud_rate must be positive",
        )),
        _ => Ok(()),
    }
}

fn validate_car_defaults(blueprint: &SorterBlueprint) -> Result<(), ContractError> {
    let defaults = &blueprint.car_defaults;
    check_speed("car_defaults.speed_rpm", defaults.speed_rpm)?;
    check_delay("car_defaults.start_delay_ms", defaults.start_delay_ms)
}

/// Car profiles: address range, uniqueness, tuning ranges
fn validate_cars(blueprint: &SorterBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for car in &blueprint.cars {
        check_address(&format!("cars[address={}]", car.address), car.address)?;
        if !seen.insert(car.address) {
            return Err(ContractError::config_validation(
                format!("cars[address={}]", car.address),
                "duplicate car address",
            ));
        }
        if let Some(speed) = car.speed_rpm {
            check_speed(&format!("cars[{}].speed_rpm", car.address), speed)?;
        }
        if let Some(delay) = car.start_delay_ms {
            check_delay(&format!("cars[{}].start_delay_ms", car.address), delay)?;
        }
    }
    Ok(())
}

fn validate_chutes(blueprint: &SorterBlueprint) -> Result<(), ContractError> {
    let profiles: HashMap<u8, &CarProfile> =
        blueprint.cars.iter().map(|c| (c.address, c)).collect();
    let mut seen = HashSet::new();

    for chute in &blueprint.chutes {
        if chute.chute <= 0 {
            return Err(ContractError::config_validation(
                format!("chutes[chute={}]", chute.chute),
                "chute number must be > 0",
            ));
        }
        if !seen.insert(chute.chute) {
            return Err(ContractError::config_validation(
                format!("chutes[chute={}]", chute.chute),
                "duplicate chute number",
            ));
        }
        if chute.run_time_ms > MAX_RUN_TIME_MS {
            return Err(ContractError::config_validation(
                format!("chutes[{}].run_time_ms", chute.chute),
                format!(
                    "run_time_ms must be <= {MAX_RUN_TIME_MS}, got {}",
                    chute.run_time_ms
                ),
            ));
        }

        for (idx, command) in chute.commands.iter().enumerate() {
            let field = format!("chutes[{}].commands[{idx}]", chute.chute);
            check_address(&format!("{field}.address"), command.address)?;

            // each command must resolve through its profile or the defaults
            let profile = profiles.get(&command.address);
            let speed = profile
                .and_then(|p| p.speed_rpm)
                .unwrap_or(blueprint.car_defaults.speed_rpm);
            let delay = profile
                .and_then(|p| p.start_delay_ms)
                .unwrap_or(blueprint.car_defaults.start_delay_ms);
            check_speed(&format!("{field}.speed_rpm"), speed)?;
            check_delay(&format!("{field}.start_delay_ms"), delay)?;
        }
    }
    Ok(())
}

fn validate_routing(blueprint: &SorterBlueprint) -> Result<(), ContractError> {
    let routing = &blueprint.routing;

    if routing.default_chute <= 0 {
        return Err(ContractError::config_validation(
            "routing.default_chute",
            format!("default_chute must be > 0, got {}", routing.default_chute),
        ));
    }
    if let Some(chute) = routing.noread_chute.filter(|c| *c <= 0) {
        return Err(ContractError::config_validation(
            "routing.noread_chute",
            format!("noread_chute must be > 0, got {chute}"),
        ));
    }
    for (idx, route) in routing.prefixes.iter().enumerate() {
        if route.prefix.is_empty() {
            return Err(ContractError::config_validation(
                format!("routing.prefixes[{idx}].prefix"),
                "prefix cannot be empty",
            ));
        }
        if route.chute <= 0 {
            return Err(ContractError::config_validation(
                format!("routing.prefixes[{idx}].chute"),
                format!("chute must be > 0, got {}", route.chute),
            ));
        }
    }
    Ok(())
}

fn check_address(field: &str, address: u8) -> Result<(), ContractError> {
    if address == 0 || address > MAX_PARAMETER_ADDRESS {
        return Err(ContractError::config_validation(
            field,
            format!("car address must be in 1..={MAX_PARAMETER_ADDRESS}, got {address}"),
        ));
    }
    Ok(())
}

fn check_speed(field: &str, speed_rpm: u16) -> Result<(), ContractError> {
    if !(MIN_SPEED_RPM..=MAX_SPEED_RPM).contains(&speed_rpm) {
        return Err(ContractError::config_validation(
            field,
            format!("speed must be in {MIN_SPEED_RPM}..={MAX_SPEED_RPM} rpm, got {speed_rpm}"),
        ));
    }
    Ok(())
}

fn check_delay(field: &str, delay_ms: u16) -> Result<(), ContractError> {
    if delay_ms > MAX_DELAY_MS {
        return Err(ContractError::config_validation(
            field,
            format!("delay must be <= {MAX_DELAY_MS} ms, got {delay_ms}"),
        ));
    }
    Ok(())
}
