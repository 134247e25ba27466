//! Chute → car sequence contracts
//!
//! Static configuration consumed read-only by the actuation dispatcher.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One car command inside a chute sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarCommand {
    /// Bus address of the car (1..=31)
    pub address: u8,

    /// Run the belt in reverse direction
    #[serde(default)]
    pub reverse: bool,

    /// Host-side wait before this car is commanded (ms)
    #[serde(default)]
    pub delay_ms: u16,
}

/// Ordered car commands for one chute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChuteSequence {
    /// Chute number (positive)
    pub chute: i32,

    /// Belt run time sent to every car of this chute (ms)
    #[serde(default = "default_run_time_ms")]
    pub run_time_ms: u16,

    /// Cars in firing order
    #[serde(default)]
    pub commands: Vec<CarCommand>,
}

fn default_run_time_ms() -> u16 {
    500
}

/// Per-car tuning, overriding `CarDefaults`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarProfile {
    pub address: u8,
    #[serde(default)]
    pub speed_rpm: Option<u16>,
    #[serde(default)]
    pub start_delay_ms: Option<u16>,
}

/// Defaults applied to cars without a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarDefaults {
    /// Belt speed (rpm)
    pub speed_rpm: u16,
    /// On-board start delay carried in the parameter frame (ms)
    pub start_delay_ms: u16,
}

impl Default for CarDefaults {
    fn default() -> Self {
        Self {
            speed_rpm: 600,
            start_delay_ms: 0,
        }
    }
}

/// A car command with its resolved tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedCar {
    pub address: u8,
    pub reverse: bool,
    /// Host-side wait before commanding (ms)
    pub delay_ms: u16,
    pub speed_rpm: u16,
    /// On-board start delay (ms)
    pub start_delay_ms: u16,
}

/// A chute sequence with resolved cars
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChute {
    pub chute: i32,
    pub run_time_ms: u16,
    pub cars: Vec<ResolvedCar>,
}

/// Everything the dispatcher needs, derived once from configuration
#[derive(Debug, Clone)]
pub struct ActuationPlan {
    /// Parcels allowed in flight at once
    pub max_concurrency: usize,

    /// Gap enforced between two cars on the same bus (ms)
    pub inter_command_delay_ms: u64,

    /// Chute number → resolved sequence
    pub chutes: HashMap<i32, ResolvedChute>,
}

impl ActuationPlan {
    /// Look up the sequence for a chute
    pub fn chute(&self, chute: i32) -> Option<&ResolvedChute> {
        self.chutes.get(&chute)
    }
}

impl Default for ActuationPlan {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            inter_command_delay_ms: 50,
            chutes: HashMap::new(),
        }
    }
}

/// Resolve chute sequences against car profiles and defaults
pub fn resolve_chutes(
    chutes: &[ChuteSequence],
    cars: &[CarProfile],
    defaults: CarDefaults,
) -> HashMap<i32, ResolvedChute> {
    let profiles: HashMap<u8, &CarProfile> = cars.iter().map(|c| (c.address, c)).collect();

    chutes
        .iter()
        .map(|seq| {
            let resolved = seq
                .commands
                .iter()
                .map(|cmd| {
                    let profile = profiles.get(&cmd.address);
                    ResolvedCar {
                        address: cmd.address,
                        reverse: cmd.reverse,
                        delay_ms: cmd.delay_ms,
                        speed_rpm: profile
                            .and_then(|p| p.speed_rpm)
                            .unwrap_or(defaults.speed_rpm),
                        start_delay_ms: profile
                            .and_then(|p| p.start_delay_ms)
                            .unwrap_or(defaults.start_delay_ms),
                    }
                })
                .collect();
            (
                seq.chute,
                ResolvedChute {
                    chute: seq.chute,
                    run_time_ms: seq.run_time_ms,
                    cars: resolved,
                },
            )
        })
        .collect()
}
