//! SorterBlueprint - Config Loader output
//!
//! Describes the complete line configuration: scale link, correlation policy,
//! actuator bus, car tuning, chute sequences and routing defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{
    resolve_chutes, ActuationPlan, CarDefaults, CarProfile, ChuteSequence, WeighingMode,
    DEFAULT_NOREAD_TOKEN,
};

/// Gap between two cars commanded on the same bus
pub const INTER_COMMAND_DELAY_MS: u64 = 50;

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete line blueprint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SorterBlueprint {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Scale link and weighing policy
    pub scale: ScaleConfig,

    /// Burst merge / duplicate policy
    #[serde(default)]
    pub correlation: CorrelationConfig,

    /// Actuator bus
    pub actuation: ActuationConfig,

    /// Defaults for cars without a profile
    #[serde(default)]
    pub car_defaults: CarDefaults,

    /// Per-car overrides
    #[serde(default)]
    pub cars: Vec<CarProfile>,

    /// Chute → car sequence table
    #[serde(default)]
    pub chutes: Vec<ChuteSequence>,

    /// Fallback routing used by the built-in resolver
    #[serde(default)]
    pub routing: RoutingConfig,
}

/// Serial link endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Serial port opened directly
    Serial {
        port: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
    /// Serial device server reachable over TCP
    Tcp {
        addr: String,
        #[serde(default = "default_connect_timeout_ms")]
        connect_timeout_ms: u64,
    },
    /// In-process simulated device
    Simulated,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Simulated
    }
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

/// Scale configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleConfig {
    /// Wire protocol / filter mode
    #[serde(default)]
    pub mode: WeighingMode,

    /// Readings that must agree before a static weight is published
    #[serde(default = "default_stable_check_count")]
    pub stable_check_count: usize,

    /// Maximum samples kept in the cache
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Maximum sample age kept in the cache (ms)
    #[serde(default = "default_cache_max_age_ms")]
    pub cache_max_age_ms: u64,

    /// Correlation window lower edge relative to the scan time (ms, usually negative)
    #[serde(default = "default_window_lower_ms")]
    pub window_lower_ms: i64,

    /// Correlation window upper edge relative to the scan time (ms)
    #[serde(default = "default_window_upper_ms")]
    pub window_upper_ms: i64,

    /// Link endpoint
    #[serde(default)]
    pub transport: TransportConfig,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            mode: WeighingMode::default(),
            stable_check_count: default_stable_check_count(),
            cache_capacity: default_cache_capacity(),
            cache_max_age_ms: default_cache_max_age_ms(),
            window_lower_ms: default_window_lower_ms(),
            window_upper_ms: default_window_upper_ms(),
            transport: TransportConfig::default(),
        }
    }
}

impl ScaleConfig {
    pub fn cache_max_age(&self) -> Duration {
        Duration::from_millis(self.cache_max_age_ms)
    }
}

fn default_stable_check_count() -> usize {
    5
}

fn default_cache_capacity() -> usize {
    100
}

fn default_cache_max_age_ms() -> u64 {
    120_000
}

fn default_window_lower_ms() -> i64 {
    -200
}

fn default_window_upper_ms() -> i64 {
    500
}

/// Correlation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Events closer than this to the first event of a burst are merged (ms)
    pub merge_window_ms: u64,

    /// A barcode seen again within this window may be a duplicate (ms)
    pub repeat_window_ms: u64,

    /// Repeats suppressed within the window before a read counts as a new parcel
    pub max_repeats: u32,

    /// Barcode the scanner reports for unreadable labels
    pub noread_token: String,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            merge_window_ms: 200,
            repeat_window_ms: 3000,
            max_repeats: 3,
            noread_token: DEFAULT_NOREAD_TOKEN.to_string(),
        }
    }
}

impl CorrelationConfig {
    pub fn merge_window(&self) -> Duration {
        Duration::from_millis(self.merge_window_ms)
    }

    pub fn repeat_window(&self) -> Duration {
        Duration::from_millis(self.repeat_window_ms)
    }
}

/// Actuator bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuationConfig {
    /// Parcels allowed in flight at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Link endpoint
    #[serde(default)]
    pub transport: TransportConfig,
}

impl Default for ActuationConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            transport: TransportConfig::default(),
        }
    }
}

fn default_max_concurrency() -> usize {
    5
}

/// Barcode prefix → chute route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixRoute {
    pub prefix: String,
    pub chute: i32,
}

/// Routing used by the built-in resolver
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Chute for parcels no rule matched
    pub default_chute: i32,

    /// Chute for unreadable parcels (None = use default)
    pub noread_chute: Option<i32>,

    /// Prefix routes, first match wins
    pub prefixes: Vec<PrefixRoute>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_chute: 1,
            noread_chute: None,
            prefixes: Vec::new(),
        }
    }
}

impl SorterBlueprint {
    /// Build the dispatcher plan from the chute table and car profiles
    pub fn to_actuation_plan(&self) -> ActuationPlan {
        ActuationPlan {
            max_concurrency: self.actuation.max_concurrency,
            inter_command_delay_ms: INTER_COMMAND_DELAY_MS,
            chutes: resolve_chutes(&self.chutes, &self.cars, self.car_defaults),
        }
    }

    /// Total number of car commands across all chutes
    pub fn car_command_count(&self) -> usize {
        self.chutes.iter().map(|c| c.commands.len()).sum()
    }
}
