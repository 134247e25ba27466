//! WeightSample - Weighing output
//!
//! Accepted scale readings and the weighing mode that produced them.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// One accepted scale reading
///
/// Immutable once created; the sample cache only ever appends these.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightSample {
    /// Weight in grams
    pub weight_grams: f64,

    /// Arrival time of the bytes that carried this reading
    pub timestamp: Instant,
}

impl WeightSample {
    pub fn new(weight_grams: f64, timestamp: Instant) -> Self {
        Self {
            weight_grams,
            timestamp,
        }
    }

    /// A zero (or negative) reading usually means nothing was on the platform yet
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.weight_grams <= 0.0
    }
}

/// Wire protocol and filtering mode of the scale
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeighingMode {
    /// ASCII `=`-delimited telemetry, settled readings gated by a stability window
    #[default]
    Static,
    /// Binary 8-byte frames, in-motion compensated by the scale itself
    Dynamic,
}

impl WeighingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Dynamic => "dynamic",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_sample() {
        let now = Instant::now();
        assert!(WeightSample::new(0.0, now).is_zero());
        assert!(WeightSample::new(-3.0, now).is_zero());
        assert!(!WeightSample::new(0.5, now).is_zero());
    }

    #[test]
    fn test_weighing_mode_serde() {
        let mode: WeighingMode = serde_json::from_str("\"dynamic\"").unwrap();
        assert_eq!(mode, WeighingMode::Dynamic);
        assert_eq!(WeighingMode::default(), WeighingMode::Static);
    }
}
