//! # Weighing
//!
//! Weight acquisition over the scale's serial link.
//!
//! Responsibilities:
//! - Accumulate and parse raw scale telemetry (dynamic frames or static text)
//! - Filter static readings for stability before publishing
//! - Keep a bounded, age-limited cache of published samples
//! - Answer "what did the scale read around time T" with a bounded wait
//! - Own the link state machine and its reconnect policy
//!
//! ## Usage
//!
//! ```ignore
//! use weighing::{WeighingSettings, WeightAcquisitionService};
//!
//! let service = WeightAcquisitionService::new(transport, WeighingSettings::from(&blueprint.scale));
//! service.connect();
//!
//! // on a blocking thread
//! let grams = service.find_nearest_weight(parcel.created_at);
//! ```

mod cache;
mod error;
mod metrics;
mod service;
mod stability;

pub use cache::{Nearest, SampleCache};
pub use contracts::{ConnectionState, WeighingMode, WeightSample};
pub use error::{Result, WeighingError};
pub use metrics::{WeighingMetrics, WeighingMetricsSnapshot};
pub use service::{WeighingSettings, WeightAcquisitionService, ACCUMULATOR_CAPACITY};
pub use stability::{StabilityWindow, STABILITY_TOLERANCE_GRAMS};
