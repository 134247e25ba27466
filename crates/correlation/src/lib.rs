//! # Correlation
//!
//! Turns the scanner's bursty event stream into one record per parcel.
//!
//! - Burst merge: events within the merge window of a burst's first event
//!   collapse into one record, first valid value per field
//! - Duplicate suppression: a barcode re-read within the repeat window is
//!   dropped up to `max_repeats` times
//!
//! `CorrelationBuffer` is a single-owner structure driven with explicit
//! timestamps; `spawn_correlator` runs it on a task between two channels.
//!
//! ```
//! use std::time::{Duration, Instant};
//! use contracts::{CorrelationConfig, ParcelEvent};
//! use correlation::CorrelationBuffer;
//!
//! let mut buffer = CorrelationBuffer::new(&CorrelationConfig::default());
//! let t0 = Instant::now();
//! assert!(buffer.ingest_parcel_event(ParcelEvent::new("SF1", t0, 1), t0).is_none());
//! let merged = buffer.poll_expired(t0 + Duration::from_millis(200)).unwrap();
//! assert_eq!(merged.barcode, "SF1");
//! ```

mod buffer;
mod dedup;
mod driver;
mod merge;
mod stats;

pub use buffer::CorrelationBuffer;
pub use dedup::DuplicateFilter;
pub use driver::spawn_correlator;
pub use merge::{merge_burst, next_sequence};
pub use stats::CorrelationStats;
