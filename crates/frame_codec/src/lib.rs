//! # Frame Codec
//!
//! Stateless wire codecs for the sorter's two serial links.
//!
//! - Scale telemetry, dynamic mode: fixed 8-byte binary frames
//! - Scale telemetry, static mode: `=`-delimited ASCII segments
//! - Actuator bus: 16-byte parameter + run command frames
//!
//! No I/O, no shared state. Callers own their receive buffers and drop the
//! `consumed` prefix reported by each parse.
//!
//! ```
//! use frame_codec::{try_parse_dynamic_frame, DynamicParse};
//!
//! let buf = [0x88, 0x02, 1, 2, 3, 4, 5, 0x16];
//! match try_parse_dynamic_frame(&buf) {
//!     DynamicParse::Frame { weight_kg, consumed } => {
//!         assert!((weight_kg - 123.45).abs() < 1e-9);
//!         assert_eq!(consumed, 8);
//!     }
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

mod actuator;
mod dynamic;
mod error;
mod static_text;

pub use actuator::{
    checksum, encode_actuator_frame, encode_parameter_frame, encode_run_frame, ActuatorFrame,
    MAX_DELAY_MS, MAX_PARAMETER_ADDRESS, MAX_RUN_ADDRESS, MAX_RUN_TIME_MS, MAX_SPEED_RPM,
    MIN_SPEED_RPM, PARAMETER_HEADER, RUN_HEADER,
};
pub use dynamic::{
    try_parse_dynamic_frame, DynamicParse, DYNAMIC_FRAME_LEN, DYNAMIC_HEADER, DYNAMIC_MAX_PENDING,
    DYNAMIC_TRAILER,
};
pub use error::{CodecError, Result};
pub use static_text::{
    try_parse_static_segment, StaticParse, STATIC_MAX_PENDING, STATIC_MIN_SEGMENT_LEN,
    STATIC_SENTINEL,
};
