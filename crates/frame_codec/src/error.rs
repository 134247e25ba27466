//! Codec error types

use thiserror::Error;

/// Command validation / encoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Car address outside the addressable range of the frame
    #[error("address {address} out of range 1..={max}")]
    AddressOutOfRange { address: u8, max: u8 },

    /// Belt speed outside the supported range
    #[error("speed {speed_rpm} rpm out of range {min}..={max}")]
    SpeedOutOfRange { speed_rpm: u16, min: u16, max: u16 },

    /// On-board start delay too long
    #[error("delay {delay_ms} ms out of range 0..={max}")]
    DelayOutOfRange { delay_ms: u16, max: u16 },

    /// Belt run time too long
    #[error("run time {run_time_ms} ms out of range 0..={max}")]
    RunTimeOutOfRange { run_time_ms: u16, max: u16 },
}

/// Codec Result type alias
pub type Result<T> = std::result::Result<T, CodecError>;
