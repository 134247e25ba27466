//! Run-frame sequence numbers

use std::sync::atomic::{AtomicU8, Ordering};

/// Sequence counter for run sub-frames, monotonic modulo 128
///
/// 256 is a multiple of 128, so masking the wrapping `u8` keeps the
/// sequence gap-free across the wrap and bit 7 always clear.
#[derive(Debug, Default)]
pub struct SequenceCounter(AtomicU8);

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from `value` (masked to 7 bits)
    pub fn starting_at(value: u8) -> Self {
        Self(AtomicU8::new(value & 0x7F))
    }

    /// Number the next frame will carry
    pub fn peek(&self) -> u8 {
        self.0.load(Ordering::SeqCst) & 0x7F
    }

    /// Consume the current number
    pub fn advance(&self) -> u8 {
        self.0.fetch_add(1, Ordering::SeqCst) & 0x7F
    }
}
