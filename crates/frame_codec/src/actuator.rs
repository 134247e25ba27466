//! Actuator bus command frames
//!
//! One command is two 8-byte sub-frames sent back to back:
//!
//! | byte | parameter frame (0..8)                         | run frame (8..16)              |
//! |------|------------------------------------------------|--------------------------------|
//! | 0    | `0x95`                                         | `0x8A`                         |
//! | 1    | `reverse<<6 \| speed.7<<5 \| address`          | addresses 1–7                  |
//! | 2    | speed bits 0–6                                 | addresses 9–15                 |
//! | 3    | delay bits 0–6                                 | addresses 17–23                |
//! | 4    | run time bits 0–6                              | addresses 25–31                |
//! | 5    | `PI<<3 \| mode<<2 \| delay.7<<1 \| time.7`     | addresses 8, 16, 24, 32        |
//! | 6    | reserved `0`                                   | sequence (7 bits)              |
//! | 7    | XOR(1..=6) & 0x7F                              | XOR(1..=6) & 0x7F              |
//!
//! Speed travels in 6 rpm steps, delay and run time in 10 ms steps. Only the
//! header bytes ever have bit 7 set.

use std::fmt;

use crate::error::{CodecError, Result};

pub const PARAMETER_HEADER: u8 = 0x95;
pub const RUN_HEADER: u8 = 0x8A;

pub const MAX_PARAMETER_ADDRESS: u8 = 31;
pub const MAX_RUN_ADDRESS: u8 = 32;
pub const MIN_SPEED_RPM: u16 = 30;
pub const MAX_SPEED_RPM: u16 = 1530;
pub const MAX_DELAY_MS: u16 = 2550;
pub const MAX_RUN_TIME_MS: u16 = 2550;

const SPEED_STEP_RPM: u16 = 6;
const TIME_STEP_MS: u16 = 10;
const PI_FIELD: u8 = 0b010;
const TIME_MODE: u8 = 1;
const LOW7: u8 = 0x7F;
const SUB_FRAME_LEN: usize = 8;

/// One 16-byte actuator command
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ActuatorFrame([u8; 16]);

impl ActuatorFrame {
    /// Raw bytes as sent on the wire
    #[inline]
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Parameter sub-frame
    pub fn parameter(&self) -> &[u8] {
        &self.0[..SUB_FRAME_LEN]
    }

    /// Run sub-frame
    pub fn run(&self) -> &[u8] {
        &self.0[SUB_FRAME_LEN..]
    }

    /// Sequence number carried by the run sub-frame
    pub fn sequence(&self) -> u8 {
        self.0[14]
    }
}

impl AsRef<[u8]> for ActuatorFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ActuatorFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActuatorFrame(")?;
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{b:02X}")?;
        }
        write!(f, ")")
    }
}

/// XOR of all bytes, masked to 7 bits
#[inline]
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc ^ b) & LOW7
}

/// Build the per-car parameter sub-frame
pub fn encode_parameter_frame(
    address: u8,
    reverse: bool,
    run_time_ms: u16,
    speed_rpm: u16,
    delay_ms: u16,
) -> Result<[u8; 8]> {
    if address == 0 || address > MAX_PARAMETER_ADDRESS {
        return Err(CodecError::AddressOutOfRange {
            address,
            max: MAX_PARAMETER_ADDRESS,
        });
    }
    if !(MIN_SPEED_RPM..=MAX_SPEED_RPM).contains(&speed_rpm) {
        return Err(CodecError::SpeedOutOfRange {
            speed_rpm,
            min: MIN_SPEED_RPM,
            max: MAX_SPEED_RPM,
        });
    }
    if delay_ms > MAX_DELAY_MS {
        return Err(CodecError::DelayOutOfRange {
            delay_ms,
            max: MAX_DELAY_MS,
        });
    }
    if run_time_ms > MAX_RUN_TIME_MS {
        return Err(CodecError::RunTimeOutOfRange {
            run_time_ms,
            max: MAX_RUN_TIME_MS,
        });
    }

    let speed = to_wire_byte(speed_rpm / SPEED_STEP_RPM);
    let delay = to_wire_byte(delay_ms / TIME_STEP_MS);
    let time = to_wire_byte(run_time_ms / TIME_STEP_MS);

    let mut frame = [0u8; 8];
    frame[0] = PARAMETER_HEADER;
    frame[1] = (u8::from(reverse) << 6) | (high_bit(speed) << 5) | (address & 0x1F);
    frame[2] = speed & LOW7;
    frame[3] = delay & LOW7;
    frame[4] = time & LOW7;
    frame[5] = (PI_FIELD << 3) | (TIME_MODE << 2) | (high_bit(delay) << 1) | high_bit(time);
    frame[6] = 0;
    frame[7] = checksum(&frame[1..7]);
    Ok(frame)
}

/// Build the broadcast run sub-frame firing `addresses`
pub fn encode_run_frame(addresses: &[u8], sequence: u8) -> Result<[u8; 8]> {
    let mut frame = [0u8; 8];
    frame[0] = RUN_HEADER;

    for &address in addresses {
        if address == 0 || address > MAX_RUN_ADDRESS {
            return Err(CodecError::AddressOutOfRange {
                address,
                max: MAX_RUN_ADDRESS,
            });
        }
        let (register, bit) = run_bit(address);
        frame[1 + register] |= 1 << bit;
    }

    frame[6] = sequence & LOW7;
    frame[7] = checksum(&frame[1..7]);
    Ok(frame)
}

/// Parameter frame for one car followed by its run trigger
pub fn encode_actuator_frame(
    address: u8,
    reverse: bool,
    run_time_ms: u16,
    speed_rpm: u16,
    delay_ms: u16,
    sequence: u8,
) -> Result<ActuatorFrame> {
    let parameter = encode_parameter_frame(address, reverse, run_time_ms, speed_rpm, delay_ms)?;
    let run = encode_run_frame(&[address], sequence)?;

    let mut bytes = [0u8; 16];
    bytes[..SUB_FRAME_LEN].copy_from_slice(&parameter);
    bytes[SUB_FRAME_LEN..].copy_from_slice(&run);
    Ok(ActuatorFrame(bytes))
}

/// Register index (0..5) and bit for a run address
///
/// Addresses 1–7, 9–15, 17–23, 25–31 fill registers 0–3; the multiples of 8
/// share register 4, one bit each.
fn run_bit(address: u8) -> (usize, u8) {
    if address % 8 == 0 {
        (4, address / 8 - 1)
    } else {
        (usize::from(address / 8), address % 8 - 1)
    }
}

#[inline]
fn to_wire_byte(value: u16) -> u8 {
    // validated ranges keep every value at or below 255
    u8::try_from(value).unwrap_or(u8::MAX)
}

#[inline]
fn high_bit(value: u8) -> u8 {
    (value >> 7) & 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        // speed 1530 → 255, delay 100 → 10, time 1500 → 150
        let frame = encode_actuator_frame(5, true, 1500, 1530, 100, 9).unwrap();
        let b = frame.as_bytes();

        assert_eq!(b[0], PARAMETER_HEADER);
        assert_eq!(b[1], 0x40 | 0x20 | 5);
        assert_eq!(b[2], 255 & 0x7F);
        assert_eq!(b[3], 10);
        assert_eq!(b[4], 150 & 0x7F);
        assert_eq!(b[5], (0b010 << 3) | (1 << 2) | 1);
        assert_eq!(b[6], 0);
        assert_eq!(b[7], checksum(&b[1..7]));

        assert_eq!(b[8], RUN_HEADER);
        assert_eq!(b[9], 1 << 4);
        assert_eq!(&b[10..14], &[0, 0, 0, 0]);
        assert_eq!(b[14], 9);
        assert_eq!(b[15], checksum(&b[9..15]));
    }

    #[test]
    fn test_checksums_across_valid_grid() {
        for address in [1u8, 7, 8, 15, 16, 24, 31] {
            for (speed, delay, time) in [(30, 0, 0), (600, 1270, 2550), (1530, 2550, 10)] {
                for sequence in [0u8, 63, 127] {
                    for reverse in [false, true] {
                        let f = encode_actuator_frame(address, reverse, time, speed, delay, sequence)
                            .unwrap();
                        let b = f.as_bytes();
                        assert_eq!(b.len(), 16);
                        assert_eq!(b[7], b[1..7].iter().fold(0, |a, x| a ^ x) & 0x7F);
                        assert_eq!(b[15], b[9..15].iter().fold(0, |a, x| a ^ x) & 0x7F);
                        assert!(b[1..8].iter().all(|x| x & 0x80 == 0));
                        assert!(b[9..16].iter().all(|x| x & 0x80 == 0));
                    }
                }
            }
        }
    }

    #[test]
    fn test_run_bitmap_mapping() {
        let cases = [
            (1u8, 1usize, 0x01u8),
            (7, 1, 0x40),
            (9, 2, 0x01),
            (15, 2, 0x40),
            (17, 3, 0x01),
            (31, 4, 0x40),
            (8, 5, 0x01),
            (16, 5, 0x02),
            (24, 5, 0x04),
            (32, 5, 0x08),
        ];
        for (address, byte, mask) in cases {
            let frame = encode_run_frame(&[address], 0).unwrap();
            assert_eq!(frame[byte], mask, "address {address}");
        }
    }

    #[test]
    fn test_run_frame_multiple_cars() {
        let frame = encode_run_frame(&[1, 2, 32], 5).unwrap();
        assert_eq!(frame[1], 0x03);
        assert_eq!(frame[5], 0x08);
        assert_eq!(frame[6], 5);
    }

    #[test]
    fn test_sequence_high_bit_masked() {
        let frame = encode_actuator_frame(1, false, 100, 600, 0, 200).unwrap();
        assert_eq!(frame.sequence(), 200 & 0x7F);
    }

    #[test]
    fn test_validation_rejects_out_of_range() {
        assert!(matches!(
            encode_actuator_frame(0, false, 100, 600, 0, 0),
            Err(CodecError::AddressOutOfRange { .. })
        ));
        assert!(matches!(
            encode_actuator_frame(32, false, 100, 600, 0, 0),
            Err(CodecError::AddressOutOfRange { max: 31, .. })
        ));
        assert!(matches!(
            encode_actuator_frame(1, false, 100, 29, 0, 0),
            Err(CodecError::SpeedOutOfRange { .. })
        ));
        assert!(matches!(
            encode_actuator_frame(1, false, 100, 1531, 0, 0),
            Err(CodecError::SpeedOutOfRange { .. })
        ));
        assert!(matches!(
            encode_actuator_frame(1, false, 100, 600, 2551, 0),
            Err(CodecError::DelayOutOfRange { .. })
        ));
        assert!(matches!(
            encode_actuator_frame(1, false, 2551, 600, 0, 0),
            Err(CodecError::RunTimeOutOfRange { .. })
        ));
        assert!(encode_run_frame(&[33], 0).is_err());
        assert!(encode_run_frame(&[32], 0).is_ok());
    }
}
