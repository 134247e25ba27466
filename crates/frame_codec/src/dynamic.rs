//! Dynamic-mode scale telemetry
//!
//! Frame layout: `88 02 d0 d1 d2 d3 d4 16`. Each payload byte contributes its
//! value mod 10 as one decimal digit; the five digits read as kilograms with
//! two implied decimals (`0 1 2 3 4` → `012.34` kg).

/// First header byte
pub const DYNAMIC_HEADER: [u8; 2] = [0x88, 0x02];

/// Trailer byte
pub const DYNAMIC_TRAILER: u8 = 0x16;

/// Total frame length
pub const DYNAMIC_FRAME_LEN: usize = 8;

/// Buffered bytes tolerated without a frame before the caller must discard
pub const DYNAMIC_MAX_PENDING: usize = 64;

const PAYLOAD_DIGITS: usize = 5;
const IMPLIED_DECIMALS: i32 = 2;

/// Outcome of one dynamic parse attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DynamicParse {
    /// A complete frame; drop `consumed` bytes from the front of the buffer
    Frame { weight_kg: f64, consumed: usize },
    /// No frame yet, keep the buffer and wait for more bytes
    NeedMore,
    /// No frame and the buffer grew past the safety threshold
    DiscardAll,
}

/// Scan `buffer` for the first complete dynamic frame
pub fn try_parse_dynamic_frame(buffer: &[u8]) -> DynamicParse {
    if let Some(start) = find_frame(buffer) {
        let payload = &buffer[start + 2..start + 2 + PAYLOAD_DIGITS];
        return DynamicParse::Frame {
            weight_kg: decode_payload(payload),
            consumed: start + DYNAMIC_FRAME_LEN,
        };
    }

    if buffer.len() > DYNAMIC_MAX_PENDING {
        DynamicParse::DiscardAll
    } else {
        DynamicParse::NeedMore
    }
}

fn find_frame(buffer: &[u8]) -> Option<usize> {
    buffer.windows(DYNAMIC_FRAME_LEN).position(|w| {
        w[0] == DYNAMIC_HEADER[0] && w[1] == DYNAMIC_HEADER[1] && w[7] == DYNAMIC_TRAILER
    })
}

/// Packed decimal digits → kilograms
fn decode_payload(payload: &[u8]) -> f64 {
    let raw = payload
        .iter()
        .fold(0u32, |acc, b| acc * 10 + u32::from(b % 10));
    f64::from(raw) / 10f64.powi(IMPLIED_DECIMALS)
}
