//! Static-mode scale telemetry
//!
//! ASCII stream of `=`-terminated segments. The scale transmits each value
//! character-reversed: the first (up to) six characters of a segment are
//! reversed before parsing as kilograms, e.g. `05.2100=` → `012.50` → 12.5 kg.

use tracing::warn;

/// Segment terminator
pub const STATIC_SENTINEL: u8 = b'=';

/// Characters of each segment that carry the value
const VALUE_CHARS: usize = 6;

/// Shorter segments are noise
pub const STATIC_MIN_SEGMENT_LEN: usize = 3;

/// Buffered bytes tolerated without a sentinel before the buffer is corrupt
pub const STATIC_MAX_PENDING: usize = 100;

/// Outcome of one static parse attempt
#[derive(Debug, Clone, PartialEq)]
pub enum StaticParse {
    /// Every segment up to the last sentinel; drop `consumed` bytes
    ///
    /// `readings_kg` may be empty when all segments were rejected.
    Segments {
        readings_kg: Vec<f64>,
        consumed: usize,
    },
    /// No sentinel yet
    NeedMore,
    /// No sentinel and the buffer grew past the safety threshold
    Corrupt,
}

/// Parse all complete segments in `buffer`
pub fn try_parse_static_segment(buffer: &[u8]) -> StaticParse {
    let Some(last) = buffer.iter().rposition(|&b| b == STATIC_SENTINEL) else {
        return if buffer.len() > STATIC_MAX_PENDING {
            StaticParse::Corrupt
        } else {
            StaticParse::NeedMore
        };
    };

    let ready = String::from_utf8_lossy(&buffer[..last]);
    let readings_kg = ready
        .split(char::from(STATIC_SENTINEL))
        .filter_map(parse_segment)
        .collect();

    StaticParse::Segments {
        readings_kg,
        consumed: last + 1,
    }
}

fn parse_segment(segment: &str) -> Option<f64> {
    let segment = segment.trim();
    if segment.chars().count() < STATIC_MIN_SEGMENT_LEN {
        warn!(segment = %segment, "static segment too short, dropped");
        return None;
    }

    let head: Vec<char> = segment.chars().take(VALUE_CHARS).collect();
    let reversed: String = head.into_iter().rev().collect();

    match reversed.trim().parse::<f64>() {
        Ok(kg) if kg.is_finite() => Some(kg),
        _ => {
            warn!(segment = %segment, reversed = %reversed, "static segment unparsable, dropped");
            None
        }
    }
}
