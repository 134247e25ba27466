//! Burst merge

use std::sync::atomic::{AtomicU64, Ordering};

use contracts::{is_valid_barcode, ParcelEvent, ParcelStatus};

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Next process-wide merged record number
pub fn next_sequence() -> u64 {
    NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

/// Collapse one burst into a single record
///
/// Identity (scan time, image) comes from the first event; each of barcode,
/// weight and the three dimensions takes the first valid value in arrival
/// order. A burst of one comes back as scanned apart from its new sequence
/// number. Returns `None` for an empty burst.
pub fn merge_burst(
    events: Vec<ParcelEvent>,
    noread_token: &str,
    sequence: u64,
) -> Option<ParcelEvent> {
    let mut events = events.into_iter();
    let mut merged = events.next()?;
    let mut combined = false;

    for mut event in events {
        combined = true;
        if !is_valid_barcode(&merged.barcode, noread_token)
            && is_valid_barcode(&event.barcode, noread_token)
        {
            merged.barcode = std::mem::take(&mut event.barcode);
        }
        fill(&mut merged.weight_grams, event.weight_grams);
        fill(&mut merged.length_mm, event.length_mm);
        fill(&mut merged.width_mm, event.width_mm);
        fill(&mut merged.height_mm, event.height_mm);
        if merged.image.is_none() {
            merged.image = event.take_image();
        }
    }

    merged.index = sequence;
    if combined {
        merged.barcode = merged.barcode.trim().to_string();
        merged.status = ParcelStatus::Correlated;
    }
    Some(merged)
}

#[inline]
fn fill(slot: &mut f64, candidate: f64) {
    if *slot <= 0.0 && candidate > 0.0 {
        *slot = candidate;
    }
}
