//! ParcelEvent - the unit passed between subsystems
//!
//! Produced by the scanner, merged by the correlation buffer, enriched by the
//! orchestrator and finally consumed by the actuation dispatcher.

use bytes::Bytes;
use std::time::Instant;

/// Barcode reported by the scanner when nothing could be decoded
pub const DEFAULT_NOREAD_TOKEN: &str = "NOREAD";

/// Processing status of a parcel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParcelStatus {
    /// Freshly scanned, not yet merged
    #[default]
    Scanned,
    /// Burst merged and deduplicated
    Correlated,
    /// Weight/volume enrichment finished
    Enriched,
    /// Chute decided, waiting for actuation
    Routed,
    /// Every car in the chute sequence was commanded
    Sorted,
    /// Actuation skipped or incomplete
    Failed,
}

/// Parcel event
///
/// Mutable while travelling through the pipeline; ownership moves stage by stage.
#[derive(Debug, Clone)]
pub struct ParcelEvent {
    /// Decoded barcode (may be empty or the no-read token)
    pub barcode: String,

    /// Weight in grams (0 = unknown)
    pub weight_grams: f64,

    /// Length in millimetres (0 = unknown)
    pub length_mm: f64,

    /// Width in millimetres (0 = unknown)
    pub width_mm: f64,

    /// Height in millimetres (0 = unknown)
    pub height_mm: f64,

    /// Encoded image from the scanner, dropped as soon as it is not needed
    pub image: Option<Bytes>,

    /// Scan time; the weight correlation window is centred here
    pub created_at: Instant,

    /// Sequence number (scanner index before merge, merged sequence after)
    pub index: u64,

    /// Chute decided for this parcel
    pub chute: Option<i32>,

    /// Processing status
    pub status: ParcelStatus,
}

impl ParcelEvent {
    /// Create a bare event with only a barcode
    pub fn new(barcode: impl Into<String>, created_at: Instant, index: u64) -> Self {
        Self {
            barcode: barcode.into(),
            weight_grams: 0.0,
            length_mm: 0.0,
            width_mm: 0.0,
            height_mm: 0.0,
            image: None,
            created_at,
            index,
            chute: None,
            status: ParcelStatus::Scanned,
        }
    }

    /// Builder-style dimension setter
    pub fn with_dimensions(mut self, length_mm: f64, width_mm: f64, height_mm: f64) -> Self {
        self.length_mm = length_mm;
        self.width_mm = width_mm;
        self.height_mm = height_mm;
        self
    }

    /// Builder-style weight setter
    pub fn with_weight(mut self, weight_grams: f64) -> Self {
        self.weight_grams = weight_grams;
        self
    }

    /// Builder-style chute setter
    pub fn with_chute(mut self, chute: i32) -> Self {
        self.chute = Some(chute);
        self
    }

    /// Whether the barcode carries a usable value
    pub fn has_valid_barcode(&self, noread_token: &str) -> bool {
        is_valid_barcode(&self.barcode, noread_token)
    }

    /// Whether all three dimensions are known
    pub fn has_dimensions(&self) -> bool {
        self.length_mm > 0.0 && self.width_mm > 0.0 && self.height_mm > 0.0
    }

    /// Volume in cubic centimetres, 0 when any dimension is unknown
    pub fn volume_cm3(&self) -> f64 {
        if self.has_dimensions() {
            self.length_mm * self.width_mm * self.height_mm / 1000.0
        } else {
            0.0
        }
    }

    /// Release the image payload, returning it to the caller
    pub fn take_image(&mut self) -> Option<Bytes> {
        self.image.take()
    }
}

/// Barcode is non-empty and not the no-read token
pub fn is_valid_barcode(barcode: &str, noread_token: &str) -> bool {
    let trimmed = barcode.trim();
    !trimmed.is_empty() && !trimmed.eq_ignore_ascii_case(noread_token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_barcode_validity() {
        assert!(is_valid_barcode("PKG001", DEFAULT_NOREAD_TOKEN));
        assert!(!is_valid_barcode("", DEFAULT_NOREAD_TOKEN));
        assert!(!is_valid_barcode("   ", DEFAULT_NOREAD_TOKEN));
        assert!(!is_valid_barcode("noread", DEFAULT_NOREAD_TOKEN));
    }

    #[test]
    fn test_volume() {
        let p = ParcelEvent::new("A", Instant::now(), 1).with_dimensions(100.0, 200.0, 50.0);
        assert!((p.volume_cm3() - 1000.0).abs() < 1e-9);

        let partial = ParcelEvent::new("A", Instant::now(), 1).with_dimensions(100.0, 0.0, 50.0);
        assert_eq!(partial.volume_cm3(), 0.0);
    }

    #[test]
    fn test_take_image_releases_payload() {
        let mut p = ParcelEvent::new("A", Instant::now(), 1);
        p.image = Some(Bytes::from_static(b"jpeg"));
        assert!(p.take_image().is_some());
        assert!(p.image.is_none());
    }
}
