//! Repeat-read suppression

use std::collections::HashMap;
use std::time::{Duration, Instant};

use contracts::is_valid_barcode;

#[derive(Debug, Clone, Copy)]
struct RepeatEntry {
    first_seen: Instant,
    count: u32,
}

/// Barcode → first sighting table with inline expiry
///
/// A barcode seen again within `window` of its first sighting is dropped
/// while its count is at most `max_repeats`; past that (or past the window)
/// it passes and restarts its entry. Empty and no-read barcodes always pass.
#[derive(Debug)]
pub struct DuplicateFilter {
    window: Duration,
    max_repeats: u32,
    noread_token: String,
    seen: HashMap<String, RepeatEntry>,
}

impl DuplicateFilter {
    pub fn new(window: Duration, max_repeats: u32, noread_token: impl Into<String>) -> Self {
        Self {
            window,
            max_repeats,
            noread_token: noread_token.into(),
            seen: HashMap::new(),
        }
    }

    /// Whether a record with `barcode` observed at `now` is a new parcel
    pub fn admit(&mut self, barcode: &str, now: Instant) -> bool {
        if !is_valid_barcode(barcode, &self.noread_token) {
            return true;
        }
        self.sweep(now);

        let key = barcode.trim();
        match self.seen.get_mut(key) {
            Some(entry)
                if now.saturating_duration_since(entry.first_seen) <= self.window
                    && entry.count <= self.max_repeats =>
            {
                entry.count += 1;
                false
            }
            Some(entry) => {
                *entry = RepeatEntry {
                    first_seen: now,
                    count: 1,
                };
                true
            }
            None => {
                self.seen.insert(
                    key.to_string(),
                    RepeatEntry {
                        first_seen: now,
                        count: 1,
                    },
                );
                true
            }
        }
    }

    /// Drop entries whose window has passed
    pub fn sweep(&mut self, now: Instant) {
        let window = self.window;
        self.seen
            .retain(|_, entry| now.saturating_duration_since(entry.first_seen) <= window);
    }

    /// Barcodes currently tracked
    pub fn tracked(&self) -> usize {
        self.seen.len()
    }
}
