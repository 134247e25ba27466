//! Static-mode stability filter

use std::collections::VecDeque;

/// Maximum spread between the newest reading and each earlier one
pub const STABILITY_TOLERANCE_GRAMS: f64 = 10.0;

/// Sliding window of the last `capacity` positive readings
#[derive(Debug, Clone)]
pub struct StabilityWindow {
    capacity: usize,
    readings: VecDeque<f64>,
}

impl StabilityWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            readings: VecDeque::with_capacity(capacity),
        }
    }

    /// Feed one reading; returns the weight to publish once the window settles
    ///
    /// Zero and negative readings are ignored. The window is cleared after
    /// every publish.
    pub fn push(&mut self, weight_grams: f64) -> Option<f64> {
        if weight_grams <= 0.0 {
            return None;
        }

        self.readings.push_back(weight_grams);
        while self.readings.len() > self.capacity {
            self.readings.pop_front();
        }
        if self.readings.len() < self.capacity {
            return None;
        }

        let newest = *self.readings.back()?;
        let stable = self
            .readings
            .iter()
            .all(|r| (r - newest).abs() <= STABILITY_TOLERANCE_GRAMS);
        if stable {
            self.readings.clear();
            Some(newest)
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.readings.clear();
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publishes_newest_when_settled() {
        let mut window = StabilityWindow::new(3);
        assert_eq!(window.push(1000.0), None);
        assert_eq!(window.push(1004.0), None);
        assert_eq!(window.push(1008.0), Some(1008.0));
        assert!(window.is_empty());
    }

    #[test]
    fn test_unstable_window_slides() {
        let mut window = StabilityWindow::new(3);
        window.push(500.0);
        window.push(1000.0);
        assert_eq!(window.push(1001.0), None);
        // 500 slides out
        assert_eq!(window.push(1002.0), Some(1002.0));
    }

    #[test]
    fn test_boundary_tolerance() {
        let mut window = StabilityWindow::new(2);
        window.push(1000.0);
        assert_eq!(window.push(1010.0), Some(1010.0));

        window.push(1000.0);
        assert_eq!(window.push(1010.5), None);
    }

    #[test]
    fn test_zero_and_negative_ignored() {
        let mut window = StabilityWindow::new(2);
        window.push(300.0);
        assert_eq!(window.push(0.0), None);
        assert_eq!(window.push(-5.0), None);
        assert_eq!(window.len(), 1);
        assert_eq!(window.push(302.0), Some(302.0));
    }
}
