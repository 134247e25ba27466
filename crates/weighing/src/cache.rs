//! Bounded weight sample cache
//!
//! Samples arrive in time order, so the ring buffer's oldest entry is always
//! the first to expire. Capacity overflow overwrites the oldest sample.

use std::fmt;
use std::time::{Duration, Instant};

use contracts::WeightSample;
use ringbuf::{traits::*, HeapRb};

/// Closest samples found inside a query window
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Nearest {
    /// Closest sample with a positive weight
    pub non_zero: Option<WeightSample>,
    /// Closest zero (empty platform) sample
    pub zero: Option<WeightSample>,
}

impl Nearest {
    /// Keep the closer candidate of each class
    pub fn merge(self, other: Nearest, target: Instant) -> Nearest {
        Nearest {
            non_zero: closer(self.non_zero, other.non_zero, target),
            zero: closer(self.zero, other.zero, target),
        }
    }
}

/// Sample cache with capacity and age eviction
pub struct SampleCache {
    ring: HeapRb<WeightSample>,
    max_age: Duration,
    evicted: u64,
}

impl fmt::Debug for SampleCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleCache")
            .field("len", &self.ring.occupied_len())
            .field("capacity", &self.capacity())
            .field("max_age", &self.max_age)
            .field("evicted", &self.evicted)
            .finish()
    }
}

impl SampleCache {
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        Self {
            ring: HeapRb::new(capacity.max(1)),
            max_age,
            evicted: 0,
        }
    }

    /// Append a sample, then drop everything older than `max_age`
    pub fn push(&mut self, sample: WeightSample) {
        if self.ring.is_full() {
            let _ = self.ring.try_pop();
            self.evicted += 1;
        }
        let _ = self.ring.try_push(sample);
        self.evict_expired(sample.timestamp);
    }

    /// Drop samples older than `now - max_age`
    pub fn evict_expired(&mut self, now: Instant) -> usize {
        let mut evicted = 0;
        while let Some(oldest) = self.ring.try_peek() {
            if now.saturating_duration_since(oldest.timestamp) <= self.max_age {
                break;
            }
            let _ = self.ring.try_pop();
            evicted += 1;
        }
        self.evicted += evicted as u64;
        evicted
    }

    /// Closest samples to `target` with timestamps in `[lower, upper]`
    pub fn nearest(&self, lower: Instant, upper: Instant, target: Instant) -> Nearest {
        self.ring
            .iter()
            .filter(|s| s.timestamp >= lower && s.timestamp <= upper)
            .fold(Nearest::default(), |best, sample| {
                let found = if sample.is_zero() {
                    Nearest {
                        non_zero: None,
                        zero: Some(*sample),
                    }
                } else {
                    Nearest {
                        non_zero: Some(*sample),
                        zero: None,
                    }
                };
                best.merge(found, target)
            })
    }

    /// Copy of every cached sample, oldest first
    pub fn samples(&self) -> Vec<WeightSample> {
        self.ring.iter().copied().collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ring.occupied_len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity().get()
    }

    /// Samples dropped for capacity or age since creation
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}

fn distance(a: Instant, b: Instant) -> Duration {
    if a >= b {
        a - b
    } else {
        b - a
    }
}

fn closer(a: Option<WeightSample>, b: Option<WeightSample>, target: Instant) -> Option<WeightSample> {
    match (a, b) {
        (Some(a), Some(b)) => {
            if distance(b.timestamp, target) < distance(a.timestamp, target) {
                Some(b)
            } else {
                Some(a)
            }
        }
        (a, None) => a,
        (None, b) => b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    #[test]
    fn test_capacity_overwrites_oldest() {
        let base = Instant::now();
        let mut cache = SampleCache::new(3, Duration::from_secs(60));
        for i in 0..5 {
            cache.push(WeightSample::new(100.0 + i as f64, at(base, i)));
        }

        assert_eq!(cache.len(), 3);
        let weights: Vec<f64> = cache.samples().iter().map(|s| s.weight_grams).collect();
        assert_eq!(weights, vec![102.0, 103.0, 104.0]);
        assert_eq!(cache.evicted(), 2);
    }

    #[test]
    fn test_age_eviction_on_push() {
        let base = Instant::now();
        let mut cache = SampleCache::new(10, Duration::from_millis(100));
        cache.push(WeightSample::new(1.0, at(base, 0)));
        cache.push(WeightSample::new(2.0, at(base, 50)));
        cache.push(WeightSample::new(3.0, at(base, 160)));

        let weights: Vec<f64> = cache.samples().iter().map(|s| s.weight_grams).collect();
        assert_eq!(weights, vec![2.0, 3.0]);
    }

    #[test]
    fn test_nearest_prefers_closest_per_class() {
        let base = Instant::now();
        let mut cache = SampleCache::new(10, Duration::from_secs(60));
        cache.push(WeightSample::new(500.0, at(base, 100)));
        cache.push(WeightSample::new(0.0, at(base, 290)));
        cache.push(WeightSample::new(700.0, at(base, 350)));
        cache.push(WeightSample::new(900.0, at(base, 900)));

        let target = at(base, 300);
        let nearest = cache.nearest(at(base, 100), at(base, 800), target);
        assert_eq!(nearest.non_zero.map(|s| s.weight_grams), Some(700.0));
        assert_eq!(nearest.zero.map(|s| s.weight_grams), Some(0.0));
    }

    #[test]
    fn test_nearest_respects_window_edges() {
        let base = Instant::now();
        let mut cache = SampleCache::new(10, Duration::from_secs(60));
        cache.push(WeightSample::new(500.0, at(base, 99)));
        cache.push(WeightSample::new(600.0, at(base, 801)));

        let nearest = cache.nearest(at(base, 100), at(base, 800), at(base, 300));
        assert_eq!(nearest, Nearest::default());
    }
}
