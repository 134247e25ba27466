//! Simulated line devices
//!
//! Used by `--simulate` runs and integration tests: a scale that writes
//! telemetry into a mock link, and a scanner producing bursty parcel reads.

use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{ParcelEvent, WeighingMode, DEFAULT_NOREAD_TOKEN};
use frame_codec::{DYNAMIC_HEADER, DYNAMIC_TRAILER, STATIC_SENTINEL};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::mock::MockSerialTransport;

/// Dynamic-mode frame for `weight_kg` (two decimals, max 999.99 kg)
pub fn encode_dynamic_reading(weight_kg: f64) -> [u8; 8] {
    let hundredths = (weight_kg.max(0.0) * 100.0).round().min(99_999.0) as u32;
    let mut frame = [0u8; 8];
    frame[..2].copy_from_slice(&DYNAMIC_HEADER);
    let mut rest = hundredths;
    for slot in frame[2..7].iter_mut().rev() {
        *slot = (rest % 10) as u8;
        rest /= 10;
    }
    frame[7] = DYNAMIC_TRAILER;
    frame
}

/// Static-mode segment for `weight_kg`, character-reversed as the scale sends it
pub fn encode_static_reading(weight_kg: f64) -> Vec<u8> {
    let text = format!("{:06.2}", weight_kg.max(0.0));
    let mut segment: Vec<u8> = text.bytes().rev().collect();
    segment.push(STATIC_SENTINEL);
    segment
}

/// Scale writing telemetry into a mock link
#[derive(Clone)]
pub struct SimulatedScale {
    link: Arc<MockSerialTransport>,
    mode: WeighingMode,
    /// Static readings sent per parcel; must cover the stability window
    repeats: usize,
}

impl SimulatedScale {
    pub fn new(link: Arc<MockSerialTransport>, mode: WeighingMode, stable_check_count: usize) -> Self {
        Self {
            link,
            mode,
            repeats: stable_check_count.max(1),
        }
    }

    /// Link this scale writes into
    pub fn link(&self) -> &Arc<MockSerialTransport> {
        &self.link
    }

    /// Put a parcel of `weight_kg` on the platform
    pub fn present(&self, weight_kg: f64) {
        match self.mode {
            WeighingMode::Dynamic => self.link.inject_bytes(&encode_dynamic_reading(weight_kg)),
            WeighingMode::Static => {
                let segment = encode_static_reading(weight_kg);
                for _ in 0..self.repeats {
                    self.link.inject_bytes(&segment);
                }
            }
        }
    }
}

/// Simulated scanner configuration
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Stop after this many physical parcels (None = until the receiver closes)
    pub parcels: Option<u64>,
    /// Gap between physical parcels
    pub interval: Duration,
    /// Share of parcels whose label cannot be read at all
    pub noread_ratio: f64,
    /// Maximum reads emitted for one physical parcel
    pub burst_max: usize,
    /// Gap between reads of the same burst
    pub burst_spacing: Duration,
    /// Prefixes used to generate barcodes
    pub barcode_prefixes: Vec<String>,
    /// RNG seed
    pub seed: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            parcels: None,
            interval: Duration::from_millis(600),
            noread_ratio: 0.05,
            burst_max: 3,
            burst_spacing: Duration::from_millis(40),
            barcode_prefixes: vec!["SF".to_string(), "YT".to_string(), "JD".to_string()],
            seed: 7,
        }
    }
}

/// Scanner producing bursty, partial parcel reads
pub struct SimulatedScanner {
    config: ScannerConfig,
}

impl SimulatedScanner {
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    /// Run the scanner, optionally weighing every parcel on `scale` first
    pub fn spawn(
        self,
        tx: mpsc::Sender<ParcelEvent>,
        scale: Option<SimulatedScale>,
    ) -> JoinHandle<u64> {
        tokio::spawn(async move {
            let config = self.config;
            let mut rng = StdRng::seed_from_u64(config.seed);
            let mut index: u64 = 0;
            let mut produced: u64 = 0;

            info!(parcels = ?config.parcels, "simulated scanner started");

            'parcels: while config.parcels.is_none_or(|limit| produced < limit) {
                let weight_kg: f64 = rng.random_range(0.2..15.0);
                if let Some(scale) = &scale {
                    scale.present(weight_kg);
                }

                let readable = !rng.random_bool(config.noread_ratio.clamp(0.0, 1.0));
                let barcode = if readable {
                    let prefix = config
                        .barcode_prefixes
                        .get(rng.random_range(0..config.barcode_prefixes.len().max(1)))
                        .map(String::as_str)
                        .unwrap_or("PK");
                    format!("{prefix}{:010}", rng.random_range(0..10_000_000_000u64))
                } else {
                    DEFAULT_NOREAD_TOKEN.to_string()
                };
                let dims = (
                    rng.random_range(100.0..600.0),
                    rng.random_range(80.0..400.0),
                    rng.random_range(20.0..300.0),
                );

                let reads = rng.random_range(1..=config.burst_max.max(1));
                for read in 0..reads {
                    index += 1;
                    let mut event = ParcelEvent::new(DEFAULT_NOREAD_TOKEN, Instant::now(), index);
                    // first read carries the barcode, the last one the dimensions
                    if read == 0 {
                        event.barcode = barcode.clone();
                    }
                    if read + 1 == reads {
                        event = event.with_dimensions(dims.0, dims.1, dims.2);
                    }

                    if tx.send(event).await.is_err() {
                        debug!("scanner receiver closed");
                        break 'parcels;
                    }
                    tokio::time::sleep(config.burst_spacing).await;
                }

                produced += 1;
                tokio::time::sleep(config.interval).await;
            }

            info!(produced, reads = index, "simulated scanner stopped");
            produced
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame_codec::{try_parse_dynamic_frame, try_parse_static_segment, DynamicParse, StaticParse};

    #[test]
    fn test_dynamic_encoding_parses_back() {
        match try_parse_dynamic_frame(&encode_dynamic_reading(12.34)) {
            DynamicParse::Frame { weight_kg, consumed } => {
                assert!((weight_kg - 12.34).abs() < 1e-9);
                assert_eq!(consumed, 8);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_static_encoding_is_reversed() {
        assert_eq!(encode_static_reading(12.5), b"05.210=".to_vec());
        match try_parse_static_segment(&encode_static_reading(3.25)) {
            StaticParse::Segments { readings_kg, .. } => assert_eq!(readings_kg, vec![3.25]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_scanner_emits_bursts() {
        let (tx, mut rx) = mpsc::channel(64);
        let scanner = SimulatedScanner::new(ScannerConfig {
            parcels: Some(4),
            noread_ratio: 0.0,
            interval: Duration::from_millis(5),
            burst_spacing: Duration::from_millis(1),
            ..Default::default()
        });
        let handle = scanner.spawn(tx, None);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(handle.await.unwrap(), 4);
        assert!(events.len() >= 4);
        assert!(events.iter().filter(|e| e.has_dimensions()).count() == 4);
        assert!(events.windows(2).all(|w| w[0].index < w[1].index));
    }
}
