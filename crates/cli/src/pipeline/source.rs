//! Scanner record source for live runs
//!
//! One JSON object per line, e.g.
//! `{"barcode":"SF0001","length_mm":320,"width_mm":210,"height_mm":90}`.
//! Every field is optional; a missing barcode counts as a no-read.

use std::time::Instant;

use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use contracts::ParcelEvent;

#[derive(Debug, Deserialize)]
struct ScanRecord {
    #[serde(default)]
    barcode: Option<String>,
    #[serde(default)]
    length_mm: f64,
    #[serde(default)]
    width_mm: f64,
    #[serde(default)]
    height_mm: f64,
}

/// Forward records from `reader` to `tx` until EOF or the receiver closes
///
/// Events are stamped with their arrival time. Returns the number forwarded.
pub async fn forward_scan_records<R>(
    reader: R,
    noread_token: String,
    tx: mpsc::Sender<ParcelEvent>,
) -> u64
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded: u64 = 0;
    let mut line_no: u64 = 0;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "scanner source read failed");
                break;
            }
        };
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let record: ScanRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(e) => {
                warn!(line = line_no, error = %e, "malformed scanner record skipped");
                continue;
            }
        };

        let barcode = record.barcode.unwrap_or_else(|| noread_token.clone());
        let event = ParcelEvent::new(barcode, Instant::now(), forwarded + 1).with_dimensions(
            record.length_mm,
            record.width_mm,
            record.height_mm,
        );

        if tx.send(event).await.is_err() {
            debug!("scanner receiver closed");
            break;
        }
        forwarded += 1;
    }

    info!(forwarded, "scanner source finished");
    forwarded
}
