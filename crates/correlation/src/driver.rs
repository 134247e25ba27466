//! Async driver for the correlation buffer

use std::time::Instant;

use contracts::ParcelEvent;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::buffer::CorrelationBuffer;
use crate::stats::CorrelationStats;

/// Run `buffer` between `input` and `output` until `input` closes
///
/// The open burst is flushed when the input closes. Returns final stats.
pub fn spawn_correlator(
    mut buffer: CorrelationBuffer,
    mut input: mpsc::Receiver<ParcelEvent>,
    output: mpsc::Sender<ParcelEvent>,
) -> JoinHandle<CorrelationStats> {
    tokio::spawn(async move {
        loop {
            let deadline = buffer.next_deadline();
            let released = tokio::select! {
                event = input.recv() => match event {
                    Some(event) => buffer.ingest_parcel_event(event, Instant::now()),
                    None => {
                        if let Some(record) = buffer.flush() {
                            let _ = output.send(record).await;
                        }
                        break;
                    }
                },
                _ = wait_for(deadline) => buffer.poll_expired(Instant::now()),
            };

            if let Some(record) = released {
                if output.send(record).await.is_err() {
                    debug!("correlation output closed");
                    break;
                }
            }
        }

        let stats = buffer.stats();
        info!(
            events = stats.events_ingested,
            released = stats.records_released,
            duplicates = stats.duplicates_suppressed,
            "correlator stopped"
        );
        stats
    })
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::CorrelationConfig;
    use std::time::Duration;

    #[tokio::test]
    async fn test_driver_merges_and_flushes() {
        let config = CorrelationConfig {
            merge_window_ms: 40,
            ..Default::default()
        };
        let (in_tx, in_rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let handle = spawn_correlator(CorrelationBuffer::new(&config), in_rx, out_tx);

        let now = Instant::now();
        in_tx.send(ParcelEvent::new("SF1", now, 1)).await.unwrap();
        in_tx
            .send(ParcelEvent::new("NOREAD", now, 2).with_dimensions(1.0, 2.0, 3.0))
            .await
            .unwrap();

        // closed by the window timer, not by new input
        let merged = tokio::time::timeout(Duration::from_secs(1), out_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(merged.barcode, "SF1");
        assert!(merged.has_dimensions());

        in_tx.send(ParcelEvent::new("SF2", Instant::now(), 3)).await.unwrap();
        drop(in_tx);

        let flushed = out_rx.recv().await.unwrap();
        assert_eq!(flushed.barcode, "SF2");

        let stats = handle.await.unwrap();
        assert_eq!(stats.events_ingested, 3);
        assert_eq!(stats.records_released, 2);
    }
}
