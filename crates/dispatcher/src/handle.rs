//! DispatcherHandle - the running consumer loop

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use contracts::ParcelEvent;

use crate::dispatcher::ActuationDispatcher;

/// Handle to a started dispatcher loop
pub struct DispatcherHandle {
    worker: JoinHandle<()>,
    cancel: CancellationToken,
}

impl DispatcherHandle {
    pub(crate) fn new(worker: JoinHandle<()>, cancel: CancellationToken) -> Self {
        Self { worker, cancel }
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Wait for the loop to drain
    ///
    /// Returns once the dispatcher was closed and every queued parcel ran,
    /// or right after a shutdown.
    #[instrument(name = "dispatcher_handle_join", skip(self))]
    pub async fn join(self) {
        if let Err(e) = self.worker.await {
            error!(error = ?e, "dispatch loop panicked");
        }
    }

    /// Cancel in-flight sequences and wait for the loop to stop
    #[instrument(name = "dispatcher_handle_shutdown", skip(self))]
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.join().await;
        debug!("dispatcher shutdown complete");
    }
}

/// Single consumer: one permit per parcel, then a task per parcel
#[instrument(
    name = "actuation_dispatch_loop",
    skip(dispatcher, rx),
    fields(link = %dispatcher.link_name())
)]
pub(crate) async fn dispatch_loop(
    dispatcher: ActuationDispatcher,
    mut rx: mpsc::UnboundedReceiver<ParcelEvent>,
) {
    let cancel = dispatcher.service_token().clone();
    let permits = dispatcher.permits();
    let mut tasks = JoinSet::new();
    let mut spawned: u64 = 0;

    info!("dispatch loop started");

    loop {
        let parcel = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(parcel) => parcel,
                None => break,
            },
        };
        observability::record_queue_depth(dispatcher.counters().dec_queue_len());

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(index = parcel.index, "parcel dropped while waiting for a permit");
                break;
            }
            permit = permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let worker = dispatcher.clone();
        tasks.spawn(async move {
            let _permit = permit;
            worker.run_parcel(parcel).await;
        });
        spawned += 1;

        while let Some(done) = tasks.try_join_next() {
            if let Err(e) = done {
                error!(error = ?e, "dispatch task panicked");
            }
        }
    }

    let dropped = rx.len();
    if dropped > 0 {
        debug!(dropped, "queued parcels dropped on shutdown");
    }

    while let Some(done) = tasks.join_next().await {
        if let Err(e) = done {
            error!(error = ?e, "dispatch task panicked");
        }
    }

    info!(spawned, "dispatch loop stopped");
}
