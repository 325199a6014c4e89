//! Background reclamation of expired dedup records.
//!
//! Purely space reclamation: correctness comes from the expiry checks at
//! claim/read time, so a sweep that fails (or never runs) affects disk
//! usage, not deduplication.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::store::DedupStore;

/// Periodic sweeper for finalized records past their retention window.
pub struct ExpirySweeper {
    store: Arc<dyn DedupStore>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(store: Arc<dyn DedupStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Start the sweep loop on the runtime. The first sweep happens one
    /// full interval after start.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(());

        let handle = tokio::spawn(async move {
            sweep_loop(self.store, self.interval, shutdown_rx).await;
        });

        SweeperHandle {
            shutdown_tx,
            handle: Some(handle),
        }
    }
}

/// Owner handle for a running sweeper. Dropping it aborts the task;
/// [`SweeperHandle::shutdown`] stops it deterministically.
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Signal the sweeper to stop and wait for it to finish.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

async fn sweep_loop(
    store: Arc<dyn DedupStore>,
    interval: Duration,
    mut shutdown: watch::Receiver<()>,
) {
    info!(interval_secs = interval.as_secs(), "dedup sweeper starting");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("dedup sweeper shutting down");
                break;
            }
            _ = sleep(interval) => {
                match store.sweep_expired().await {
                    Ok(removed) if removed > 0 => {
                        info!(removed, "swept expired dedup records");
                    }
                    Ok(_) => {
                        debug!("no expired dedup records to sweep");
                    }
                    Err(e) => {
                        error!(error = %e, "dedup sweep failed");
                    }
                }
            }
        }
    }
}
