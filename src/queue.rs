//! Offline action queue: durable enqueue, opportunistic batch flush.

use crate::batch::BatchClient;
use crate::config::ClientConfig;
use crate::connectivity::Connectivity;
use crate::error::Result;
use crate::store::QueueStore;
use crate::types::{ActionKind, FlushOutcome, QueueItem, SkipReason};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub struct OfflineQueue {
    store: Arc<QueueStore>,
    client: BatchClient,
    connectivity: Connectivity,
    /// Single-flight guard, scoped to this instance
    flushing: AtomicBool,
}

/// Clears the in-flight flag on every exit path of `flush`.
struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl OfflineQueue {
    pub fn new(store: Arc<QueueStore>, client: BatchClient, connectivity: Connectivity) -> Self {
        Self {
            store,
            client,
            connectivity,
            flushing: AtomicBool::new(false),
        }
    }

    /// Open the journal under `config.queue_dir()` and build a queue around it.
    pub fn open(config: ClientConfig, connectivity: Connectivity) -> Result<Self> {
        let store = Arc::new(QueueStore::open(&config.queue_dir())?);
        Ok(Self::new(store, BatchClient::new(config), connectivity))
    }

    pub fn store(&self) -> &Arc<QueueStore> {
        &self.store
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// Unix seconds of the last batch the server accepted, 0 if none yet.
    pub fn last_delivery(&self) -> u64 {
        self.client.last_success_timestamp()
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.load(Ordering::Acquire)
    }

    /// Durably record an action and return its id. Never touches the network.
    pub fn enqueue(&self, kind: ActionKind, payload: serde_json::Value) -> Result<String> {
        let item = QueueItem::new(kind, payload);
        let id = item.id.clone();
        self.store.put(item)?;
        tracing::debug!("[QUEUE] enqueued {} {}", kind, id);
        Ok(id)
    }

    pub fn list_pending(&self) -> Result<Vec<QueueItem>> {
        self.store.list()
    }

    pub fn remove_processed(&self, ids: &[String]) -> Result<usize> {
        self.store.remove(ids)
    }

    /// Replay every pending item against the batch endpoint.
    ///
    /// A request-level failure commits nothing. A successful response commits
    /// every item the server did not list as failed; listed failures stay
    /// queued for the next flush.
    pub async fn flush(&self) -> Result<FlushOutcome> {
        if !self.connectivity.is_online() {
            return Ok(FlushOutcome::Skipped(SkipReason::Offline));
        }
        if self
            .flushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("[QUEUE] flush already in progress");
            return Ok(FlushOutcome::Skipped(SkipReason::InFlight));
        }
        let _guard = FlushGuard(&self.flushing);

        let items = self.store.list()?;
        if items.is_empty() {
            return Ok(FlushOutcome::Empty);
        }

        let resp = match self.client.submit(&items).await {
            Ok(resp) => resp,
            Err(e) => {
                if e.is_transient() {
                    tracing::warn!(
                        "[QUEUE] batch request failed, keeping {} items: {}",
                        items.len(),
                        e
                    );
                } else {
                    tracing::error!(
                        "[QUEUE] batch endpoint unusable, keeping {} items: {}",
                        items.len(),
                        e
                    );
                }
                return Ok(FlushOutcome::RequestFailed {
                    error: e.to_string(),
                    retained: items.len(),
                });
            }
        };

        let failed: HashSet<&str> = resp.failed.iter().map(|f| f.id.as_str()).collect();
        let (retained, committed): (Vec<String>, Vec<String>) = items
            .into_iter()
            .map(|item| item.id)
            .partition(|id| failed.contains(id.as_str()));

        for failure in &resp.failed {
            tracing::warn!(
                "[QUEUE] server rejected {} ({}): {}",
                failure.id,
                failure.kind.as_deref().unwrap_or("unknown kind"),
                failure.error.as_deref().unwrap_or("no reason given")
            );
        }

        self.store.remove(&committed)?;

        tracing::info!(
            "[QUEUE] flushed {} items (server processed={}, retained={})",
            committed.len(),
            resp.processed,
            retained.len()
        );

        Ok(FlushOutcome::BatchPartialResult {
            committed,
            retained,
        })
    }

    async fn flush_logged(&self) {
        if let Err(e) = self.flush().await {
            tracing::error!("[QUEUE] flush failed: {}", e);
        }
    }

    /// Flush now and on every offline→online transition until the
    /// returned handle is stopped or dropped.
    pub fn start_sync(self: &Arc<Self>) -> SyncHandle {
        let queue = Arc::clone(self);
        let mut online_rx = self.connectivity.subscribe();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut was_online = *online_rx.borrow_and_update();
            queue.flush_logged().await;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    changed = online_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let online = *online_rx.borrow_and_update();
                        if online && !was_online {
                            tracing::info!("[QUEUE] back online, flushing");
                            // runs to completion even if stop arrives meanwhile
                            queue.flush_logged().await;
                        }
                        was_online = online;
                    }
                }
            }
            tracing::debug!("[QUEUE] sync listener stopped");
        });

        SyncHandle {
            stop: Some(stop_tx),
            handle: Some(handle),
        }
    }
}

/// Registration returned by [`OfflineQueue::start_sync`]. Dropping it
/// deregisters the connectivity listener.
pub struct SyncHandle {
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SyncHandle {
    pub fn stop(mut self) {
        self.signal_stop();
    }

    /// Stop listening and wait for any in-flight flush to finish.
    pub async fn stopped(mut self) {
        self.signal_stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    fn signal_stop(&mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.signal_stop();
    }
}
