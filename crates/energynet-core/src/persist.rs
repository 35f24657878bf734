//! Persistence hand-off between live networks and external storage.
//!
//! Networks never write to storage themselves. Significant energy changes
//! are pushed as [`PersistRequest`]s onto a channel created by
//! [`persist_channel`]; whoever owns the [`PersistQueue`] end flushes it
//! into a [`MetadataStore`] on its own schedule. Requests carry full
//! snapshots, so duplicate or re-ordered delivery of the same hub's record
//! converges to the latest value written.

use std::collections::HashMap;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use parking_lot::RwLock;

use crate::metadata::NetworkMetadata;
use crate::position::BlockPos;

/// A unit of work for the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistRequest {
    /// Write the network's energy snapshot, keyed by hub position.
    Save {
        hub: BlockPos,
        metadata: NetworkMetadata,
    },
    /// The network anchored at `hub` was destroyed.
    Forget { hub: BlockPos },
}

/// Key → JSON blob storage supplied by the host.
pub trait MetadataStore: Send + Sync {
    /// Load the blob stored for a hub, if any.
    fn load(&self, hub: BlockPos) -> Option<String>;
    /// Store a blob for a hub. Best-effort; implementations may retry.
    fn persist(&self, hub: BlockPos, json: String);
    /// Drop the blob stored for a hub.
    fn remove(&self, hub: BlockPos);
}

/// Sending half of the persistence queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PersistSender {
    tx: Sender<PersistRequest>,
}

impl PersistSender {
    /// Queue a request. A queue whose consumer has gone away is tolerated:
    /// the request is dropped and `false` is returned.
    pub fn send(&self, request: PersistRequest) -> bool {
        match self.tx.send(request) {
            Ok(()) => true,
            Err(err) => {
                let request = err.into_inner();
                tracing::debug!(?request, "persist queue consumer unavailable");
                false
            }
        }
    }
}

/// Receiving half of the persistence queue.
#[derive(Debug)]
pub struct PersistQueue {
    rx: Receiver<PersistRequest>,
}

/// Create a connected sender/queue pair.
pub fn persist_channel() -> (PersistSender, PersistQueue) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (PersistSender { tx }, PersistQueue { rx })
}

impl PersistQueue {
    /// Take every request currently queued without blocking.
    pub fn drain(&self) -> Vec<PersistRequest> {
        let mut requests = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(request) => requests.push(request),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        requests
    }

    /// Number of requests waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Drain the queue into `store`, collapsing repeated saves for the same
    /// hub to the most recent one. Returns the number of store operations
    /// performed.
    pub fn flush(&self, store: &dyn MetadataStore) -> usize {
        let mut latest: HashMap<BlockPos, PersistRequest> = HashMap::new();
        let mut order: Vec<BlockPos> = Vec::new();
        for request in self.drain() {
            let hub = match &request {
                PersistRequest::Save { hub, .. } | PersistRequest::Forget { hub } => *hub,
            };
            if latest.insert(hub, request).is_none() {
                order.push(hub);
            }
        }

        let mut written = 0;
        for hub in order {
            match latest.remove(&hub) {
                Some(PersistRequest::Save { metadata, .. }) => {
                    store.persist(hub, metadata.to_json());
                    written += 1;
                }
                Some(PersistRequest::Forget { .. }) => {
                    store.remove(hub);
                    written += 1;
                }
                None => {}
            }
        }
        if written > 0 {
            tracing::debug!(written, "flushed persist queue");
        }
        written
    }
}

/// Whether a change from `last_persisted` to `stored` is significant
/// enough to forward.
///
/// Forwarded when the delta reaches `fraction * capacity`, or when `stored`
/// sits on either boundary (empty or full). A fraction of zero forwards
/// every change.
pub fn passes_threshold(stored: u64, last_persisted: u64, capacity: u64, fraction: f64) -> bool {
    if fraction <= 0.0 || stored == 0 || stored == capacity {
        return true;
    }
    let delta = stored.abs_diff(last_persisted) as f64;
    delta >= fraction * capacity as f64
}

/// In-memory [`MetadataStore`], used by tests and headless hosts.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<BlockPos, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw blob, bypassing validation.
    pub fn insert_raw(&self, hub: BlockPos, json: impl Into<String>) {
        self.blobs.write().insert(hub, json.into());
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl MetadataStore for MemoryStore {
    fn load(&self, hub: BlockPos) -> Option<String> {
        self.blobs.read().get(&hub).cloned()
    }

    fn persist(&self, hub: BlockPos, json: String) {
        self.blobs.write().insert(hub, json);
    }

    fn remove(&self, hub: BlockPos) {
        self.blobs.write().remove(&hub);
    }
}
