//! Debounced checkpoint scheduling
//!
//! Cancel-on-supersede: scheduling a checkpoint for a room atomically
//! aborts any previously scheduled, not-yet-fired task for that room, so
//! a burst of assistant merges produces one durable write. The snapshot
//! is taken when the task fires, not when it is scheduled, so the write
//! captures every edit applied during the delay.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::AbortHandle;

use crate::store::{ProjectId, ProjectStore};
use crate::sync_server::room::RoomContext;

pub struct CheckpointScheduler {
    store: Arc<dyn ProjectStore>,
    delay: Duration,
    pending: Mutex<HashMap<ProjectId, AbortHandle>>,
}

impl CheckpointScheduler {
    pub fn new(store: Arc<dyn ProjectStore>, delay: Duration) -> Self {
        Self {
            store,
            delay,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Schedule a durable checkpoint of `room`'s tree after the
    /// configured delay, superseding any pending one for the same room.
    ///
    /// A persistence failure is logged and the in-memory tree is left
    /// untouched; live broadcasts continue and the durable copy stays
    /// stale until the next checkpoint. No automatic retry.
    pub fn schedule(&self, room: &Arc<RoomContext>) {
        let mut pending = self.pending.lock();
        if let Some(previous) = pending.remove(&room.room_id) {
            previous.abort();
        }

        let store = Arc::clone(&self.store);
        let room = Arc::clone(room);
        let room_id = room.room_id.clone();
        let delay = self.delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let tree = room.snapshot_tree();
            match store.persist_file_tree(&room.room_id, &tree).await {
                Ok(()) => {
                    tracing::debug!(
                        "checkpointed room {} ({} files)",
                        room.room_id,
                        tree.len()
                    );
                }
                Err(e) => {
                    tracing::error!("checkpoint for room {} failed: {}", room.room_id, e);
                }
            }
        });
        pending.insert(room_id, task.abort_handle());
    }
}
