//! File state synchronization
//!
//! The canonical in-memory file tree of each open room lives in its
//! [`RoomContext`]; the operations here are the only writers. Convergence
//! policy is whole-document last-received-wins: whichever edit for a path
//! the server applies last is the one a checkpoint will capture. There is
//! no merge, no per-character diffing, no vector clock.
//!
//! The live edit path never persists. Durability comes from explicit
//! checkpoints: a full-tree snapshot replaces the stored tree verbatim,
//! which means a stale snapshot from a slow client can clobber newer
//! concurrent edits. That weakness is part of the design contract, not a
//! bug to paper over here.

use crate::error::StoreError;
use crate::session::Identity;
use crate::store::{FileNode, FileTree, ProjectId, ProjectStore};
use crate::sync_server::protocol::ServerMessage;
use crate::sync_server::room::RoomContext;

impl RoomContext {
    /// Overwrite the file at `path`, creating it if absent, and echo the
    /// edit to every member except the sender. Does not persist.
    pub fn apply_edit(&self, path: &str, contents: &str, sender: &Identity, from: &str) {
        if path.is_empty() {
            tracing::warn!("room {}: dropped edit with empty path", self.room_id);
            return;
        }

        self.file_tree
            .write()
            .insert(path.to_string(), FileNode::new(contents));

        self.broadcast(
            &ServerMessage::FileUpdate {
                path: path.to_string(),
                contents: contents.to_string(),
                sender_email: sender.email.clone(),
            },
            Some(from),
        );
    }

    /// Remove the file at `path` if present and echo the delete to every
    /// member except the sender. Deletion is idempotent: a missing path
    /// is not an error, and the echo goes out either way so late peers
    /// converge.
    pub fn apply_delete(&self, path: &str, sender: &Identity, from: &str) {
        self.file_tree.write().remove(path);

        self.broadcast(
            &ServerMessage::FileDelete {
                path: path.to_string(),
                sender_email: sender.email.clone(),
            },
            Some(from),
        );
    }

    /// Shallow-merge an assistant-produced fragment into the tree.
    /// Fragment keys overwrite existing keys at the same path; unrelated
    /// paths are untouched. Returns how many entries were merged.
    pub fn merge_fragment(&self, fragment: FileTree) -> usize {
        let mut tree = self.file_tree.write();
        let mut merged = 0;
        for (path, node) in fragment {
            if path.trim().is_empty() {
                tracing::warn!(
                    "room {}: dropped fragment entry with empty path",
                    self.room_id
                );
                continue;
            }
            tree.insert(path, node);
            merged += 1;
        }
        merged
    }
}

/// Forward a client-supplied full-tree snapshot verbatim to the durable
/// store. This is a replace, not a merge.
pub async fn checkpoint(
    store: &dyn ProjectStore,
    project_id: &ProjectId,
    tree: &FileTree,
) -> Result<(), StoreError> {
    store.persist_file_tree(project_id, tree).await
}
