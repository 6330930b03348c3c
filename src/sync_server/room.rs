//! Room registry and broadcast routing
//!
//! A room is the set of live connections attached to one project; it is
//! the unit of broadcast isolation. Rooms are process-local and
//! ephemeral: created lazily on first join, evicted once the last member
//! leaves, and rebuilt from scratch after a restart.
//!
//! Delivery is at-most-once and best-effort. There is no acknowledgment,
//! no retry, and no buffering for members who join later; the durable
//! checkpoint is the source of truth for anyone who reconnects.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::store::{FileTree, ProjectId};
use crate::sync_server::protocol::ServerMessage;

/// Handle identifying one connection within a room.
pub type ConnectionId = String;

/// Outbound queue feeding one member's socket pump.
pub type MemberSender = mpsc::UnboundedSender<ServerMessage>;

pub fn next_connection_id() -> ConnectionId {
    format!(
        "conn_{}",
        uuid::Uuid::new_v4().to_string().split('-').next().unwrap()
    )
}

/// Live state for a single room.
///
/// Membership and the canonical file tree are guarded by room-scoped
/// locks; every mutation of either goes through this struct (or the
/// synchronizer operations in [`crate::sync_server::file_sync`]), which
/// serializes concurrent writers per room.
pub struct RoomContext {
    pub room_id: ProjectId,
    members: RwLock<HashMap<ConnectionId, MemberSender>>,
    pub(crate) file_tree: RwLock<FileTree>,
}

impl RoomContext {
    fn new(room_id: ProjectId, seed: FileTree) -> Self {
        Self {
            room_id,
            members: RwLock::new(HashMap::new()),
            file_tree: RwLock::new(seed),
        }
    }

    /// Add a member. Idempotent: re-joining replaces the outbound queue.
    pub fn join(&self, conn_id: ConnectionId, sender: MemberSender) {
        self.members.write().insert(conn_id, sender);
    }

    /// Remove a member, returning true if the room is now empty.
    pub fn leave(&self, conn_id: &str) -> bool {
        let mut members = self.members.write();
        members.remove(conn_id);
        members.is_empty()
    }

    pub fn member_count(&self) -> usize {
        self.members.read().len()
    }

    /// Deliver an event to every current member except `exclude`.
    ///
    /// A member whose queue is gone is mid-disconnect; the failed send is
    /// dropped, cleanup happens on their own connection task.
    pub fn broadcast(&self, message: &ServerMessage, exclude: Option<&str>) {
        let members = self.members.read();
        for (conn_id, sender) in members.iter() {
            if exclude == Some(conn_id.as_str()) {
                continue;
            }
            let _ = sender.send(message.clone());
        }
    }

    /// Clone the current canonical tree.
    pub fn snapshot_tree(&self) -> FileTree {
        self.file_tree.read().clone()
    }
}

/// Registry of all open rooms, keyed by project id.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<ProjectId, Arc<RoomContext>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, room_id: &ProjectId) -> Option<Arc<RoomContext>> {
        self.rooms.read().get(room_id).cloned()
    }

    /// Get the room for a project, creating it if this is the first
    /// member. `seed` supplies the stored file tree on creation.
    pub fn get_or_create(
        &self,
        room_id: &ProjectId,
        seed: impl FnOnce() -> FileTree,
    ) -> Arc<RoomContext> {
        let mut rooms = self.rooms.write();
        rooms
            .entry(room_id.clone())
            .or_insert_with(|| {
                tracing::info!("Creating room for project {}", room_id);
                Arc::new(RoomContext::new(room_id.clone(), seed()))
            })
            .clone()
    }

    /// Remove a member from a room, evicting the room once empty.
    pub fn leave(&self, room_id: &ProjectId, conn_id: &str) {
        let mut rooms = self.rooms.write();
        if let Some(room) = rooms.get(room_id) {
            if room.leave(conn_id) {
                tracing::info!("Evicting room {} (no members)", room_id);
                rooms.remove(room_id);
            }
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
