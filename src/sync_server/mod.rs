//! Coedit Sync Server
//!
//! The real-time synchronization core: room-scoped broadcast over
//! WebSocket, a canonical per-room file tree, and the assistant bridge.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 COEDIT SYNC SERVER (coedit-daemon)              │
//! │              Single daemon, multi-room, multi-client            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ServerContext (Arc, built once at startup)                     │
//! │    ├── RoomRegistry                                             │
//! │    │     project_id ──► RoomContext {                           │
//! │    │                      members: conn_id -> outbound queue,   │
//! │    │                      file_tree (canonical, in-memory)      │
//! │    │                    }                                       │
//! │    ├── ProjectStore  (durable records, external)                │
//! │    ├── SessionVerifier                                          │
//! │    ├── Generator     (assistant model, external)                │
//! │    └── CheckpointScheduler (debounced durable writes)           │
//! │                                                                 │
//! │  WebSocket upgrade ──► gateway::admit ──► join room             │
//! │    - file-update / file-delete  ──► file_sync, echo to peers    │
//! │    - chat-message               ──► assistant bridge            │
//! │    - checkpoint                 ──► store (verbatim replace)    │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol
//!
//! All messages are JSON over WebSocket:
//!
//! ```json
//! // Client -> Server
//! {"type": "file-update", "path": "a.js", "contents": "x = 1"}
//! {"type": "file-delete", "path": "a.js"}
//! {"type": "chat-message", "body": "@ai make an http server"}
//! {"type": "checkpoint", "fileTree": {"a.js": {"contents": "x = 1"}}}
//!
//! // Server -> Client
//! {"type": "file-update", "path": "a.js", "contents": "x = 1", "senderEmail": "..."}
//! {"type": "chat-broadcast", "body": "...", "sender": {"userId": "...", "email": "..."}}
//! {"type": "assistant-reply", "result": "...", "sender": "assistant"}
//! ```

pub mod assistant;
pub mod connection;
pub mod context;
pub mod file_sync;
pub mod gateway;
pub mod protocol;
pub mod room;
pub mod scheduler;

pub use connection::handle_connection;
pub use context::{ServerContext, SyncConfig};
pub use gateway::{admit, Admission, Handshake};
pub use protocol::{ClientMessage, ServerMessage};
pub use room::{RoomContext, RoomRegistry};
pub use scheduler::CheckpointScheduler;
