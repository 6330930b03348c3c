//! coedit-engine: real-time collaboration backend for shared projects
//!
//! This library implements the synchronization core of a collaborative
//! editor: authenticated WebSocket admission, per-project rooms with
//! best-effort broadcast, a canonical in-memory file tree with
//! last-received-wins convergence, and an assistant bridge that lets an
//! LLM propose file-tree changes from chat.
//!
//! The durable record store and the generation model are collaborators
//! behind traits ([`store::ProjectStore`], [`generate::Generator`]); the
//! daemon binary wires reference implementations into a
//! [`sync_server::ServerContext`] and serves connections with
//! [`sync_server::handle_connection`].

pub mod error;
pub mod generate;
pub mod session;
pub mod store;
pub mod sync_server;

// Re-export commonly used types
pub use error::{AdmissionError, GenerateError, ProtocolError, StoreError, VerifyError};
pub use session::{Identity, SessionVerifier};
pub use store::{FileNode, FileTree, Project, ProjectId, ProjectStore};
