//! Project records and the persistence collaborator interface
//!
//! The engine never creates or deletes projects; it reads one record at
//! admission time and replaces its file tree at checkpoints. The durable
//! record store lives behind [`ProjectStore`]; [`MemoryStore`] is the
//! in-process reference implementation used by the daemon's seed mode and
//! by tests.

use std::collections::{HashMap, HashSet};
use std::fmt;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Well-formed project identifier: 24 hex characters (ObjectId shape).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    /// Parse an identifier, rejecting anything that is not 24 hex chars.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.len() == 24 && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(raw.to_ascii_lowercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single file in a project tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    pub contents: String,
}

impl FileNode {
    pub fn new(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
        }
    }
}

/// Mapping from path to file. Key order is irrelevant; deletion removes
/// the key entirely (no tombstones). Every key is a non-empty string.
pub type FileTree = HashMap<String, FileNode>;

/// A stored project record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    #[serde(default)]
    pub file_tree: FileTree,
    #[serde(default)]
    pub member_ids: HashSet<String>,
}

/// Durable storage for project records.
///
/// `persist_file_tree` is a replace, not a merge: the supplied snapshot
/// becomes the stored tree verbatim.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn lookup_project(&self, id: &ProjectId) -> Option<Project>;

    async fn persist_file_tree(
        &self,
        id: &ProjectId,
        tree: &FileTree,
    ) -> Result<(), StoreError>;
}

/// In-memory project store.
#[derive(Default)]
pub struct MemoryStore {
    projects: RwLock<HashMap<ProjectId, Project>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, project: Project) {
        self.projects.write().insert(project.id.clone(), project);
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn lookup_project(&self, id: &ProjectId) -> Option<Project> {
        self.projects.read().get(id).cloned()
    }

    async fn persist_file_tree(
        &self,
        id: &ProjectId,
        tree: &FileTree,
    ) -> Result<(), StoreError> {
        let mut projects = self.projects.write();
        let project = projects
            .get_mut(id)
            .ok_or_else(|| StoreError::WriteFailed(format!("unknown project {id}")))?;
        project.file_tree = tree.clone();
        Ok(())
    }
}
