//! Server context
//!
//! One [`ServerContext`] is constructed at startup and shared by
//! reference with every connection task. All room and connection state
//! hangs off it; tests build a fresh context each, so nothing leaks
//! between them and nothing is process-global.

use std::sync::Arc;
use std::time::Duration;

use crate::generate::Generator;
use crate::session::SessionVerifier;
use crate::store::ProjectStore;
use crate::sync_server::room::RoomRegistry;
use crate::sync_server::scheduler::CheckpointScheduler;

/// Tunables for the sync core.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Bound on a single generation call. Nothing upstream specifies
    /// one, so the daemon enforces its own to keep worst-case assistant
    /// latency finite.
    pub generation_timeout: Duration,
    /// Debounce before an assistant-triggered durable checkpoint.
    pub checkpoint_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            generation_timeout: Duration::from_secs(30),
            checkpoint_delay: Duration::from_millis(2000),
        }
    }
}

/// Everything a connection handler needs, built once in main.
pub struct ServerContext {
    pub registry: RoomRegistry,
    pub store: Arc<dyn ProjectStore>,
    pub verifier: SessionVerifier,
    pub generator: Arc<dyn Generator>,
    pub scheduler: CheckpointScheduler,
    pub config: SyncConfig,
}

impl ServerContext {
    pub fn new(
        store: Arc<dyn ProjectStore>,
        verifier: SessionVerifier,
        generator: Arc<dyn Generator>,
        config: SyncConfig,
    ) -> Self {
        let scheduler = CheckpointScheduler::new(Arc::clone(&store), config.checkpoint_delay);
        Self {
            registry: RoomRegistry::new(),
            store,
            verifier,
            generator,
            scheduler,
            config,
        }
    }
}
