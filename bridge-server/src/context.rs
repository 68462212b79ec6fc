//! Application context: every collaborator, explicitly constructed
//!
//! There are no process globals. The context is built once at startup -
//! hydrating all four stores from the storage directory - and handed to
//! the HTTP filters and the ingestion loop. Teardown is ordered by the
//! binary, not by drop order.

use std::path::Path;
use std::sync::Arc;

use bridge_state::{
    ActionExecutor, AliasRegistry, CallbackRegistry, IngestContext, OccupancyHistory, StateCache,
};
use bridge_store::DocumentStore;
use matter_client::MeshClient;

/// Shared state behind every HTTP handler.
pub struct AppContext {
    pub client: Arc<dyn MeshClient>,
    pub cache: Arc<StateCache>,
    pub history: Arc<OccupancyHistory>,
    pub aliases: Arc<AliasRegistry>,
    pub callbacks: Arc<CallbackRegistry>,
    pub executor: Arc<dyn ActionExecutor>,
}

impl AppContext {
    /// Hydrate all four stores from `storage_dir` and assemble the
    /// context around the given client and executor.
    pub fn hydrate(
        storage_dir: &Path,
        client: Arc<dyn MeshClient>,
        executor: Arc<dyn ActionExecutor>,
    ) -> Self {
        Self {
            client,
            cache: Arc::new(StateCache::open(DocumentStore::open(
                storage_dir.join("snapshot.json"),
            ))),
            history: Arc::new(OccupancyHistory::open(DocumentStore::open(
                storage_dir.join("occupancy_history.json"),
            ))),
            aliases: Arc::new(AliasRegistry::open(DocumentStore::open(
                storage_dir.join("aliases.json"),
            ))),
            callbacks: Arc::new(CallbackRegistry::open(DocumentStore::open(
                storage_dir.join("callbacks.json"),
            ))),
            executor,
        }
    }

    /// The subset of collaborators the ingestion loop needs.
    pub fn ingest_context(&self) -> IngestContext {
        IngestContext {
            client: self.client.clone(),
            cache: self.cache.clone(),
            history: self.history.clone(),
            callbacks: self.callbacks.clone(),
            executor: self.executor.clone(),
        }
    }
}
