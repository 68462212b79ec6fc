//! Event ingestion loop
//!
//! Single consumer of the mesh client's change signal. Every notification
//! triggers one synchronous rebuild before the next is accepted, so
//! rebuilds never overlap - a burst of N events is N sequential rebuilds.
//! No coalescing is done; rebuilds are idempotent and cheap at home
//! scale, and coalescing can be added here without changing any external
//! contract. Callback dispatch for rising edges is fired into detached
//! tasks so a slow or broken script can never delay the next rebuild.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use matter_client::MeshClient;

use crate::cache::StateCache;
use crate::callback::{ActionExecutor, CallbackRegistry};
use crate::history::OccupancyHistory;
use crate::model::DeviceId;

/// Handle to the running ingestion loop.
pub struct IngestHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl IngestHandle {
    /// Stop ingesting and wait for the loop to finish. Rebuilds already
    /// in progress complete first.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}

/// Shared collaborators the loop needs on every rebuild.
pub struct IngestContext {
    pub client: Arc<dyn MeshClient>,
    pub cache: Arc<StateCache>,
    pub history: Arc<OccupancyHistory>,
    pub callbacks: Arc<CallbackRegistry>,
    pub executor: Arc<dyn ActionExecutor>,
}

impl IngestContext {
    /// One rebuild plus dispatch for any rising edges. Also used at
    /// startup for the initial rebuild.
    pub fn rebuild_and_dispatch(&self) {
        let edges = self.cache.rebuild(self.client.as_ref(), &self.history);
        for id in edges {
            self.dispatch(id);
        }
    }

    fn dispatch(&self, id: DeviceId) {
        let Some(action) = self.callbacks.lookup(&id) else {
            return;
        };
        let executor = self.executor.clone();
        tokio::spawn(async move {
            tracing::info!("dispatching callback {} for {id}", action.display());
            if let Err(e) = executor.execute(&action, id).await {
                // A failed or vanished action never fails the rebuild.
                tracing::error!("callback for {id} failed: {e}");
            }
        });
    }
}

/// Spawn the ingestion loop over the client's change signal.
pub fn spawn_ingest_loop(
    ctx: IngestContext,
    mut changed: broadcast::Receiver<()>,
) -> IngestHandle {
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    let task = tokio::spawn(async move {
        tracing::info!("ingestion loop started");
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("ingestion loop shutting down");
                    break;
                }
                changed = changed.recv() => {
                    match changed {
                        Ok(()) => ctx.rebuild_and_dispatch(),
                        // Missed signals collapse into one rebuild - the
                        // rebuild reads current mesh state anyway.
                        Err(broadcast::error::RecvError::Lagged(_)) => ctx.rebuild_and_dispatch(),
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::info!("change signal closed, ingestion loop ending");
                            break;
                        }
                    }
                }
            }
        }
    });

    IngestHandle { shutdown_tx, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::test_mesh::FakeMesh;
    use crate::callback::test_support::RecordingExecutor;
    use bridge_store::DocumentStore;
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        _dir: tempfile::TempDir,
        mesh: Arc<FakeMesh>,
        ctx: IngestContext,
        calls: Arc<parking_lot::Mutex<Vec<(std::path::PathBuf, DeviceId)>>>,
        script: std::path::PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mesh = Arc::new(FakeMesh::new());
        let executor = RecordingExecutor::new();
        let calls = executor.calls.clone();

        let script = dir.path().join("on_motion.sh");
        std::fs::write(&script, "").unwrap();

        let ctx = IngestContext {
            client: mesh.clone(),
            cache: Arc::new(StateCache::open(DocumentStore::open(
                dir.path().join("snapshot.json"),
            ))),
            history: Arc::new(OccupancyHistory::open(DocumentStore::open(
                dir.path().join("history.json"),
            ))),
            callbacks: Arc::new(CallbackRegistry::open(DocumentStore::open(
                dir.path().join("callbacks.json"),
            ))),
            executor: Arc::new(executor),
        };

        Fixture {
            _dir: dir,
            mesh,
            ctx,
            calls,
            script,
        }
    }

    #[tokio::test]
    async fn test_edge_dispatches_registered_callback_once() {
        let f = fixture();
        let id = DeviceId::new(1, 1);
        f.ctx.callbacks.register(id, f.script.clone()).unwrap();

        f.mesh.set_attribute("1/1030/0", json!(1));
        f.ctx.rebuild_and_dispatch();
        // Still occupied: no new edge, no second dispatch.
        f.ctx.rebuild_and_dispatch();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let calls = f.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], (f.script.clone(), id));
    }

    #[tokio::test]
    async fn test_edge_without_registration_dispatches_nothing() {
        let f = fixture();
        f.mesh.set_attribute("1/1030/0", json!(1));
        f.ctx.rebuild_and_dispatch();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(f.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_loop_rebuilds_on_signal_and_shuts_down() {
        let f = fixture();
        let (changed_tx, changed_rx) = broadcast::channel(8);
        let cache = f.ctx.cache.clone();

        f.mesh.set_attribute("1/6/0", json!(true));
        let handle = spawn_ingest_loop(f.ctx, changed_rx);

        changed_tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.snapshot().len(), 1);

        handle.shutdown().await;
    }
}
