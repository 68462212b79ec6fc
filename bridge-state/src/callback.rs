//! Callback registry and pluggable action execution
//!
//! The registry maps a device to one external action reference (a script
//! path) and decides *whether* a device has an action - invocation itself
//! goes through the [`ActionExecutor`] seam, with process spawning as the
//! production implementation. A dispatch failure is logged, never raised
//! into the rebuild that triggered it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;

use bridge_store::DocumentStore;

use crate::error::{Error, Result};
use crate::model::DeviceId;

/// Mapping from device id to a registered action script.
///
/// One active registration per device; re-registration overwrites.
pub struct CallbackRegistry {
    callbacks: RwLock<BTreeMap<DeviceId, PathBuf>>,
    store: DocumentStore<BTreeMap<DeviceId, PathBuf>>,
}

impl CallbackRegistry {
    /// Hydrate the registry from its backing store.
    pub fn open(store: DocumentStore<BTreeMap<DeviceId, PathBuf>>) -> Self {
        let callbacks = store.load_or_default();
        Self {
            callbacks: RwLock::new(callbacks),
            store,
        }
    }

    /// Register an action for a device, replacing any previous one.
    ///
    /// The reference is validated at write time: a path that does not
    /// exist is rejected with [`Error::InvalidReference`]. The target may
    /// still disappear before dispatch; that failure surfaces at dispatch
    /// time as a logged error.
    pub fn register(&self, id: DeviceId, action: PathBuf) -> Result<()> {
        if !action.exists() {
            return Err(Error::InvalidReference(action));
        }

        let mut callbacks = self.callbacks.write();
        callbacks.insert(id, action);
        if let Err(e) = self.store.save(&callbacks) {
            tracing::error!("callback store write failed: {e}");
        }
        Ok(())
    }

    /// The registered action for a device, if any.
    pub fn lookup(&self, id: &DeviceId) -> Option<PathBuf> {
        self.callbacks.read().get(id).cloned()
    }
}

/// Executes a registered action for a device.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Run the action. The device id is passed so the action can tell
    /// which device fired it.
    async fn execute(&self, action: &Path, device: DeviceId) -> std::result::Result<(), String>;
}

/// Production executor: spawns the action as a child process with the
/// device id as its single argument and waits for it to exit.
pub struct ProcessExecutor;

#[async_trait]
impl ActionExecutor for ProcessExecutor {
    async fn execute(&self, action: &Path, device: DeviceId) -> std::result::Result<(), String> {
        let status = tokio::process::Command::new(action)
            .arg(device.to_string())
            .status()
            .await
            .map_err(|e| format!("failed to spawn {}: {e}", action.display()))?;

        if status.success() {
            Ok(())
        } else {
            Err(format!("{} exited with {status}", action.display()))
        }
    }
}
