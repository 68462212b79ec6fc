//! Occupancy rising-edge history
//!
//! Devices do not retain history themselves, so the timestamp of the last
//! rising edge is derived state the bridge must persist: it cannot be
//! recomputed from raw device state after a restart.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use bridge_store::DocumentStore;

use crate::model::DeviceId;

/// Edge-triggered timestamp log keyed by canonical device id.
///
/// Only the state cache stamps entries, and only on a detected rising
/// edge; everyone else reads. Persisted as a flat `id -> epoch seconds`
/// JSON map.
pub struct OccupancyHistory {
    entries: RwLock<BTreeMap<DeviceId, u64>>,
    store: DocumentStore<BTreeMap<DeviceId, u64>>,
}

impl OccupancyHistory {
    /// Hydrate the history from its backing store.
    pub fn open(store: DocumentStore<BTreeMap<DeviceId, u64>>) -> Self {
        let entries = store.load_or_default();
        Self {
            entries: RwLock::new(entries),
            store,
        }
    }

    /// Stamp a rising edge. Does not persist; the cache batches one save
    /// per rebuild that produced at least one edge.
    pub fn record_edge(&self, id: DeviceId, timestamp: u64) {
        self.entries.write().insert(id, timestamp);
    }

    /// Epoch seconds of the last rising edge for a device, if any.
    pub fn last_active(&self, id: &DeviceId) -> Option<u64> {
        self.entries.read().get(id).copied()
    }

    /// Write the current history to disk.
    pub fn save(&self) -> bridge_store::Result<()> {
        let entries = self.entries.read().clone();
        self.store.save(&entries)
    }
}
