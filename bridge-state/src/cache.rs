//! State cache with rebuild and occupancy edge detection
//!
//! The cache owns the canonical snapshot of every device. Each mesh event
//! triggers a full rebuild: walk the client's current node tree, produce a
//! fresh snapshot, diff occupancy against the previous snapshot, stamp
//! rising edges into the history, then atomically replace the committed
//! snapshot. Readers only ever see a fully-formed snapshot - the previous
//! one is retained just long enough for the diff and never exposed.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

use bridge_store::DocumentStore;
use matter_client::{MeshClient, SENSOR_CLUSTERS};

use crate::history::OccupancyHistory;
use crate::model::{DeviceId, DeviceSnapshot, LightView, SensorView};

/// Cache of the last committed per-device snapshot.
pub struct StateCache {
    devices: RwLock<BTreeMap<DeviceId, DeviceSnapshot>>,
    store: DocumentStore<Vec<DeviceSnapshot>>,
}

impl StateCache {
    /// Hydrate the cache from its backing store, so reads served before
    /// the first rebuild reflect the last run's committed snapshot.
    pub fn open(store: DocumentStore<Vec<DeviceSnapshot>>) -> Self {
        let devices = store
            .load_or_default()
            .into_iter()
            .map(|snap| (snap.id, snap))
            .collect();
        Self {
            devices: RwLock::new(devices),
            store,
        }
    }

    /// Rebuild the snapshot from the mesh client's current node tree.
    ///
    /// Returns the devices whose occupancy rose on this rebuild. When the
    /// client is not connected this is a no-op, not an error - the cache
    /// simply stays at its prior value. The snapshot store is written on
    /// every rebuild; the history store only when at least one edge
    /// occurred. Store failures are logged and swallowed: in-memory
    /// correctness does not depend on disk success.
    pub fn rebuild(&self, client: &dyn MeshClient, history: &OccupancyHistory) -> Vec<DeviceId> {
        if !client.is_connected() {
            tracing::debug!("rebuild skipped: mesh not connected");
            return Vec::new();
        }

        let mut next = BTreeMap::new();
        for node in client.nodes() {
            for (endpoint_id, endpoint) in &node.endpoints {
                if let Some(snap) = DeviceSnapshot::from_endpoint(&node, *endpoint_id, endpoint) {
                    next.insert(snap.id, snap);
                }
            }
        }

        let now = epoch_seconds();
        let mut edges = Vec::new();
        {
            let mut devices = self.devices.write();
            for (id, snap) in &next {
                if snap.is_occupied() {
                    let was_occupied = devices.get(id).map(DeviceSnapshot::is_occupied).unwrap_or(false);
                    if !was_occupied {
                        history.record_edge(*id, now);
                        edges.push(*id);
                    }
                }
            }
            *devices = next;
        }

        if let Err(e) = self.persist() {
            tracing::error!("snapshot store write failed: {e}");
        }
        if !edges.is_empty() {
            tracing::info!("occupancy rising edges: {edges:?}");
            if let Err(e) = history.save() {
                tracing::error!("history store write failed: {e}");
            }
        }
        edges
    }

    /// The last committed snapshot. Never blocks on a rebuild; empty
    /// before the first one.
    pub fn snapshot(&self) -> Vec<DeviceSnapshot> {
        self.devices.read().values().cloned().collect()
    }

    /// One device's snapshot, if known.
    pub fn device(&self, id: &DeviceId) -> Option<DeviceSnapshot> {
        self.devices.read().get(id).cloned()
    }

    /// Derived lighting view of every device with an on/off cluster.
    pub fn light_view(&self) -> Vec<LightView> {
        self.devices
            .read()
            .values()
            .filter_map(LightView::from_snapshot)
            .collect()
    }

    /// Derived sensor readings for every device. Occupancy entries carry
    /// the last rising-edge timestamp from the history.
    pub fn sensor_view(&self, history: &OccupancyHistory) -> Vec<SensorView> {
        self.devices
            .read()
            .values()
            .flat_map(|snap| sensor_views_of(snap, history))
            .collect()
    }

    /// Sensor readings for one device. Empty when the device is unknown
    /// or carries no sensor clusters.
    pub fn sensor_view_for(&self, id: &DeviceId, history: &OccupancyHistory) -> Vec<SensorView> {
        self.devices
            .read()
            .get(id)
            .map(|snap| sensor_views_of(snap, history))
            .unwrap_or_default()
    }

    fn persist(&self) -> bridge_store::Result<()> {
        let devices: Vec<DeviceSnapshot> = self.devices.read().values().cloned().collect();
        self.store.save(&devices)
    }
}

fn sensor_views_of(snap: &DeviceSnapshot, history: &OccupancyHistory) -> Vec<SensorView> {
    SENSOR_CLUSTERS
        .iter()
        .filter_map(|sensor| {
            let raw = snap.state(sensor.name)?.as_i64()?;
            Some(SensorView {
                id: snap.id,
                name: sensor.name.to_string(),
                // Served raw; unit conversion is left to consumers.
                value: raw,
                last_active: (sensor.name == "occupancy")
                    .then(|| history.last_active(&snap.id))
                    .flatten(),
            })
        })
        .collect()
}

fn epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}


#[cfg(test)]
mod tests {
    use super::test_mesh::FakeMesh;
    use super::*;
    use crate::model::{STATE_LEVEL, STATE_ON_OFF};
    use serde_json::json;

    struct Fixture {
        _dir: tempfile::TempDir,
        cache: StateCache,
        history: OccupancyHistory,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let cache = StateCache::open(DocumentStore::open(dir.path().join("snapshot.json")));
        let history = OccupancyHistory::open(DocumentStore::open(dir.path().join("history.json")));
        Fixture {
            _dir: dir,
            cache,
            history,
        }
    }

    #[test]
    fn test_rebuild_one_entry_per_endpoint_with_present_keys_only() {
        let f = fixture();
        let mesh = FakeMesh::new();
        mesh.set_attribute("1/6/0", json!(true));
        mesh.set_attribute("1/8/0", json!(200));
        mesh.set_attribute("2/1026/0", json!(2150));

        f.cache.rebuild(&mesh, &f.history);
        let snaps = f.cache.snapshot();
        assert_eq!(snaps.len(), 2);

        let light = f.cache.device(&DeviceId::new(1, 1)).unwrap();
        assert_eq!(light.state(STATE_ON_OFF), Some(&json!(true)));
        assert_eq!(light.state(STATE_LEVEL), Some(&json!(200)));
        assert_eq!(light.states.len(), 2);

        let sensor = f.cache.device(&DeviceId::new(1, 2)).unwrap();
        assert_eq!(sensor.state("temperature"), Some(&json!(2150)));
        assert_eq!(sensor.states.len(), 1);
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let f = fixture();
        let mesh = FakeMesh::new();
        mesh.set_attribute("1/6/0", json!(true));
        mesh.set_attribute("1/1030/0", json!(1));

        let first = f.cache.rebuild(&mesh, &f.history);
        assert_eq!(first, vec![DeviceId::new(1, 1)]);
        let snapshot_a = f.cache.snapshot();

        let second = f.cache.rebuild(&mesh, &f.history);
        assert!(second.is_empty(), "unchanged mesh must yield zero edges");
        assert_eq!(f.cache.snapshot(), snapshot_a);
    }

    #[test]
    fn test_edge_detection_sequence() {
        let f = fixture();
        let mesh = FakeMesh::new();
        let id = DeviceId::new(1, 1);
        let mut edge_count = 0;

        for occupied in [0, 1, 1, 0, 1] {
            mesh.set_attribute("1/1030/0", json!(occupied));
            edge_count += f.cache.rebuild(&mesh, &f.history).len();
        }

        // Transitions 0->1 at indices 1 and 4; the repeated 1 re-stamps nothing.
        assert_eq!(edge_count, 2);
        assert!(f.history.last_active(&id).is_some());
    }

    #[test]
    fn test_new_device_already_occupied_is_an_edge() {
        let f = fixture();
        let mesh = FakeMesh::new();
        mesh.set_attribute("1/1030/0", json!(1));

        let edges = f.cache.rebuild(&mesh, &f.history);
        assert_eq!(edges, vec![DeviceId::new(1, 1)]);
    }

    #[test]
    fn test_rebuild_noop_when_disconnected() {
        let f = fixture();
        let mesh = FakeMesh::new();
        mesh.set_attribute("1/6/0", json!(true));
        f.cache.rebuild(&mesh, &f.history);
        assert_eq!(f.cache.snapshot().len(), 1);

        mesh.connected
            .store(false, std::sync::atomic::Ordering::SeqCst);
        mesh.set_attribute("1/6/0", json!(false));
        let edges = f.cache.rebuild(&mesh, &f.history);

        assert!(edges.is_empty());
        // Prior snapshot retained untouched.
        let snap = f.cache.device(&DeviceId::new(1, 1)).unwrap();
        assert_eq!(snap.state(STATE_ON_OFF), Some(&json!(true)));
    }

    #[test]
    fn test_device_vanishing_then_returning_occupied_restamps() {
        let f = fixture();
        let mesh = FakeMesh::new();

        mesh.set_attribute("1/1030/0", json!(1));
        assert_eq!(f.cache.rebuild(&mesh, &f.history).len(), 1);

        // Device drops out of the mesh entirely.
        mesh.nodes.lock().clear();
        assert!(f.cache.rebuild(&mesh, &f.history).is_empty());

        // Rejoins still occupied: prior value is absent, so this is a new edge.
        mesh.set_attribute("1/1030/0", json!(1));
        assert_eq!(f.cache.rebuild(&mesh, &f.history).len(), 1);
    }

    #[test]
    fn test_sensor_view_serves_raw_readings_and_last_active() {
        let f = fixture();
        let mesh = FakeMesh::new();
        mesh.set_attribute("1/1026/0", json!(2150));
        mesh.set_attribute("1/1030/0", json!(1));
        f.cache.rebuild(&mesh, &f.history);

        let views = f.cache.sensor_view(&f.history);
        assert_eq!(views.len(), 2);

        // Temperature comes back in hundredths of a degree, untouched.
        let temp = views.iter().find(|v| v.name == "temperature").unwrap();
        assert_eq!(temp.value, 2150);
        assert_eq!(temp.last_active, None);

        let occ = views.iter().find(|v| v.name == "occupancy").unwrap();
        assert_eq!(occ.value, 1);
        assert!(occ.last_active.is_some());
    }

    #[test]
    fn test_snapshot_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot_path = dir.path().join("snapshot.json");
        let history = OccupancyHistory::open(DocumentStore::open(dir.path().join("h.json")));

        {
            let cache = StateCache::open(DocumentStore::open(&snapshot_path));
            let mesh = FakeMesh::new();
            mesh.set_attribute("1/6/0", json!(true));
            cache.rebuild(&mesh, &history);
        }

        let reopened = StateCache::open(DocumentStore::open(&snapshot_path));
        assert_eq!(reopened.snapshot().len(), 1);
        assert!(reopened.device(&DeviceId::new(1, 1)).is_some());
    }
}
