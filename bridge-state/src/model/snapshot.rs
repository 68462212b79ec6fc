//! Raw per-device state snapshot

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use matter_client::{cluster, sensor_cluster, Endpoint, EndpointId, Node, NodeId};

use super::DeviceId;

/// State key for the raw on/off value
pub const STATE_ON_OFF: &str = "on_off";
/// State key for the raw 0-254 brightness level
pub const STATE_LEVEL: &str = "level";
/// State key for the raw color temperature in mireds
pub const STATE_COLOR_TEMPERATURE_MIREDS: &str = "color_temperature_mireds";

/// Normalized snapshot of one device.
///
/// `states` holds raw attribute values exactly as the mesh reported them;
/// derived values (normalized brightness, Kelvin) are computed on read.
/// A key is present only when the corresponding cluster exists on the
/// endpoint and the attribute has been reported - absence is absence,
/// never a sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub id: DeviceId,
    pub node_id: NodeId,
    pub endpoint_id: EndpointId,
    pub states: BTreeMap<String, Value>,
}

impl DeviceSnapshot {
    /// Extract a snapshot from one endpoint of a node.
    ///
    /// Returns `None` when the endpoint carries none of the clusters the
    /// bridge monitors (e.g. the node's root endpoint).
    pub fn from_endpoint(node: &Node, endpoint_id: EndpointId, endpoint: &Endpoint) -> Option<Self> {
        let mut states = BTreeMap::new();

        if endpoint.has_cluster(cluster::ON_OFF) {
            if let Some(v) = endpoint.attribute_value(cluster::ON_OFF, cluster::ATTR_ON_OFF) {
                states.insert(STATE_ON_OFF.to_string(), v.clone());
            }
        }
        if endpoint.has_cluster(cluster::LEVEL_CONTROL) {
            if let Some(v) =
                endpoint.attribute_value(cluster::LEVEL_CONTROL, cluster::ATTR_CURRENT_LEVEL)
            {
                states.insert(STATE_LEVEL.to_string(), v.clone());
            }
        }
        if endpoint.has_cluster(cluster::COLOR_CONTROL) {
            if let Some(v) = endpoint
                .attribute_value(cluster::COLOR_CONTROL, cluster::ATTR_COLOR_TEMPERATURE_MIREDS)
            {
                states.insert(STATE_COLOR_TEMPERATURE_MIREDS.to_string(), v.clone());
            }
        }
        for cluster_id in &endpoint.clusters {
            if let Some(sensor) = sensor_cluster(*cluster_id) {
                if let Some(v) = endpoint.attribute_value(sensor.cluster, sensor.attribute) {
                    states.insert(sensor.name.to_string(), v.clone());
                }
            }
        }

        if states.is_empty() {
            return None;
        }
        Some(Self {
            id: DeviceId::new(node.node_id, endpoint_id),
            node_id: node.node_id,
            endpoint_id,
            states,
        })
    }

    /// Raw value of one state key, if present.
    pub fn state(&self, key: &str) -> Option<&Value> {
        self.states.get(key)
    }

    /// Whether the occupancy reading is exactly 1 (occupied).
    ///
    /// Any other value - 0, another integer, a non-integer, or an absent
    /// key - counts as clear.
    pub fn is_occupied(&self) -> bool {
        self.states
            .get("occupancy")
            .and_then(Value::as_i64)
            .map(|v| v == 1)
            .unwrap_or(false)
    }
}
