//! Node, endpoint and cluster data model
//!
//! Mirrors the controller's view of the mesh: a node is an addressable
//! device, each node exposes numbered endpoints, each endpoint exposes a
//! set of clusters, and each cluster holds indexed attributes. Attribute
//! values are kept as raw `serde_json::Value`s - interpreting them is the
//! bridge core's job, not the transport's.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::Value;

/// Stable numeric id of a mesh node
pub type NodeId = u64;
/// Id of a logical sub-device within a node
pub type EndpointId = u16;
/// Id of a capability group on an endpoint
pub type ClusterId = u32;
/// Index of an attribute within a cluster
pub type AttributeId = u32;

/// Well-known Matter cluster and attribute ids used by the bridge.
pub mod cluster {
    use super::{AttributeId, ClusterId};

    /// On/Off cluster
    pub const ON_OFF: ClusterId = 6;
    /// Level Control cluster (brightness, raw 0-254)
    pub const LEVEL_CONTROL: ClusterId = 8;
    /// Color Control cluster (color temperature in mireds)
    pub const COLOR_CONTROL: ClusterId = 768;

    /// Boolean State cluster (contact sensors)
    pub const BOOLEAN_STATE: ClusterId = 69;
    /// Illuminance Measurement cluster
    pub const ILLUMINANCE: ClusterId = 1024;
    /// Temperature Measurement cluster
    pub const TEMPERATURE: ClusterId = 1026;
    /// Pressure Measurement cluster
    pub const PRESSURE: ClusterId = 1027;
    /// Relative Humidity Measurement cluster
    pub const HUMIDITY: ClusterId = 1029;
    /// Occupancy Sensing cluster
    pub const OCCUPANCY: ClusterId = 1030;

    /// OnOff attribute of the On/Off cluster
    pub const ATTR_ON_OFF: AttributeId = 0;
    /// CurrentLevel attribute of the Level Control cluster
    pub const ATTR_CURRENT_LEVEL: AttributeId = 0;
    /// ColorTemperatureMireds attribute of the Color Control cluster
    pub const ATTR_COLOR_TEMPERATURE_MIREDS: AttributeId = 7;
}

/// A sensor capability extracted from an endpoint.
///
/// Readings are served raw; `scale` records the factor between the raw
/// value and its conventional unit (e.g. Matter reports temperature in
/// hundredths of a degree) for consumers that want to convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorCluster {
    pub cluster: ClusterId,
    pub name: &'static str,
    pub attribute: AttributeId,
    pub scale: i64,
}

/// Sensor clusters the bridge knows how to read, in a fixed order.
pub const SENSOR_CLUSTERS: &[SensorCluster] = &[
    SensorCluster { cluster: cluster::ILLUMINANCE, name: "illuminance", attribute: 0, scale: 1 },
    SensorCluster { cluster: cluster::TEMPERATURE, name: "temperature", attribute: 0, scale: 100 },
    SensorCluster { cluster: cluster::PRESSURE, name: "pressure", attribute: 0, scale: 10 },
    SensorCluster { cluster: cluster::HUMIDITY, name: "humidity", attribute: 0, scale: 100 },
    SensorCluster { cluster: cluster::OCCUPANCY, name: "occupancy", attribute: 0, scale: 1 },
    SensorCluster { cluster: cluster::BOOLEAN_STATE, name: "contact", attribute: 0, scale: 1 },
];

/// Look up a sensor cluster definition by cluster id.
pub fn sensor_cluster(id: ClusterId) -> Option<&'static SensorCluster> {
    SENSOR_CLUSTERS.iter().find(|s| s.cluster == id)
}

/// One logical sub-device within a node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Endpoint {
    /// Clusters present on this endpoint
    pub clusters: BTreeSet<ClusterId>,
    /// Attribute values keyed by (cluster, attribute)
    attributes: HashMap<(ClusterId, AttributeId), Value>,
}

impl Endpoint {
    /// Whether a cluster is present on this endpoint.
    pub fn has_cluster(&self, cluster: ClusterId) -> bool {
        self.clusters.contains(&cluster)
    }

    /// Raw value of an attribute, if the controller has reported it.
    pub fn attribute_value(&self, cluster: ClusterId, attribute: AttributeId) -> Option<&Value> {
        self.attributes.get(&(cluster, attribute))
    }

    /// Store an attribute value, marking its cluster as present.
    pub fn set_attribute(&mut self, cluster: ClusterId, attribute: AttributeId, value: Value) {
        self.clusters.insert(cluster);
        self.attributes.insert((cluster, attribute), value);
    }
}

/// An addressable device in the mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    pub node_id: NodeId,
    pub endpoints: BTreeMap<EndpointId, Endpoint>,
}

impl Node {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            endpoints: BTreeMap::new(),
        }
    }

    /// Raw value of an attribute on one of this node's endpoints.
    pub fn attribute_value(
        &self,
        endpoint: EndpointId,
        cluster: ClusterId,
        attribute: AttributeId,
    ) -> Option<&Value> {
        self.endpoints
            .get(&endpoint)?
            .attribute_value(cluster, attribute)
    }

    /// Store an attribute addressed by a controller path (`"ep/cluster/attr"`).
    ///
    /// Unparseable paths are ignored - the controller also publishes paths
    /// for clusters the bridge never reads.
    pub fn set_attribute_path(&mut self, path: &str, value: Value) {
        let Some((endpoint, cluster, attribute)) = parse_attribute_path(path) else {
            return;
        };
        self.endpoints
            .entry(endpoint)
            .or_default()
            .set_attribute(cluster, attribute, value);
    }

    /// Build a node from the controller's wire representation: a numeric id
    /// plus a flat `"ep/cluster/attr" -> value` attribute map.
    pub fn from_wire(node_id: NodeId, attributes: &serde_json::Map<String, Value>) -> Self {
        let mut node = Node::new(node_id);
        for (path, value) in attributes {
            node.set_attribute_path(path, value.clone());
        }
        node
    }
}

/// Split an `"endpoint/cluster/attribute"` path into its numeric parts.
fn parse_attribute_path(path: &str) -> Option<(EndpointId, ClusterId, AttributeId)> {
    let mut parts = path.splitn(3, '/');
    let endpoint = parts.next()?.parse().ok()?;
    let cluster = parts.next()?.parse().ok()?;
    let attribute = parts.next()?.parse().ok()?;
    Some((endpoint, cluster, attribute))
}

/// A typed command the bridge can issue to an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    On,
    Off,
    /// Move brightness to a raw level (1-254)
    MoveToLevel { level: u8 },
    /// Move color temperature to a raw mired value
    MoveToColorTemperature { mireds: u16 },
}

impl DeviceCommand {
    /// Cluster the command belongs to.
    pub fn cluster_id(&self) -> ClusterId {
        match self {
            DeviceCommand::On | DeviceCommand::Off => cluster::ON_OFF,
            DeviceCommand::MoveToLevel { .. } => cluster::LEVEL_CONTROL,
            DeviceCommand::MoveToColorTemperature { .. } => cluster::COLOR_CONTROL,
        }
    }

    /// Command name on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            DeviceCommand::On => "On",
            DeviceCommand::Off => "Off",
            DeviceCommand::MoveToLevel { .. } => "MoveToLevelWithOnOff",
            DeviceCommand::MoveToColorTemperature { .. } => "MoveToColorTemperature",
        }
    }

    /// Command payload on the wire.
    pub fn payload(&self) -> Value {
        match self {
            DeviceCommand::On | DeviceCommand::Off => serde_json::json!({}),
            DeviceCommand::MoveToLevel { level } => serde_json::json!({
                "level": level,
                "transitionTime": 0,
                "optionsMask": 0,
                "optionsOverride": 0,
            }),
            DeviceCommand::MoveToColorTemperature { mireds } => serde_json::json!({
                "colorTemperatureMireds": mireds,
                "transitionTime": 0,
                "optionsMask": 0,
                "optionsOverride": 0,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_attribute_path() {
        assert_eq!(parse_attribute_path("1/6/0"), Some((1, 6, 0)));
        assert_eq!(parse_attribute_path("2/768/7"), Some((2, 768, 7)));
        assert_eq!(parse_attribute_path("1/6"), None);
        assert_eq!(parse_attribute_path("a/6/0"), None);
    }

    #[test]
    fn test_from_wire_builds_endpoints() {
        let attrs = json!({
            "1/6/0": true,
            "1/8/0": 127,
            "2/1030/0": 1,
            "garbage": "ignored",
        });
        let node = Node::from_wire(5, attrs.as_object().unwrap());

        assert_eq!(node.endpoints.len(), 2);
        assert!(node.endpoints[&1].has_cluster(cluster::ON_OFF));
        assert!(node.endpoints[&1].has_cluster(cluster::LEVEL_CONTROL));
        assert_eq!(node.attribute_value(1, cluster::LEVEL_CONTROL, 0), Some(&json!(127)));
        assert_eq!(node.attribute_value(2, cluster::OCCUPANCY, 0), Some(&json!(1)));
        assert_eq!(node.attribute_value(3, cluster::ON_OFF, 0), None);
    }

    #[test]
    fn test_sensor_cluster_lookup() {
        let occ = sensor_cluster(cluster::OCCUPANCY).unwrap();
        assert_eq!(occ.name, "occupancy");
        assert_eq!(occ.scale, 1);
        assert!(sensor_cluster(9999).is_none());
    }

    #[test]
    fn test_command_wire_shape() {
        let cmd = DeviceCommand::MoveToLevel { level: 102 };
        assert_eq!(cmd.cluster_id(), cluster::LEVEL_CONTROL);
        assert_eq!(cmd.name(), "MoveToLevelWithOnOff");
        assert_eq!(cmd.payload()["level"], json!(102));

        assert_eq!(DeviceCommand::Off.cluster_id(), cluster::ON_OFF);
        assert_eq!(DeviceCommand::Off.payload(), json!({}));
    }
}
