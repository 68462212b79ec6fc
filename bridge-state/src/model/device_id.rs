//! Canonical device identifier

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use matter_client::{EndpointId, NodeId};

/// Canonical key for one device: a `(node, endpoint)` pair.
///
/// Rendered as `node{n}-ep{e}` (e.g. `node12-ep1`), which is the primary
/// key across all four persisted stores. The pairing is stable for the
/// lifetime of the commissioned device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId {
    pub node_id: NodeId,
    pub endpoint_id: EndpointId,
}

impl DeviceId {
    pub fn new(node_id: NodeId, endpoint_id: EndpointId) -> Self {
        Self {
            node_id,
            endpoint_id,
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node{}-ep{}", self.node_id, self.endpoint_id)
    }
}

impl FromStr for DeviceId {
    type Err = MalformedDeviceId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix("node").ok_or(MalformedDeviceId)?;
        let (node, endpoint) = rest.split_once("-ep").ok_or(MalformedDeviceId)?;
        Ok(Self {
            node_id: node.parse().map_err(|_| MalformedDeviceId)?,
            endpoint_id: endpoint.parse().map_err(|_| MalformedDeviceId)?,
        })
    }
}

/// The string does not decode to a node/endpoint pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MalformedDeviceId;

impl fmt::Display for MalformedDeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected an identifier of the form node<N>-ep<E>")
    }
}

impl std::error::Error for MalformedDeviceId {}

// Serialized as the canonical string so DeviceId works as a JSON map key.

impl Serialize for DeviceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DeviceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
