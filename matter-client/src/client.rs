//! The `MeshClient` trait - the seam between the bridge core and transport
//!
//! The bridge core only needs four things from the mesh: whether a session
//! is up, the current node tree, a way to issue commands, and commissioning.
//! Event delivery is deliberately not part of the trait - the transport
//! exposes a single "something changed" signal (see [`crate::ws::WsClient`])
//! and the ingestion loop consumes it directly, so the core never sees a
//! transport-specific event enum.

use std::net::IpAddr;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{DeviceCommand, EndpointId, Node, NodeId};

/// Client-side view of the Matter controller.
#[async_trait]
pub trait MeshClient: Send + Sync {
    /// Whether a controller session is currently established.
    fn is_connected(&self) -> bool;

    /// The controller's current node tree. Cheap, non-blocking, and empty
    /// until the first listen result arrives.
    fn nodes(&self) -> Vec<Node>;

    /// Issue a cluster command to one endpoint.
    async fn send_device_command(
        &self,
        node: NodeId,
        endpoint: EndpointId,
        command: DeviceCommand,
    ) -> Result<()>;

    /// Commission a new device with a pairing code, optionally addressing
    /// it directly on the local network.
    async fn commission(&self, code: &str, ip: Option<IpAddr>) -> Result<()>;
}
