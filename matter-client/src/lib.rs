//! Thin client boundary for the Matter controller
//!
//! The bridge does not speak the Matter mesh protocol itself. It supervises
//! an external controller process (the `matter_server` reference controller)
//! and talks to it over a small JSON-over-WebSocket API. This crate holds
//! everything on that boundary:
//!
//! - the node/endpoint/cluster data model and cluster constants
//! - the [`MeshClient`] trait the bridge core is written against
//! - [`WsClient`], the WebSocket implementation of that trait
//! - [`ControllerProcess`], the subprocess supervisor
//!
//! # Architecture
//!
//! ```text
//! ControllerProcess ── spawns ──> matter controller (subprocess)
//!                                        │ ws
//! WsClient ── start_listening ───────────┘
//!     ├── node cache (queried synchronously by the bridge)
//!     └── change signal (one "something changed" broadcast per update)
//! ```

pub mod client;
pub mod controller;
pub mod error;
pub mod model;
pub mod ws;

pub use client::MeshClient;
pub use controller::{ControllerConfig, ControllerProcess};
pub use error::{ClientError, Result};
pub use model::{
    cluster, sensor_cluster, AttributeId, ClusterId, DeviceCommand, Endpoint, EndpointId, Node,
    NodeId, SensorCluster, SENSOR_CLUSTERS,
};
pub use ws::{WsClient, WsConfig};
