//! Bridge state management
//!
//! The synchronous heart of the matter-bridge: turns the asynchronous,
//! event-driven mesh into a cheap, queryable snapshot.
//!
//! # Architecture
//!
//! ```text
//! change signal ──> ingest loop ──> StateCache.rebuild()
//!                                       │  walks MeshClient node tree
//!                                       │  diffs occupancy -> rising edges
//!                                       ├──> OccupancyHistory (stamp + save)
//!                                       ├──> snapshot store (save)
//!                                       └──> CallbackRegistry -> ActionExecutor
//! HTTP readers ───> last committed snapshot / derived views (never block)
//! ```
//!
//! Four stores persist across restarts: the device snapshot, the
//! occupancy history, the alias registry and the callback registry. Each
//! is an independent JSON document ([`bridge_store::DocumentStore`]); no
//! cross-store transaction is guaranteed, and none is needed - the
//! snapshot is always recomputed fresh from the mesh.

pub mod alias;
pub mod cache;
pub mod callback;
pub mod control;
pub mod error;
pub mod history;
pub mod ingest;
pub mod model;

pub use alias::AliasRegistry;
pub use cache::StateCache;
pub use callback::{ActionExecutor, CallbackRegistry, ProcessExecutor};
pub use control::resolve_and_send;
pub use error::{Error, Result};
pub use history::OccupancyHistory;
pub use ingest::{spawn_ingest_loop, IngestContext, IngestHandle};
pub use model::{DeviceId, DeviceSnapshot, LightView, SensorView};
