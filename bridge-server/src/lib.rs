//! HTTP bridge server over a Matter device mesh
//!
//! Thin translation layer: HTTP requests in, cache operations out. All
//! state lives in [`bridge_state`]; this crate wires an explicitly
//! constructed [`context::AppContext`] into warp filters and owns process
//! bootstrap and ordered teardown.

pub mod context;
pub mod logging;
pub mod routes;

pub use context::AppContext;
