//! Error types for bridge state operations

use std::path::PathBuf;

use thiserror::Error;

use crate::model::DeviceId;

/// Result type for bridge state operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the bridge core
#[derive(Debug, Error)]
pub enum Error {
    /// The mesh connection is not yet established. Only command-issuing
    /// operations report this; reads serve the last committed snapshot.
    #[error("mesh connection not established")]
    NotReady,

    /// No device or sensor matches the given identifier
    #[error("unknown device: {0}")]
    NotFound(String),

    /// The alias name is already owned by another device
    #[error("alias {name:?} is already assigned to {owner}")]
    Conflict { name: String, owner: DeviceId },

    /// The callback target does not exist on disk
    #[error("callback target does not exist: {}", .0.display())]
    InvalidReference(PathBuf),

    /// The identifier does not decode to a node/endpoint pair
    #[error("malformed device identifier: {0:?}")]
    MalformedIdentifier(String),

    /// The mesh reported a command failure; the message is passed through
    /// verbatim since the bridge cannot interpret protocol-level faults.
    #[error("mesh command failed: {0}")]
    Mesh(String),

    /// A store write failed. Mutation sites log this and keep the
    /// in-memory result; it never fails the caller's logical operation.
    #[error(transparent)]
    Persistence(#[from] bridge_store::StoreError),
}

impl From<matter_client::ClientError> for Error {
    fn from(err: matter_client::ClientError) -> Self {
        match err {
            matter_client::ClientError::NotConnected => Error::NotReady,
            other => Error::Mesh(other.to_string()),
        }
    }
}
