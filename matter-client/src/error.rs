//! Error types for the Matter client boundary

use thiserror::Error;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur talking to the Matter controller
#[derive(Debug, Error)]
pub enum ClientError {
    /// No WebSocket session is established
    #[error("not connected to the Matter controller")]
    NotConnected,

    /// Connection could not be established within the retry budget
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    /// The WebSocket URL is not valid
    #[error("invalid controller URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Transport-level failure on an established session
    #[error("transport error: {0}")]
    Transport(String),

    /// The controller rejected a command
    #[error("controller error {code}: {message}")]
    Command { code: i64, message: String },

    /// The controller did not answer a request in time
    #[error("timed out waiting for controller response")]
    Timeout,

    /// A message from the controller could not be decoded
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The controller subprocess could not be spawned or managed
    #[error("controller process error: {0}")]
    Process(#[from] std::io::Error),
}
