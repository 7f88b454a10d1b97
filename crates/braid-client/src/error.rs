//! Error types for braid-client

use thiserror::Error;

/// Result type alias using braid-client Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a chat session
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the conversation core
    #[error(transparent)]
    Chat(#[from] braid_chat::Error),

    /// Websocket transport failed
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request to the model registry failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Could not establish the session connection
    #[error("connection failed after {attempts} attempts: {message}")]
    Connect { attempts: u32, message: String },

    /// The connection closed while an event was expected
    #[error("connection closed")]
    Closed,

    /// A generation command is already outstanding
    #[error("a generation request is already outstanding")]
    Busy,

    /// The backend reported a failure
    #[error("backend error: {0}")]
    Backend(String),

    /// The backend broke the protocol contract
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The registry rejected a request
    #[error("registry error: {0}")]
    Registry(String),
}
