//! Error types for braid-chat

use thiserror::Error;

/// Result type alias using braid-chat Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the conversation core
#[derive(Error, Debug)]
pub enum Error {
    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
