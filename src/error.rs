//! Error types for story-session

use thiserror::Error;

/// Errors that can occur while driving a story session
#[derive(Debug, Error)]
pub enum SessionError {
    /// Transport could not be opened
    #[error("Connection error: {0}")]
    Connection(String),

    /// Outbound frame could not be written
    #[error("Failed to send {frame} frame: {reason}")]
    Send {
        frame: String,
        reason: String,
    },

    /// Credential missing or token provider failure
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Command issued without an open, authenticated connection
    #[error("Not connected")]
    NotConnected,

    /// Inbound frame that does not match the wire protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
