//! Error types for the notification store and push client.

use thiserror::Error;

/// Main error type for store and transport operations.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage directory is locked by another process")]
    Locked,

    #[error("Invalid push message: {0}")]
    InvalidMessage(String),

    #[error("Invalid bearer token: {0}")]
    InvalidToken(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for NotifyError {
    fn from(e: serde_json::Error) -> Self {
        NotifyError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for NotifyError {
    fn from(e: toml::de::Error) -> Self {
        NotifyError::Config(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for NotifyError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        NotifyError::Transport(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
