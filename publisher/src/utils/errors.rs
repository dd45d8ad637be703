//! Custom error types for the publisher.

use deploy_core::{ErrorKind, WalkError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Walk(#[from] WalkError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication rejected by server")]
    Authentication,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("{operation} failed for {site}: {message}")]
    Remote {
        operation: String,
        kind: ErrorKind,
        site: String,
        path: Option<String>,
        message: String,
    },

    #[error("Connection closed by server")]
    ConnectionClosed,

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Diff task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, PublishError>;
