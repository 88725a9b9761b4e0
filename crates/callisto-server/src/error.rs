//! Error types for the Callisto server.

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Core engine error.
    #[error("core error: {0}")]
    Core(#[from] callisto_core::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Watch error.
    #[error("file watch error: {0}")]
    Watch(String),

    /// Invalid bind address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
