//! Error types for callisto-core.

use thiserror::Error;

/// Result type for callisto-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in callisto-core.
#[derive(Debug, Error)]
pub enum Error {
    /// Cell was submitted with a language tag the engine does not know.
    #[error("unknown language: {0}")]
    UnknownLanguage(String),

    /// Module id does not match the cell id grammar.
    #[error("invalid module id: {0}")]
    InvalidModuleId(String),

    /// Source rewriting failed.
    #[error("rewrite error: {0}")]
    Rewrite(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
