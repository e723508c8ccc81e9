//! Error types for the audit crate.

use thiserror::Error;

/// Errors that can occur while recording or querying audit entries.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Storage backend failure.
    #[error("audit storage error: {0}")]
    Storage(String),

    /// Serialization failure.
    #[error("audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database failure.
    #[error("audit database error: {0}")]
    Database(#[from] sqlx::Error),
}
