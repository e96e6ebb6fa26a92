//! Error types for the status manager.

/// Errors produced by [`JobStatusManager`](crate::JobStatusManager) and
/// summary persistence.
#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("job status manager already initialized")]
    AlreadyInitialized,

    #[error("job status manager not initialized")]
    NotInitialized,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
