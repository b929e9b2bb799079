//! Unified error taxonomy for all services of the mesh.

use thiserror::Error;

use crate::job::JobId;

/// Result type for mesh operations.
pub type MeshResult<T> = Result<T, MeshError>;

/// Errors raised across the dispatch and lifecycle engine.
#[derive(Debug, Error)]
pub enum MeshError {
    /// Rejected at the submission boundary; never persists.
    #[error("validation error: {0}")]
    Validation(String),

    /// Store or queue unavailable while submitting; surfaces as a 500.
    #[error("submission failed: {0}")]
    Submit(String),

    /// The status transition failed after a successful pop. The id is
    /// considered lost to the queue; recovery is operator-initiated.
    #[error("failed to claim job {id}: {reason}")]
    Claim { id: JobId, reason: String },

    /// The agent failed; drives the retry/DLQ state machine.
    #[error("agent execution failed: {0}")]
    Execution(String),

    /// The bus rejected an enqueue; retryable at the caller's discretion.
    #[error("queue unavailable: {0}")]
    TransientQueue(String),

    /// The bus dropped mid-fetch.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Clean shutdown signal observed during a blocking operation.
    #[error("operation canceled")]
    Canceled,

    /// Job store failure.
    #[error("store error: {0}")]
    Store(String),

    /// JSON encode/decode failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MeshError {
    /// Returns true when the error is the cooperative-shutdown signal.
    pub fn is_cancel(&self) -> bool {
        matches!(self, MeshError::Canceled)
    }

    /// Queue-side conditions a worker damps with a short pause-and-retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, MeshError::TransientQueue(_) | MeshError::Fetch(_))
    }

    /// HTTP status for boundary responses.
    pub fn status_code(&self) -> u16 {
        match self {
            MeshError::Validation(_) => 400,
            MeshError::Canceled => 499,
            _ => 500,
        }
    }
}
