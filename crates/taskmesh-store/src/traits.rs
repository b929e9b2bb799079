//! Job store abstraction.

use async_trait::async_trait;
use chrono::Duration;
use taskmesh_core::{Job, JobId, JobStatus, MeshResult};

/// Durable record-of-truth for jobs.
///
/// Implementations must keep `updated_at` non-decreasing across transitions
/// for a given id.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts the authoritative row. Must complete before the id appears
    /// on any queue.
    async fn insert_job(&self, job: &Job) -> MeshResult<()>;

    /// Transitions the stored status, stamping `updated_at`. Errors when no
    /// row matched the id.
    async fn update_status(&self, id: &JobId, status: JobStatus) -> MeshResult<()>;

    /// Reads a job by id.
    async fn fetch_job(&self, id: &JobId) -> MeshResult<Option<Job>>;

    /// Bumps `retry_count` by one and returns the new value.
    async fn increment_retry(&self, id: &JobId) -> MeshResult<i32>;

    /// Jobs stuck in `running` whose last transition is older than the
    /// threshold. Extension point for an operator-driven reaper sweep.
    async fn list_stale_running(&self, older_than: Duration) -> MeshResult<Vec<Job>>;

    /// Round-trips the connection.
    async fn health_check(&self) -> MeshResult<()>;
}
