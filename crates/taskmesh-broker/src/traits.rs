//! Broker abstraction.

use async_trait::async_trait;
use futures::stream::BoxStream;
use taskmesh_core::{HealthSample, Job, JobId, JobStatus, MeshResult};
use tokio_util::sync::CancellationToken;

/// Lazy, potentially unbounded sequence of raw channel payloads. The
/// caller owns the subscription and closes it by dropping the stream.
pub type ByteStream = BoxStream<'static, Vec<u8>>;

/// Queue adapter and notification fabric.
///
/// Publication methods are not on the correctness path for job state;
/// callers log their failures and continue.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Routes the id to its priority tier. Head-push semantics paired with
    /// a tail-pop fetch yield FIFO order within a tier.
    async fn enqueue(&self, id: &JobId, priority: i32) -> MeshResult<()>;

    /// Blocks until any tier list is non-empty, scanning high to low, then
    /// claims the popped job: the stored status transitions to `running`
    /// and the `running` update is published before the id is returned.
    ///
    /// Returns `Canceled` when the token fires, `Claim` when the store
    /// transition fails (the id is then lost to the queue), `Fetch` on bus
    /// failure.
    async fn fetch(&self, cancel: &CancellationToken) -> MeshResult<JobId>;

    /// Appends the id to the dead-letter list. Duplicate appends violate
    /// the at-most-one-list invariant; the lifecycle engine guards them.
    async fn add_to_dlq(&self, id: &JobId) -> MeshResult<()>;

    /// Publishes a compact status-transition envelope.
    async fn publish_task_update(&self, id: &JobId, status: JobStatus) -> MeshResult<()>;

    /// Publishes the full job object.
    async fn publish_task_event(&self, job: &Job) -> MeshResult<()>;

    /// Publishes a worker health sample.
    async fn publish_health(&self, sample: &HealthSample) -> MeshResult<()>;

    async fn subscribe_task_updates(&self) -> MeshResult<ByteStream>;

    async fn subscribe_system_health(&self) -> MeshResult<ByteStream>;

    /// Round-trips the bus connection.
    async fn health_check(&self) -> MeshResult<()>;
}
