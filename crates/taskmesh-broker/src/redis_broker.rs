//! Redis broker implementation.

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use futures::StreamExt;
use std::sync::Arc;
use taskmesh_core::{
    HealthSample, Job, JobId, JobStatus, MeshError, MeshResult, StatusUpdate, Tier,
    CHANNEL_SYSTEM_HEALTH, CHANNEL_TASK_UPDATES, QUEUE_DEAD_LETTER,
};
use taskmesh_store::JobStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::traits::{Broker, ByteStream};

/// Redis-backed broker.
///
/// Holds the job store as an injected capability: it is needed only to
/// perform the claim transition inside `fetch`.
pub struct RedisBroker {
    pool: Pool,
    client: redis::Client,
    store: Arc<dyn JobStore>,
}

impl RedisBroker {
    /// Connects to Redis and verifies the connection.
    pub async fn connect(addr: &str, store: Arc<dyn JobStore>) -> MeshResult<Self> {
        let url = normalize_url(addr);
        info!(addr = %url, "Creating Redis connection pool...");

        let client = redis::Client::open(url.as_str())
            .map_err(|e| MeshError::TransientQueue(format!("invalid Redis address: {e}")))?;

        let pool = Config::from_url(url)
            .builder()
            .map_err(|e| MeshError::TransientQueue(format!("invalid Redis config: {e}")))?
            .max_size(16)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| MeshError::TransientQueue(format!("failed to create pool: {e}")))?;

        let broker = Self { pool, client, store };
        broker.health_check().await?;

        info!("Redis connection pool established");
        Ok(broker)
    }

    async fn conn(&self) -> MeshResult<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| MeshError::TransientQueue(format!("no Redis connection: {e}")))
    }

    async fn publish(&self, channel: &str, payload: Vec<u8>) -> MeshResult<()> {
        let mut conn = self.conn().await?;
        let _: () = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| MeshError::TransientQueue(format!("failed to publish on {channel}: {e}")))?;
        Ok(())
    }

    async fn subscribe(&self, channel: &'static str) -> MeshResult<ByteStream> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| MeshError::TransientQueue(format!("failed to open subscription: {e}")))?;

        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| MeshError::TransientQueue(format!("failed to subscribe to {channel}: {e}")))?;

        Ok(pubsub
            .into_on_message()
            .map(|msg| msg.get_payload_bytes().to_vec())
            .boxed())
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn enqueue(&self, id: &JobId, priority: i32) -> MeshResult<()> {
        let queue = Tier::for_priority(priority).queue_name();
        let mut conn = self.conn().await?;

        let _: () = redis::cmd("LPUSH")
            .arg(queue)
            .arg(id.as_str())
            .query_async(&mut conn)
            .await
            .map_err(|e| MeshError::TransientQueue(format!("failed to enqueue to {queue}: {e}")))?;

        debug!(job_id = %id, queue = %queue, priority = priority, "Enqueued job");
        Ok(())
    }

    async fn fetch(&self, cancel: &CancellationToken) -> MeshResult<JobId> {
        let mut conn = self.conn().await?;
        let queues: Vec<&str> = Tier::scan_order().iter().map(Tier::queue_name).collect();

        // BRPOP with no timeout blocks until a list is non-empty; racing it
        // against the token turns shutdown into a clean CanceledError.
        let popped = tokio::select! {
            _ = cancel.cancelled() => None,
            res = async {
                redis::cmd("BRPOP")
                    .arg(&queues)
                    .arg(0)
                    .query_async::<Option<(String, String)>>(&mut conn)
                    .await
            } => Some(res),
        };

        let Some(result) = popped else {
            // The connection has a pending blocking command; detach it from
            // the pool instead of recycling it.
            drop(Connection::take(conn));
            return Err(MeshError::Canceled);
        };

        let (queue, raw_id) = result
            .map_err(|e| MeshError::Fetch(format!("BRPOP failed: {e}")))?
            .ok_or_else(|| MeshError::Fetch("BRPOP returned an empty reply".to_string()))?;

        let id = JobId::from(raw_id);

        // Claim pattern: the durable transition commits before the id is
        // handed to the worker. On failure the id has already left the
        // queue and is reconciled by operator action.
        self.store
            .update_status(&id, JobStatus::Running)
            .await
            .map_err(|e| MeshError::Claim {
                id: id.clone(),
                reason: e.to_string(),
            })?;

        if let Err(e) = self.publish_task_update(&id, JobStatus::Running).await {
            warn!(job_id = %id, error = %e, "Failed to publish running update");
        }

        debug!(job_id = %id, queue = %queue, "Claimed job");
        Ok(id)
    }

    async fn add_to_dlq(&self, id: &JobId) -> MeshResult<()> {
        let mut conn = self.conn().await?;

        let _: () = redis::cmd("RPUSH")
            .arg(QUEUE_DEAD_LETTER)
            .arg(id.as_str())
            .query_async(&mut conn)
            .await
            .map_err(|e| MeshError::TransientQueue(format!("failed to add to DLQ: {e}")))?;

        debug!(job_id = %id, "Added job to dead-letter list");
        Ok(())
    }

    async fn publish_task_update(&self, id: &JobId, status: JobStatus) -> MeshResult<()> {
        let update = StatusUpdate {
            task_id: id.clone(),
            status,
        };
        self.publish(CHANNEL_TASK_UPDATES, serde_json::to_vec(&update)?)
            .await
    }

    async fn publish_task_event(&self, job: &Job) -> MeshResult<()> {
        self.publish(CHANNEL_TASK_UPDATES, serde_json::to_vec(job)?)
            .await
    }

    async fn publish_health(&self, sample: &HealthSample) -> MeshResult<()> {
        self.publish(CHANNEL_SYSTEM_HEALTH, serde_json::to_vec(sample)?)
            .await
    }

    async fn subscribe_task_updates(&self) -> MeshResult<ByteStream> {
        self.subscribe(CHANNEL_TASK_UPDATES).await
    }

    async fn subscribe_system_health(&self) -> MeshResult<ByteStream> {
        self.subscribe(CHANNEL_SYSTEM_HEALTH).await
    }

    async fn health_check(&self) -> MeshResult<()> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| MeshError::TransientQueue(format!("PING failed: {e}")))?;
        Ok(())
    }
}

/// Accepts both bare `host:port` addresses and full Redis URLs.
fn normalize_url(addr: &str) -> String {
    if addr.contains("://") {
        addr.to_string()
    } else {
        format!("redis://{addr}")
    }
}
