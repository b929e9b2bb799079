//! Producer entry: the three-step submission protocol.

use serde::Deserialize;
use std::sync::Arc;
use taskmesh_broker::Broker;
use taskmesh_core::{AgentType, Job, MeshError, MeshResult, Payload};
use taskmesh_store::JobStore;
use tracing::{info, warn};

/// Validated-shape submission body.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    pub agent_type: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub payload: Payload,
}

/// Accepts submissions and makes them visible to the mesh: the row is
/// written before the id ever appears on a queue, and the queue sees the id
/// before the bus sees the created event.
pub struct Producer {
    store: Arc<dyn JobStore>,
    broker: Arc<dyn Broker>,
}

impl Producer {
    pub fn new(store: Arc<dyn JobStore>, broker: Arc<dyn Broker>) -> Self {
        Self { store, broker }
    }

    pub async fn submit(&self, request: SubmitRequest) -> MeshResult<Job> {
        let agent_type: AgentType = request.agent_type.parse()?;
        let job = Job::new(agent_type, request.priority, request.payload);

        // 1. Persist. On failure nothing was enqueued.
        self.store
            .insert_job(&job)
            .await
            .map_err(|e| MeshError::Submit(format!("store write failed: {e}")))?;

        // 2. Enqueue. On failure the row stays orphaned in pending; a
        // janitor re-enqueuing pending rows recovers it.
        self.broker
            .enqueue(&job.id, job.priority)
            .await
            .map_err(|e| MeshError::Submit(format!("enqueue failed: {e}")))?;

        // 3. Announce. Best-effort.
        if let Err(e) = self.broker.publish_task_event(&job).await {
            warn!(job_id = %job.id, error = %e, "Failed to broadcast created event");
        }

        info!(
            job_id = %job.id,
            agent = %job.agent_type,
            priority = job.priority,
            "Task accepted"
        );
        Ok(job)
    }
}
