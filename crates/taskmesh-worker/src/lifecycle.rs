//! Per-job lifecycle engine: execute, then settle.
//!
//! Fault isolation rule: a job's failure never terminates its worker, and a
//! store failure during settlement is logged, not propagated. Durability of
//! a final outcome may be lost under persistent store outage; that is the
//! documented degraded mode.

use chrono::Utc;
use std::sync::Arc;
use taskmesh_core::{Job, JobId, JobStatus, MeshError};
use taskmesh_broker::Broker;
use taskmesh_store::JobStore;
use tracing::{error, info, warn};

use crate::agent::Agent;
use crate::retry::RetryPolicy;

/// Drives a claimed job to settlement: completion, re-enqueue after
/// backoff, or the dead-letter sink.
pub struct LifecycleEngine {
    store: Arc<dyn JobStore>,
    broker: Arc<dyn Broker>,
    agent: Arc<dyn Agent>,
    policy: RetryPolicy,
}

impl LifecycleEngine {
    pub fn new(store: Arc<dyn JobStore>, broker: Arc<dyn Broker>, agent: Arc<dyn Agent>) -> Self {
        Self {
            store,
            broker,
            agent,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Processes one claimed job to settlement. The caller already holds
    /// the claim; the `running` transition and its update were committed by
    /// the fetch.
    pub async fn process(&self, worker_id: usize, id: &JobId) {
        let job = match self.store.fetch_job(id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                error!(worker = worker_id, job_id = %id, "Claimed job has no store row");
                return;
            }
            Err(e) => {
                error!(worker = worker_id, job_id = %id, error = %e, "Failed to load job details");
                return;
            }
        };

        info!(
            worker = worker_id,
            job_id = %job.id,
            agent = %job.agent_type,
            priority = job.priority,
            "Processing job"
        );

        match self.agent.execute(&job).await {
            Ok(()) => self.settle_success(worker_id, job).await,
            Err(e) => self.settle_failure(worker_id, &job, &e).await,
        }
    }

    async fn settle_success(&self, worker_id: usize, mut job: Job) {
        if let Err(e) = self.store.update_status(&job.id, JobStatus::Completed).await {
            error!(worker = worker_id, job_id = %job.id, error = %e, "Failed to mark job completed");
        }

        job.status = JobStatus::Completed;
        job.updated_at = Utc::now();

        if let Err(e) = self.broker.publish_task_event(&job).await {
            warn!(worker = worker_id, job_id = %job.id, error = %e, "Failed to broadcast completion");
        }

        info!(worker = worker_id, job_id = %job.id, "Job completed");
    }

    async fn settle_failure(&self, worker_id: usize, job: &Job, err: &MeshError) {
        warn!(worker = worker_id, job_id = %job.id, error = %err, "Job failed");

        let retries = match self.store.increment_retry(&job.id).await {
            Ok(n) => n,
            Err(e) => {
                error!(
                    worker = worker_id,
                    job_id = %job.id,
                    error = %e,
                    "Failed to increment retry count; abandoning settlement"
                );
                return;
            }
        };

        if self.policy.is_exhausted(retries) {
            self.dead_letter(worker_id, job, retries).await;
        } else {
            self.requeue(worker_id, job, retries).await;
        }
    }

    async fn dead_letter(&self, worker_id: usize, job: &Job, retries: i32) {
        warn!(
            worker = worker_id,
            job_id = %job.id,
            retries = retries,
            "Job exceeded retry budget, moving to dead letter"
        );

        // The budget is crossed exactly once; a count beyond it means the
        // id is already on the dead-letter list.
        if retries == self.policy.max_retries + 1 {
            if let Err(e) = self.broker.add_to_dlq(&job.id).await {
                error!(worker = worker_id, job_id = %job.id, error = %e, "Failed to add job to DLQ");
            }
        }

        if let Err(e) = self
            .store
            .update_status(&job.id, JobStatus::PermanentFailure)
            .await
        {
            error!(worker = worker_id, job_id = %job.id, error = %e, "Failed to mark job as permanent failure");
        }

        if let Err(e) = self
            .broker
            .publish_task_update(&job.id, JobStatus::PermanentFailure)
            .await
        {
            warn!(worker = worker_id, job_id = %job.id, error = %e, "Failed to publish permanent failure update");
        }
    }

    async fn requeue(&self, worker_id: usize, job: &Job, retries: i32) {
        let delay = self.policy.delay_for_attempt(retries);
        info!(
            worker = worker_id,
            job_id = %job.id,
            retries = retries,
            delay_ms = delay.as_millis() as u64,
            "Re-queueing job after backoff"
        );

        // The sleep is local: it delays availability and occupies the
        // worker, capping retry storms.
        tokio::time::sleep(delay).await;

        // Re-enqueue only after the store transition commits; otherwise the
        // job stays in running with no queue entry and the janitor sweep
        // reconciles it.
        match self.store.update_status(&job.id, JobStatus::Pending).await {
            Ok(()) => {
                if let Err(e) = self.broker.enqueue(&job.id, job.priority).await {
                    error!(worker = worker_id, job_id = %job.id, error = %e, "Failed to re-enqueue job");
                }
            }
            Err(e) => {
                error!(
                    worker = worker_id,
                    job_id = %job.id,
                    error = %e,
                    "Failed to reset job to pending; leaving it for the stale-running sweep"
                );
            }
        }
    }
}
