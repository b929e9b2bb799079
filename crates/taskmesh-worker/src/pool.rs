//! Worker pool: N peer consumers of the fetch-process-settle loop.

use std::sync::Arc;
use taskmesh_broker::Broker;
use taskmesh_core::{MeshError, WorkerSettings};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::lifecycle::LifecycleEngine;

/// Pool of independent workers. There is no central dispatcher; workers
/// are peers and backpressure is implicit: busy workers stop draining the
/// queue.
pub struct WorkerPool {
    broker: Arc<dyn Broker>,
    engine: Arc<LifecycleEngine>,
    settings: WorkerSettings,
}

impl WorkerPool {
    pub fn new(
        broker: Arc<dyn Broker>,
        engine: Arc<LifecycleEngine>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            broker,
            engine,
            settings,
        }
    }

    /// Runs the pool until the token fires, then blocks until every worker
    /// has exited. In-flight executions run to completion; shutdown is
    /// bounded by the longest active job plus any in-progress backoff.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(concurrency = self.settings.concurrency, "Starting worker pool");

        let mut handles = Vec::with_capacity(self.settings.concurrency);
        for worker_id in 0..self.settings.concurrency {
            let broker = self.broker.clone();
            let engine = self.engine.clone();
            let cancel = cancel.clone();
            let pause = self.settings.fetch_retry_pause;

            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, broker, engine, cancel, pause).await;
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }

        info!("Worker pool stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    broker: Arc<dyn Broker>,
    engine: Arc<LifecycleEngine>,
    cancel: CancellationToken,
    pause: std::time::Duration,
) {
    info!(worker = worker_id, "Worker started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match broker.fetch(&cancel).await {
            Ok(id) => {
                // A worker is single-tasked: the job settles fully before
                // the next fetch.
                engine.process(worker_id, &id).await;
            }
            Err(MeshError::Canceled) => break,
            Err(MeshError::Claim { id, reason }) => {
                error!(
                    worker = worker_id,
                    job_id = %id,
                    reason = %reason,
                    "Lost claim; id dropped from queue"
                );
            }
            Err(e) => {
                error!(worker = worker_id, error = %e, "Fetch failed");
                tokio::time::sleep(pause).await;
            }
        }
    }

    info!(worker = worker_id, "Worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::SimulatedAgent;
    use crate::retry::RetryPolicy;
    use crate::testing::{MemoryBroker, MemoryStore};
    use std::time::Duration;
    use taskmesh_core::{AgentType, Job, JobStatus, Payload};
    use taskmesh_store::JobStore;

    fn settings(concurrency: usize) -> WorkerSettings {
        WorkerSettings {
            concurrency,
            fetch_retry_pause: Duration::from_millis(1),
            health_interval: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn test_pool_exits_on_cancel() {
        let store = Arc::new(MemoryStore::new());
        let broker = Arc::new(MemoryBroker::new());
        let engine = Arc::new(LifecycleEngine::new(
            store,
            broker.clone(),
            Arc::new(SimulatedAgent::with_latency(Duration::ZERO)),
        ));
        let pool = WorkerPool::new(broker, engine, settings(3));

        let cancel = CancellationToken::new();
        cancel.cancel();

        // Must return instead of blocking on the empty queue.
        tokio::time::timeout(Duration::from_secs(1), pool.run(cancel))
            .await
            .expect("pool did not stop on cancel");
    }

    #[tokio::test]
    async fn test_pool_drains_queued_jobs() {
        let store = Arc::new(MemoryStore::new());
        let broker = Arc::new(MemoryBroker::new());
        broker.attach_store(store.clone());

        let mut ids = Vec::new();
        for priority in [5, 2, 1] {
            let job = Job::new(AgentType::Developer, priority, Payload::new());
            store.insert_job(&job).await.unwrap();
            broker.enqueue(&job.id, job.priority).await.unwrap();
            ids.push(job.id);
        }

        let engine = Arc::new(
            LifecycleEngine::new(
                store.clone(),
                broker.clone(),
                Arc::new(SimulatedAgent::with_latency(Duration::ZERO)),
            )
            .with_policy(RetryPolicy::with_base_delay(Duration::from_millis(1))),
        );
        let pool = WorkerPool::new(broker.clone(), engine, settings(2));

        let cancel = CancellationToken::new();
        let stopper = {
            let store = store.clone();
            let ids = ids.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    let done = ids
                        .iter()
                        .all(|id| store.status_of(id) == Some(JobStatus::Completed));
                    if done {
                        cancel.cancel();
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
        };

        tokio::time::timeout(Duration::from_secs(5), pool.run(cancel))
            .await
            .expect("pool did not drain the queue");
        let _ = stopper.await;

        for id in &ids {
            assert_eq!(store.status_of(id), Some(JobStatus::Completed));
            assert!(broker.list_memberships(id).is_empty());
        }
    }
}
