//! In-memory store and broker doubles for lifecycle and pool tests.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use taskmesh_broker::{Broker, ByteStream};
use taskmesh_core::{
    HealthSample, Job, JobId, JobStatus, MeshError, MeshResult, Tier, QUEUE_DEAD_LETTER,
};
use taskmesh_store::JobStore;
use tokio_util::sync::CancellationToken;

use crate::agent::Agent;

/// Agent that always fails.
pub struct FailingAgent;

#[async_trait]
impl Agent for FailingAgent {
    async fn execute(&self, _job: &Job) -> MeshResult<()> {
        Err(MeshError::Execution("forced failure".to_string()))
    }
}

/// Hash-map job store with injectable write failures.
pub struct MemoryStore {
    jobs: Mutex<HashMap<String, Job>>,
    fail_updates: AtomicBool,
    fail_increments: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            fail_updates: AtomicBool::new(false),
            fail_increments: AtomicBool::new(false),
        }
    }

    pub fn seed(&self, job: Job) {
        self.jobs
            .lock()
            .unwrap()
            .insert(job.id.as_str().to_string(), job);
    }

    pub fn status_of(&self, id: &JobId) -> Option<JobStatus> {
        self.jobs.lock().unwrap().get(id.as_str()).map(|j| j.status)
    }

    pub fn retry_count_of(&self, id: &JobId) -> Option<i32> {
        self.jobs
            .lock()
            .unwrap()
            .get(id.as_str())
            .map(|j| j.retry_count)
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_increments(&self, fail: bool) {
        self.fail_increments.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert_job(&self, job: &Job) -> MeshResult<()> {
        self.seed(job.clone());
        Ok(())
    }

    async fn update_status(&self, id: &JobId, status: JobStatus) -> MeshResult<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(MeshError::Store("injected update failure".to_string()));
        }
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(id.as_str())
            .ok_or_else(|| MeshError::Store(format!("no job row for id {id}")))?;
        job.status = status;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn fetch_job(&self, id: &JobId) -> MeshResult<Option<Job>> {
        Ok(self.jobs.lock().unwrap().get(id.as_str()).cloned())
    }

    async fn increment_retry(&self, id: &JobId) -> MeshResult<i32> {
        if self.fail_increments.load(Ordering::SeqCst) {
            return Err(MeshError::Store("injected increment failure".to_string()));
        }
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(id.as_str())
            .ok_or_else(|| MeshError::Store(format!("no job row for id {id}")))?;
        job.retry_count += 1;
        job.updated_at = Utc::now();
        Ok(job.retry_count)
    }

    async fn list_stale_running(&self, older_than: ChronoDuration) -> MeshResult<Vec<Job>> {
        let cutoff = Utc::now() - older_than;
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.status == JobStatus::Running && j.updated_at < cutoff)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> MeshResult<()> {
        Ok(())
    }
}

/// In-memory tiered lists plus a recording bus.
pub struct MemoryBroker {
    lists: Mutex<HashMap<String, VecDeque<String>>>,
    events: Mutex<Vec<serde_json::Value>>,
    updates: Mutex<Vec<serde_json::Value>>,
    store: Mutex<Option<Arc<dyn JobStore>>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            lists: Mutex::new(HashMap::new()),
            events: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
            store: Mutex::new(None),
        }
    }

    /// Attaches a store so `fetch` performs the claim transition.
    pub fn attach_store(&self, store: Arc<dyn JobStore>) {
        *self.store.lock().unwrap() = Some(store);
    }

    pub fn published(&self) -> Vec<serde_json::Value> {
        self.events.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<serde_json::Value> {
        self.updates.lock().unwrap().clone()
    }

    pub fn dlq_occurrences(&self, id: &JobId) -> usize {
        self.lists
            .lock()
            .unwrap()
            .get(QUEUE_DEAD_LETTER)
            .map(|l| l.iter().filter(|v| v.as_str() == id.as_str()).count())
            .unwrap_or(0)
    }

    /// Names of every list currently holding the id, scan order first.
    pub fn list_memberships(&self, id: &JobId) -> Vec<String> {
        let lists = self.lists.lock().unwrap();
        let mut names: Vec<&str> = Tier::scan_order().iter().map(Tier::queue_name).collect();
        names.push(QUEUE_DEAD_LETTER);
        names
            .into_iter()
            .filter(|name| {
                lists
                    .get(*name)
                    .is_some_and(|l| l.iter().any(|v| v == id.as_str()))
            })
            .map(str::to_string)
            .collect()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn enqueue(&self, id: &JobId, priority: i32) -> MeshResult<()> {
        let queue = Tier::for_priority(priority).queue_name();
        self.lists
            .lock()
            .unwrap()
            .entry(queue.to_string())
            .or_default()
            .push_front(id.as_str().to_string());
        Ok(())
    }

    async fn fetch(&self, cancel: &CancellationToken) -> MeshResult<JobId> {
        loop {
            let popped = {
                let mut lists = self.lists.lock().unwrap();
                Tier::scan_order().iter().find_map(|tier| {
                    lists
                        .get_mut(tier.queue_name())
                        .and_then(VecDeque::pop_back)
                })
            };

            if let Some(raw) = popped {
                let id = JobId::from(raw);
                let store = self.store.lock().unwrap().clone();
                if let Some(store) = store {
                    store
                        .update_status(&id, JobStatus::Running)
                        .await
                        .map_err(|e| MeshError::Claim {
                            id: id.clone(),
                            reason: e.to_string(),
                        })?;
                }
                let _ = self.publish_task_update(&id, JobStatus::Running).await;
                return Ok(id);
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(MeshError::Canceled),
                _ = tokio::time::sleep(std::time::Duration::from_millis(2)) => {}
            }
        }
    }

    async fn add_to_dlq(&self, id: &JobId) -> MeshResult<()> {
        self.lists
            .lock()
            .unwrap()
            .entry(QUEUE_DEAD_LETTER.to_string())
            .or_default()
            .push_back(id.as_str().to_string());
        Ok(())
    }

    async fn publish_task_update(&self, id: &JobId, status: JobStatus) -> MeshResult<()> {
        self.updates.lock().unwrap().push(serde_json::json!({
            "task_id": id.as_str(),
            "status": status.to_string(),
        }));
        Ok(())
    }

    async fn publish_task_event(&self, job: &Job) -> MeshResult<()> {
        self.events.lock().unwrap().push(serde_json::to_value(job)?);
        Ok(())
    }

    async fn publish_health(&self, _sample: &HealthSample) -> MeshResult<()> {
        Ok(())
    }

    async fn subscribe_task_updates(&self) -> MeshResult<ByteStream> {
        Ok(futures::stream::empty().boxed())
    }

    async fn subscribe_system_health(&self) -> MeshResult<ByteStream> {
        Ok(futures::stream::empty().boxed())
    }

    async fn health_check(&self) -> MeshResult<()> {
        Ok(())
    }
}
