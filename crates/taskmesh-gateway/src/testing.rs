//! Recording store and broker doubles for producer and route tests.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use taskmesh_broker::{Broker, ByteStream};
use taskmesh_core::{HealthSample, Job, JobId, JobStatus, MeshError, MeshResult};
use taskmesh_store::JobStore;
use tokio_util::sync::CancellationToken;

/// Shared operation log asserting submission ordering across collaborators.
pub type OpLog = Arc<Mutex<Vec<String>>>;

pub struct RecordingStore {
    ops: OpLog,
    jobs: Mutex<HashMap<String, Job>>,
    fail_inserts: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            ops: Arc::new(Mutex::new(Vec::new())),
            jobs: Mutex::new(HashMap::new()),
            fail_inserts: AtomicBool::new(false),
        }
    }

    pub fn ops(&self) -> OpLog {
        self.ops.clone()
    }

    pub fn ops_taken(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn job_count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }
}

#[async_trait]
impl JobStore for RecordingStore {
    async fn insert_job(&self, job: &Job) -> MeshResult<()> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(MeshError::Store("injected insert failure".to_string()));
        }
        self.ops.lock().unwrap().push("insert".to_string());
        self.jobs
            .lock()
            .unwrap()
            .insert(job.id.as_str().to_string(), job.clone());
        Ok(())
    }

    async fn update_status(&self, id: &JobId, status: JobStatus) -> MeshResult<()> {
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
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(id.as_str())
            .ok_or_else(|| MeshError::Store(format!("no job row for id {id}")))?;
        job.retry_count += 1;
        Ok(job.retry_count)
    }

    async fn list_stale_running(&self, _older_than: ChronoDuration) -> MeshResult<Vec<Job>> {
        Ok(Vec::new())
    }

    async fn health_check(&self) -> MeshResult<()> {
        Ok(())
    }
}

pub struct RecordingBroker {
    ops: OpLog,
    enqueued: Mutex<Vec<(String, i32)>>,
    events: Mutex<Vec<serde_json::Value>>,
    fail_enqueues: AtomicBool,
    fail_publishes: AtomicBool,
}

impl RecordingBroker {
    pub fn new(ops: OpLog) -> Self {
        Self {
            ops,
            enqueued: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            fail_enqueues: AtomicBool::new(false),
            fail_publishes: AtomicBool::new(false),
        }
    }

    pub fn enqueued(&self) -> Vec<(String, i32)> {
        self.enqueued.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<serde_json::Value> {
        self.events.lock().unwrap().clone()
    }

    pub fn fail_enqueues(&self, fail: bool) {
        self.fail_enqueues.store(fail, Ordering::SeqCst);
    }

    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Broker for RecordingBroker {
    async fn enqueue(&self, id: &JobId, priority: i32) -> MeshResult<()> {
        if self.fail_enqueues.load(Ordering::SeqCst) {
            return Err(MeshError::TransientQueue(
                "injected enqueue failure".to_string(),
            ));
        }
        self.ops.lock().unwrap().push("enqueue".to_string());
        self.enqueued
            .lock()
            .unwrap()
            .push((id.as_str().to_string(), priority));
        Ok(())
    }

    async fn fetch(&self, _cancel: &CancellationToken) -> MeshResult<JobId> {
        Err(MeshError::Fetch("not supported by test double".to_string()))
    }

    async fn add_to_dlq(&self, _id: &JobId) -> MeshResult<()> {
        Ok(())
    }

    async fn publish_task_update(&self, _id: &JobId, _status: JobStatus) -> MeshResult<()> {
        Ok(())
    }

    async fn publish_task_event(&self, job: &Job) -> MeshResult<()> {
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(MeshError::TransientQueue(
                "injected publish failure".to_string(),
            ));
        }
        self.ops.lock().unwrap().push("publish_event".to_string());
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
