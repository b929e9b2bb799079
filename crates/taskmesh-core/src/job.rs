//! Job model and lifecycle states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::MeshError;

/// Retry budget. The sixth failure of a job takes the dead-letter edge.
pub const MAX_RETRIES: i32 = 5;

/// Reserved payload key that forces an execution failure.
pub const SIMULATE_FAIL_KEY: &str = "simulate_fail";

/// Opaque job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Creates a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the job ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The consumer role a job is addressed to. A label, not a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentType {
    Architect,
    Developer,
    QaEngineer,
}

impl AgentType {
    /// All members of the closed set, in declaration order.
    pub const ALL: [AgentType; 3] = [
        AgentType::Architect,
        AgentType::Developer,
        AgentType::QaEngineer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Architect => "ARCHITECT",
            AgentType::Developer => "DEVELOPER",
            AgentType::QaEngineer => "QA_ENGINEER",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ARCHITECT" => Ok(AgentType::Architect),
            "DEVELOPER" => Ok(AgentType::Developer),
            "QA_ENGINEER" => Ok(AgentType::QaEngineer),
            other => Err(MeshError::Validation(format!(
                "invalid agent_type {other:?}, must be one of: ARCHITECT, DEVELOPER, QA_ENGINEER"
            ))),
        }
    }
}

/// Job status enumeration.
///
/// Transitions form a DAG per claim cycle:
/// `pending -> running -> (completed | permanent_failure)`, with a retrying
/// job re-entering `pending` after its backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    PermanentFailure,
}

impl JobStatus {
    /// Returns true for states with no outgoing edges.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::PermanentFailure)
    }
}

impl Default for JobStatus {
    fn default() -> Self {
        JobStatus::Pending
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::PermanentFailure => write!(f, "permanent_failure"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "permanent_failure" => Ok(JobStatus::PermanentFailure),
            other => Err(MeshError::Store(format!("unknown job status {other:?}"))),
        }
    }
}

/// Opaque job payload: a tree of string-keyed JSON values.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Unit of work in the mesh.
///
/// The store owns the canonical row; queues carry only the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub priority: i32,
    pub agent_type: AgentType,
    pub payload: Payload,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Creates a fresh pending job with stamped timestamps.
    pub fn new(agent_type: AgentType, priority: i32, payload: Payload) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            status: JobStatus::Pending,
            priority,
            agent_type,
            payload,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Typed accessor for the reserved failure-injection hook.
    pub fn simulate_fail(&self) -> Option<bool> {
        self.payload
            .get(SIMULATE_FAIL_KEY)
            .and_then(serde_json::Value::as_bool)
    }
}

/// Compact status-transition envelope published on the task channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub task_id: JobId,
    pub status: JobStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_generation() {
        let id1 = JobId::new();
        let id2 = JobId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_agent_type_round_trip() {
        for agent in AgentType::ALL {
            assert_eq!(agent.as_str().parse::<AgentType>().unwrap(), agent);
        }
    }

    #[test]
    fn test_agent_type_rejects_unknown() {
        assert!("MAGNUS_STRATEGIST".parse::<AgentType>().is_err());
        assert!("developer".parse::<AgentType>().is_err());
        assert!("".parse::<AgentType>().is_err());
    }

    #[test]
    fn test_agent_type_wire_names() {
        let json = serde_json::to_string(&AgentType::QaEngineer).unwrap();
        assert_eq!(json, "\"QA_ENGINEER\"");
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::PermanentFailure,
        ] {
            assert_eq!(status.to_string().parse::<JobStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_status_wire_names() {
        let json = serde_json::to_string(&JobStatus::PermanentFailure).unwrap();
        assert_eq!(json, "\"permanent_failure\"");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::PermanentFailure.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_new_job_defaults() {
        let job = Job::new(AgentType::Developer, 5, Payload::new());
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.created_at, job.updated_at);
    }

    #[test]
    fn test_simulate_fail_accessor() {
        let mut payload = Payload::new();
        assert_eq!(Job::new(AgentType::Architect, 1, payload.clone()).simulate_fail(), None);

        payload.insert(SIMULATE_FAIL_KEY.to_string(), serde_json::Value::Bool(true));
        assert_eq!(Job::new(AgentType::Architect, 1, payload.clone()).simulate_fail(), Some(true));

        // A non-boolean value is not a valid hook.
        payload.insert(
            SIMULATE_FAIL_KEY.to_string(),
            serde_json::Value::String("true".to_string()),
        );
        assert_eq!(Job::new(AgentType::Architect, 1, payload).simulate_fail(), None);
    }

    #[test]
    fn test_job_wire_shape() {
        let job = Job::new(AgentType::Developer, 3, Payload::new());
        let value = serde_json::to_value(&job).unwrap();
        for field in [
            "id",
            "status",
            "priority",
            "agent_type",
            "payload",
            "retry_count",
            "created_at",
            "updated_at",
        ] {
            assert!(value.get(field).is_some(), "missing field {field}");
        }
    }

    #[test]
    fn test_status_update_wire_shape() {
        let update = StatusUpdate {
            task_id: JobId::from("abc"),
            status: JobStatus::Running,
        };
        let json = serde_json::to_string(&update).unwrap();
        assert_eq!(json, r#"{"task_id":"abc","status":"running"}"#);
    }
}
