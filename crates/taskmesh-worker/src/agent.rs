//! Agent execution seam.

use async_trait::async_trait;
use std::time::Duration;
use taskmesh_core::{AgentType, Job, MeshError, MeshResult};
use tracing::debug;

/// The logical consumer a job is addressed to. Real deployments plug their
/// own implementation in here.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn execute(&self, job: &Job) -> MeshResult<()>;
}

/// Stand-in agent: fixed latency, with the reserved `simulate_fail` payload
/// hook forcing an execution error.
pub struct SimulatedAgent {
    latency: Duration,
}

impl SimulatedAgent {
    pub fn new() -> Self {
        Self {
            latency: Duration::from_secs(2),
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for SimulatedAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for SimulatedAgent {
    async fn execute(&self, job: &Job) -> MeshResult<()> {
        match job.agent_type {
            AgentType::Architect => debug!(job_id = %job.id, "Running system architecture analysis"),
            AgentType::Developer => debug!(job_id = %job.id, "Writing code implementation"),
            AgentType::QaEngineer => debug!(job_id = %job.id, "Running test suite"),
        }

        tokio::time::sleep(self.latency).await;

        if job.simulate_fail() == Some(true) {
            return Err(MeshError::Execution("simulated agent error".to_string()));
        }

        Ok(())
    }
}
