//! Background synthetic load generator.

use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use taskmesh_core::{AgentType, Payload};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::producer::{Producer, SubmitRequest};

/// Emits one random job every 3-7 seconds until cancelled.
pub async fn run(producer: Arc<Producer>, cancel: CancellationToken) {
    info!("Simulation mode enabled");

    loop {
        let jitter = {
            let mut rng = rand::thread_rng();
            Duration::from_millis(rng.gen_range(3000..7000))
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(jitter) => {}
        }

        let request = random_request();
        match producer.submit(request).await {
            Ok(job) => info!(
                job_id = %job.id,
                agent = %job.agent_type,
                priority = job.priority,
                "Simulator generated task"
            ),
            Err(e) => warn!(error = %e, "Simulator failed to create task"),
        }
    }

    info!("Simulator stopped");
}

fn random_request() -> SubmitRequest {
    let (agent_type, priority) = {
        let mut rng = rand::thread_rng();
        let agent = AgentType::ALL[rng.gen_range(0..AgentType::ALL.len())];
        (agent, rng.gen_range(1..=5))
    };

    let mut payload = Payload::new();
    payload.insert("source".to_string(), "simulator".into());
    payload.insert("ts".to_string(), Utc::now().timestamp().into());
    payload.insert("note".to_string(), "Automated drill".into());

    SubmitRequest {
        agent_type: agent_type.to_string(),
        priority,
        payload,
    }
}
