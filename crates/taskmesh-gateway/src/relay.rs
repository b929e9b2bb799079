//! Bus-to-hub subscription relays.

use chrono::Utc;
use futures::StreamExt;
use std::sync::Arc;
use taskmesh_broker::Broker;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::hub::NotificationHub;

/// Bridges the task-updates channel to the hub verbatim.
pub async fn run_task_update_relay(
    broker: Arc<dyn Broker>,
    hub: Arc<NotificationHub>,
    cancel: CancellationToken,
) {
    let mut stream = match broker.subscribe_task_updates().await {
        Ok(stream) => stream,
        Err(e) => {
            error!(error = %e, "Failed to subscribe to task updates");
            return;
        }
    };
    info!("Task update relay started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            payload = stream.next() => {
                let Some(payload) = payload else { break };
                hub.broadcast(payload).await;
            }
        }
    }

    info!("Task update relay stopped");
}

/// Bridges the system-health channel to the hub, wrapping each sample in
/// the websocket health envelope.
pub async fn run_health_relay(
    broker: Arc<dyn Broker>,
    hub: Arc<NotificationHub>,
    cancel: CancellationToken,
) {
    let mut stream = match broker.subscribe_system_health().await {
        Ok(stream) => stream,
        Err(e) => {
            error!(error = %e, "Failed to subscribe to system health");
            return;
        }
    };
    info!("Health relay started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            payload = stream.next() => {
                let Some(payload) = payload else { break };
                if let Some(envelope) = wrap_health(&payload) {
                    hub.broadcast(envelope).await;
                }
            }
        }
    }

    info!("Health relay stopped");
}

fn wrap_health(payload: &[u8]) -> Option<Vec<u8>> {
    let data: serde_json::Value = serde_json::from_slice(payload).ok()?;
    let envelope = serde_json::json!({
        "type": "HEALTH_UPDATE",
        "data": data,
        "timestamp": Utc::now().to_rfc3339(),
    });
    serde_json::to_vec(&envelope).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_envelope_shape() {
        let sample = br#"{"type":"HEALTH_METRIC","worker_id":1,"cpu_usage":3.5}"#;
        let wrapped = wrap_health(sample).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&wrapped).unwrap();

        assert_eq!(value["type"], "HEALTH_UPDATE");
        assert_eq!(value["data"]["worker_id"], 1);
        assert_eq!(value["data"]["type"], "HEALTH_METRIC");
        let stamp = value["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
    }

    #[test]
    fn test_malformed_health_payload_is_skipped() {
        assert!(wrap_health(b"not json").is_none());
    }
}
