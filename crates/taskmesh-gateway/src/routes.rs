//! HTTP API: task ingestion and the real-time stream.

use axum::{
    extract::{
        rejection::JsonRejection,
        ws::{WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use taskmesh_core::MeshError;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::hub::NotificationHub;
use crate::producer::{Producer, SubmitRequest};

#[derive(Clone)]
pub struct AppState {
    pub producer: Arc<Producer>,
    pub hub: Arc<NotificationHub>,
}

/// Builds the gateway router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/tasks", post(create_task))
        .route("/v1/ws", get(ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Serialize)]
struct TaskResponse {
    id: String,
    status: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

async fn create_task(
    State(state): State<AppState>,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(json) => json,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: format!("invalid request payload: {rejection}"),
                }),
            )
                .into_response();
        }
    };

    match state.producer.submit(request).await {
        Ok(job) => (
            StatusCode::ACCEPTED,
            Json(TaskResponse {
                id: job.id.to_string(),
                status: job.status.to_string(),
            }),
        )
            .into_response(),
        Err(e @ MeshError::Validation(_)) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Task submission failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "internal server error".to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub))
}

async fn handle_socket(socket: WebSocket, hub: Arc<NotificationHub>) {
    let (sink, mut stream) = socket.split();
    let id = hub.register(Box::new(sink)).await;
    info!(client = id, "New websocket client connected");

    // Server-push only: inbound frames are drained and ignored.
    while let Some(Ok(_)) = stream.next().await {}

    hub.unregister(id).await;
    info!(client = id, "Websocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingBroker, RecordingStore};
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use tower::ServiceExt;

    fn test_state() -> (Arc<RecordingStore>, AppState) {
        let store = Arc::new(RecordingStore::new());
        let broker = Arc::new(RecordingBroker::new(store.ops()));
        let state = AppState {
            producer: Arc::new(Producer::new(store.clone(), broker)),
            hub: Arc::new(NotificationHub::new()),
        };
        (store, state)
    }

    fn post_json(body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/v1/tasks")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_accepts_valid_submission() {
        let (_, state) = test_state();
        let response = create_router(state)
            .oneshot(post_json(
                r#"{"agent_type":"DEVELOPER","priority":5,"payload":{}}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["status"], "pending");
        assert!(value["id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn test_rejects_invalid_agent_type() {
        let (store, state) = test_state();
        let response = create_router(state)
            .oneshot(post_json(r#"{"agent_type":"CEDRIC_WRITER","priority":1}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(store.job_count(), 0);
    }

    #[tokio::test]
    async fn test_rejects_malformed_json() {
        let (_, state) = test_state();
        let response = create_router(state)
            .oneshot(post_json("{not json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_non_post_is_method_not_allowed() {
        let (_, state) = test_state();
        let response = create_router(state)
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/v1/tasks")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_store_outage_is_internal_error() {
        let (store, state) = test_state();
        store.fail_inserts(true);
        let response = create_router(state)
            .oneshot(post_json(r#"{"agent_type":"DEVELOPER","priority":1}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
