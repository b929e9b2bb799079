//! Taskmesh gateway service entry point.

use std::sync::Arc;
use taskmesh_broker::{Broker, RedisBroker};
use taskmesh_core::{MeshConfig, MeshError, MeshResult};
use taskmesh_gateway::{create_router, AppState, NotificationHub, Producer};
use taskmesh_store::{JobStore, PgJobStore};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    taskmesh_core::telemetry::init("info,taskmesh=debug,tower_http=debug");

    info!("Starting Taskmesh gateway service...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run().await {
        error!("Gateway service error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> MeshResult<()> {
    let config = MeshConfig::from_env();

    let pg_store = Arc::new(PgJobStore::connect(&config.db_dsn).await?);
    pg_store.run_migrations().await?;
    let store: Arc<dyn JobStore> = pg_store;
    info!("Connected to job store");

    let broker: Arc<dyn Broker> =
        Arc::new(RedisBroker::connect(&config.redis_addr, store.clone()).await?);
    info!(addr = %config.redis_addr, "Connected to broker");

    let hub = Arc::new(NotificationHub::new());
    let producer = Arc::new(Producer::new(store, broker.clone()));

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            info!("Shutting down gateway service...");
            cancel.cancel();
        }
    });

    // Hub dispatcher and the bus-to-hub relays.
    tokio::spawn({
        let hub = hub.clone();
        let cancel = cancel.clone();
        async move { hub.run(cancel).await }
    });
    tokio::spawn(taskmesh_gateway::relay::run_task_update_relay(
        broker.clone(),
        hub.clone(),
        cancel.clone(),
    ));
    tokio::spawn(taskmesh_gateway::relay::run_health_relay(
        broker.clone(),
        hub.clone(),
        cancel.clone(),
    ));

    if config.simulator_enabled {
        tokio::spawn(taskmesh_gateway::simulator::run(
            producer.clone(),
            cancel.clone(),
        ));
    }

    let router = create_router(AppState { producer, hub });

    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .map_err(|e| MeshError::Internal(format!("failed to bind {}: {e}", config.http_addr)))?;
    info!(addr = %config.http_addr, "Gateway API listening (WS at /v1/ws)");

    axum::serve(listener, router)
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .await
        .map_err(|e| MeshError::Internal(format!("server error: {e}")))?;

    info!("Gateway service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        }
    }
}
