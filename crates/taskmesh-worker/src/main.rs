//! Taskmesh worker service entry point.

use std::sync::Arc;
use taskmesh_broker::{Broker, RedisBroker};
use taskmesh_core::{MeshConfig, MeshResult};
use taskmesh_store::{JobStore, PgJobStore};
use taskmesh_worker::{HealthReporter, LifecycleEngine, SimulatedAgent, WorkerPool};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    taskmesh_core::telemetry::init("info,taskmesh=debug");

    info!("Starting Taskmesh worker service...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run().await {
        error!("Worker service error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> MeshResult<()> {
    let config = MeshConfig::from_env();

    let store: Arc<dyn JobStore> = Arc::new(PgJobStore::connect(&config.db_dsn).await?);
    info!("Connected to job store");

    let broker: Arc<dyn Broker> =
        Arc::new(RedisBroker::connect(&config.redis_addr, store.clone()).await?);
    info!(addr = %config.redis_addr, "Connected to broker");

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            info!("Shutting down worker service...");
            cancel.cancel();
        }
    });

    let reporter = HealthReporter::new(broker.clone(), 1, config.worker.health_interval);
    let health_handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { reporter.run(cancel).await }
    });

    let engine = Arc::new(LifecycleEngine::new(
        store,
        broker.clone(),
        Arc::new(SimulatedAgent::new()),
    ));

    let pool = WorkerPool::new(broker, engine, config.worker.clone());
    pool.run(cancel).await;

    let _ = health_handle.await;
    info!("Worker service stopped");
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
