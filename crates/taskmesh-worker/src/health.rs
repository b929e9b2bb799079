//! Periodic worker health telemetry.

use std::sync::Arc;
use std::time::Duration;
use sysinfo::{Pid, ProcessesToUpdate, System};
use taskmesh_broker::Broker;
use taskmesh_core::HealthSample;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Publishes one CPU/memory snapshot per tick on the health channel.
/// On a sensor read failure the tick is skipped rather than emitted with
/// zeros. Cancellation is honored on the next tick boundary.
pub struct HealthReporter {
    broker: Arc<dyn Broker>,
    worker_id: u32,
    interval: Duration,
}

impl HealthReporter {
    pub fn new(broker: Arc<dyn Broker>, worker_id: u32, interval: Duration) -> Self {
        Self {
            broker,
            worker_id,
            interval,
        }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        info!(worker = self.worker_id, "Health monitor started");

        let mut sys = System::new();
        let pid = Pid::from_u32(std::process::id());
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(sample) = read_sample(&mut sys, pid, self.worker_id) else {
                        warn!(worker = self.worker_id, "Skipping health sample: process metrics unavailable");
                        continue;
                    };
                    if let Err(e) = self.broker.publish_health(&sample).await {
                        warn!(worker = self.worker_id, error = %e, "Failed to publish health sample");
                    }
                }
            }
        }

        info!(worker = self.worker_id, "Health monitor stopped");
    }
}

fn read_sample(sys: &mut System, pid: Pid, worker_id: u32) -> Option<HealthSample> {
    sys.refresh_cpu_usage();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

    let process = sys.process(pid)?;
    let cpu_usage = f64::from(sys.global_cpu_usage());
    let ram_used_mb = process.memory() as f64 / 1024.0 / 1024.0;

    Some(HealthSample::new(worker_id, cpu_usage, ram_used_mb))
}
