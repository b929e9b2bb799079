//! Fires a burst of random submissions at the gateway and reports
//! throughput.

use clap::Parser;
use rand::Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskmesh_core::AgentType;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(about = "Stress test the taskmesh gateway")]
struct Args {
    /// Total number of tasks to create.
    #[arg(long, default_value_t = 500)]
    count: usize,

    /// Number of concurrent senders.
    #[arg(long, default_value_t = 10)]
    concurrency: usize,

    /// Submission endpoint.
    #[arg(long, default_value = "http://localhost:8081/v1/tasks")]
    url: String,
}

#[derive(Debug, Serialize)]
struct TaskRequest {
    agent_type: &'static str,
    priority: i32,
    payload: serde_json::Value,
}

fn random_request() -> TaskRequest {
    let mut rng = rand::thread_rng();
    TaskRequest {
        agent_type: AgentType::ALL[rng.gen_range(0..AgentType::ALL.len())].as_str(),
        priority: rng.gen_range(1..=5),
        payload: serde_json::json!({
            "source": "stress_test",
            "note": "Performance check",
        }),
    }
}

#[tokio::main]
async fn main() {
    taskmesh_core::telemetry::init("info");

    let args = Args::parse();
    info!(
        count = args.count,
        concurrency = args.concurrency,
        url = %args.url,
        "Starting stress test"
    );

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("failed to build HTTP client");

    let accepted = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let (tx, rx) = mpsc::channel::<usize>(args.count.max(1));
    let rx = Arc::new(tokio::sync::Mutex::new(rx));

    let start = Instant::now();
    let mut senders = Vec::with_capacity(args.concurrency);
    for _ in 0..args.concurrency {
        let client = client.clone();
        let url = args.url.clone();
        let rx = rx.clone();
        let accepted = accepted.clone();
        let failed = failed.clone();

        senders.push(tokio::spawn(async move {
            loop {
                let next = rx.lock().await.recv().await;
                if next.is_none() {
                    break;
                }

                let request = random_request();
                match client.post(&url).json(&request).send().await {
                    Ok(response) if response.status() == reqwest::StatusCode::ACCEPTED => {
                        accepted.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(response) => {
                        warn!(status = %response.status(), "Unexpected response");
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        error!(error = %e, "Request failed");
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }));
    }

    for i in 0..args.count {
        if tx.send(i).await.is_err() {
            break;
        }
    }
    drop(tx);

    for sender in senders {
        let _ = sender.await;
    }

    let elapsed = start.elapsed();
    let accepted = accepted.load(Ordering::Relaxed);
    let failed = failed.load(Ordering::Relaxed);
    info!(
        accepted = accepted,
        failed = failed,
        elapsed_secs = format!("{:.2}", elapsed.as_secs_f64()),
        rate = format!("{:.2} req/s", accepted as f64 / elapsed.as_secs_f64().max(f64::EPSILON)),
        "Stress test done"
    );
}
