//! Worker health telemetry.

use serde::{Deserialize, Serialize};

/// Memory-usage denominator used to report a percentage; not enforced.
pub const RAM_SOFT_LIMIT_MB: f64 = 512.0;

/// One stamped health snapshot. Ephemeral: broadcast, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSample {
    #[serde(rename = "type")]
    pub kind: String,
    pub worker_id: u32,
    /// Process-global CPU share at sample time.
    pub cpu_usage: f64,
    /// Resident set as a percent of the 512 MiB soft limit.
    pub ram_usage: f64,
    pub ram_used_mb: f64,
    /// RFC 3339 wall-clock stamp.
    pub timestamp: String,
}

impl HealthSample {
    pub fn new(worker_id: u32, cpu_usage: f64, ram_used_mb: f64) -> Self {
        Self {
            kind: "HEALTH_METRIC".to_string(),
            worker_id,
            cpu_usage,
            ram_usage: ram_used_mb / RAM_SOFT_LIMIT_MB * 100.0,
            ram_used_mb,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
