//! Taskmesh Core - Dispatch Mesh Domain Model
//!
//! Shared building blocks for the priority-aware task dispatch mesh:
//! - Job model with status lifecycle and agent addressing
//! - Priority tier routing and queue/channel naming
//! - Worker health telemetry samples
//! - Unified error taxonomy across all services
//! - Environment-driven configuration

pub mod config;
pub mod error;
pub mod health;
pub mod job;
pub mod queue;
pub mod telemetry;

pub use config::{MeshConfig, WorkerSettings};
pub use error::{MeshError, MeshResult};
pub use health::HealthSample;
pub use job::{AgentType, Job, JobId, JobStatus, Payload, StatusUpdate, MAX_RETRIES};
pub use queue::{Tier, CHANNEL_SYSTEM_HEALTH, CHANNEL_TASK_UPDATES, QUEUE_DEAD_LETTER};
