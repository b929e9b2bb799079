//! Postgres job store implementation.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::FromRow;
use std::str::FromStr;
use taskmesh_core::{AgentType, Job, JobId, JobStatus, MeshError, MeshResult, Payload};
use tracing::{debug, info};

use crate::traits::JobStore;

const SELECT_COLUMNS: &str =
    "id, status, priority, agent_type, payload, retry_count, created_at, updated_at";

/// Postgres-backed job store.
pub struct PgJobStore {
    pool: PgPool,
}

/// Database row representation of a job.
#[derive(Debug, FromRow)]
struct JobRow {
    id: String,
    status: String,
    priority: i32,
    agent_type: String,
    payload: Json<Payload>,
    retry_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = MeshError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: JobId::from(row.id),
            status: JobStatus::from_str(&row.status)?,
            priority: row.priority,
            agent_type: AgentType::from_str(&row.agent_type)
                .map_err(|e| MeshError::Store(format!("invalid agent_type in store: {e}")))?,
            payload: row.payload.0,
            retry_count: row.retry_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl PgJobStore {
    /// Connects to the store and verifies the connection.
    pub async fn connect(dsn: &str) -> MeshResult<Self> {
        info!("Connecting to Postgres job store...");

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(dsn)
            .await
            .map_err(|e| MeshError::Store(format!("failed to connect: {e}")))?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| MeshError::Store(format!("ping failed: {e}")))?;

        info!("Postgres connection pool established");
        Ok(Self { pool })
    }

    /// Runs the embedded schema migrations.
    pub async fn run_migrations(&self) -> MeshResult<()> {
        info!("Running job store migrations...");
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| MeshError::Store(format!("migration failed: {e}")))?;
        info!("Job store migrations completed");
        Ok(())
    }

    /// Closes the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert_job(&self, job: &Job) -> MeshResult<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, status, priority, agent_type, payload, retry_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(job.id.as_str())
        .bind(job.status.to_string())
        .bind(job.priority)
        .bind(job.agent_type.as_str())
        .bind(Json(&job.payload))
        .bind(job.retry_count)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| MeshError::Store(format!("failed to insert job: {e}")))?;

        debug!(job_id = %job.id, "Inserted job row");
        Ok(())
    }

    async fn update_status(&self, id: &JobId, status: JobStatus) -> MeshResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $1, updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(status.to_string())
        .bind(Utc::now())
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| MeshError::Store(format!("failed to update status: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(MeshError::Store(format!("no job row for id {id}")));
        }

        debug!(job_id = %id, status = %status, "Updated job status");
        Ok(())
    }

    async fn fetch_job(&self, id: &JobId) -> MeshResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM jobs WHERE id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| MeshError::Store(format!("failed to fetch job: {e}")))?;

        row.map(Job::try_from).transpose()
    }

    async fn increment_retry(&self, id: &JobId) -> MeshResult<i32> {
        let count: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE jobs
            SET retry_count = retry_count + 1, updated_at = $1
            WHERE id = $2
            RETURNING retry_count
            "#,
        )
        .bind(Utc::now())
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| MeshError::Store(format!("failed to increment retry count: {e}")))?;

        count.ok_or_else(|| MeshError::Store(format!("no job row for id {id}")))
    }

    async fn list_stale_running(&self, older_than: Duration) -> MeshResult<Vec<Job>> {
        let cutoff = Utc::now() - older_than;

        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM jobs WHERE status = $1 AND updated_at < $2 ORDER BY updated_at"
        ))
        .bind(JobStatus::Running.to_string())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MeshError::Store(format!("failed to list stale jobs: {e}")))?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn health_check(&self) -> MeshResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| MeshError::Store(format!("health check failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> JobRow {
        let now = Utc::now();
        JobRow {
            id: "job-1".to_string(),
            status: "pending".to_string(),
            priority: 4,
            agent_type: "DEVELOPER".to_string(),
            payload: Json(Payload::new()),
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_row_conversion() {
        let job = Job::try_from(sample_row()).unwrap();
        assert_eq!(job.id.as_str(), "job-1");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.agent_type, AgentType::Developer);
        assert_eq!(job.priority, 4);
    }

    #[test]
    fn test_row_conversion_rejects_unknown_status() {
        let mut row = sample_row();
        row.status = "paused".to_string();
        assert!(Job::try_from(row).is_err());
    }

    #[test]
    fn test_row_conversion_rejects_unknown_agent() {
        let mut row = sample_row();
        row.agent_type = "INTERN".to_string();
        assert!(Job::try_from(row).is_err());
    }

    #[test]
    fn test_row_conversion_preserves_payload() {
        let mut row = sample_row();
        row.payload
            .0
            .insert("simulate_fail".to_string(), serde_json::Value::Bool(true));
        let job = Job::try_from(row).unwrap();
        assert_eq!(job.simulate_fail(), Some(true));
    }
}
