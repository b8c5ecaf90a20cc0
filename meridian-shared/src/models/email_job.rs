/// Outbound email outbox
///
/// Request handlers insert a row here instead of talking to SMTP; the
/// worker claims pending rows, renders them by `kind` and delivers them.
/// Claiming, retries and failure bookkeeping live in the worker's queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "email_job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EmailJobStatus {
    /// Waiting for `available_at`
    Pending,
    /// Claimed by a dispatcher
    Sending,
    Sent,
    /// Gave up after the maximum number of attempts
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmailJob {
    pub id: Uuid,
    pub kind: String,
    pub recipient: String,
    pub recipient_name: Option<String>,
    pub payload: serde_json::Value,
    pub status: EmailJobStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub available_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEmailJob {
    pub kind: String,
    pub recipient: String,
    pub recipient_name: Option<String>,
    pub payload: serde_json::Value,
}

impl EmailJob {
    /// Inserts a pending job
    ///
    /// Takes any executor so a job can be enqueued inside the transaction
    /// that produced it.
    pub async fn enqueue<'e, E>(executor: E, job: NewEmailJob) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, EmailJob>(
            r#"
            INSERT INTO email_jobs (kind, recipient, recipient_name, payload)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(job.kind)
        .bind(job.recipient)
        .bind(job.recipient_name)
        .bind(job.payload)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, EmailJob>("SELECT * FROM email_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Jobs not yet delivered or given up on
    pub async fn count_pending<'e, E>(executor: E) -> Result<i64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM email_jobs WHERE status IN ('pending', 'sending')",
        )
        .fetch_one(executor)
        .await?;

        Ok(count)
    }
}
