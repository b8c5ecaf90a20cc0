/// Email outbox queue
///
/// Claims pending `email_jobs` rows for delivery and records the outcome.
///
/// # Lifecycle
///
/// ```text
/// pending --claim--> sending --mark_sent--> sent
///    ^                  |
///    +---mark_failed----+ (attempts < max, with backoff)
///                       |
///                       +---mark_failed--> failed (attempts >= max)
/// ```
///
/// `attempts` is incremented at claim time, so a job whose worker died
/// mid-send still counts the attempt when [`EmailQueue::requeue_stale`]
/// puts it back.
///
/// Claims use `FOR UPDATE SKIP LOCKED`, so several dispatchers can share
/// one outbox without sending a message twice.

use chrono::{DateTime, Duration, Utc};
use meridian_shared::models::email_job::{EmailJob, EmailJobStatus};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Email job not found: {0}")]
    JobNotFound(Uuid),
}

const BASE_RETRY_SECS: i64 = 30;
const MAX_RETRY_SECS: i64 = 3600;

/// Delay before the next attempt after `attempts` failed ones
///
/// 30s, 60s, 120s ... capped at one hour.
pub fn retry_delay(attempts: i32) -> Duration {
    let exponent = attempts.saturating_sub(1).clamp(0, 16) as u32;
    let secs = BASE_RETRY_SECS.saturating_mul(1_i64 << exponent);
    Duration::seconds(secs.min(MAX_RETRY_SECS))
}

/// What [`EmailQueue::mark_failed`] did with the job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Retrying { available_at: DateTime<Utc> },
    GaveUp,
}

#[derive(Clone)]
pub struct EmailQueue {
    db: PgPool,
    max_attempts: i32,
}

impl EmailQueue {
    pub fn new(db: PgPool, max_attempts: i32) -> Self {
        Self { db, max_attempts }
    }

    /// Claims up to `limit` due jobs, oldest first
    pub async fn claim(&self, limit: i64) -> Result<Vec<EmailJob>, QueueError> {
        let jobs = sqlx::query_as::<_, EmailJob>(
            r#"
            WITH due AS (
                SELECT id
                FROM email_jobs
                WHERE status = $1
                  AND available_at <= NOW()
                ORDER BY available_at ASC, created_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE email_jobs
            SET
                status = $3,
                attempts = email_jobs.attempts + 1,
                updated_at = NOW()
            FROM due
            WHERE email_jobs.id = due.id
            RETURNING email_jobs.*
            "#,
        )
        .bind(EmailJobStatus::Pending)
        .bind(limit)
        .bind(EmailJobStatus::Sending)
        .fetch_all(&self.db)
        .await?;

        if !jobs.is_empty() {
            tracing::debug!(count = jobs.len(), "Claimed email jobs");
        }

        Ok(jobs)
    }

    pub async fn mark_sent(&self, id: Uuid) -> Result<(), QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE email_jobs
            SET status = $2, sent_at = NOW(), last_error = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(EmailJobStatus::Sent)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::JobNotFound(id));
        }

        Ok(())
    }

    /// Records a failed attempt
    ///
    /// Reschedules with [`retry_delay`] while attempts remain; otherwise the
    /// job ends as `failed`.
    pub async fn mark_failed(&self, job: &EmailJob, error: &str) -> Result<FailureOutcome, QueueError> {
        if job.attempts >= self.max_attempts {
            self.mark_dead(job.id, error).await?;
            return Ok(FailureOutcome::GaveUp);
        }

        let available_at = Utc::now() + retry_delay(job.attempts);
        let result = sqlx::query(
            r#"
            UPDATE email_jobs
            SET status = $2, last_error = $3, available_at = $4, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(EmailJobStatus::Pending)
        .bind(error)
        .bind(available_at)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::JobNotFound(job.id));
        }

        Ok(FailureOutcome::Retrying { available_at })
    }

    /// Fails the job without further attempts
    pub async fn mark_dead(&self, id: Uuid, error: &str) -> Result<(), QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE email_jobs
            SET status = $2, last_error = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(EmailJobStatus::Failed)
        .bind(error)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::JobNotFound(id));
        }

        Ok(())
    }

    /// Returns jobs stuck in `sending` for longer than `older_than` to `pending`
    pub async fn requeue_stale(&self, older_than: std::time::Duration) -> Result<u64, QueueError> {
        let cutoff = Utc::now()
            - Duration::from_std(older_than).unwrap_or_else(|_| Duration::seconds(MAX_RETRY_SECS));

        let result = sqlx::query(
            r#"
            UPDATE email_jobs
            SET status = $1, available_at = NOW(), updated_at = NOW()
            WHERE status = $2 AND updated_at < $3
            "#,
        )
        .bind(EmailJobStatus::Pending)
        .bind(EmailJobStatus::Sending)
        .bind(cutoff)
        .execute(&self.db)
        .await?;

        let count = result.rows_affected();
        if count > 0 {
            tracing::warn!(count, "Requeued stale email jobs");
        }

        Ok(count)
    }

    /// Hands claimed jobs back without counting the attempt
    pub async fn release(&self, ids: &[Uuid]) -> Result<u64, QueueError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE email_jobs
            SET status = $2, attempts = GREATEST(attempts - 1, 0), updated_at = NOW()
            WHERE id = ANY($1) AND status = $3
            "#,
        )
        .bind(ids.to_vec())
        .bind(EmailJobStatus::Pending)
        .bind(EmailJobStatus::Sending)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }

    /// Jobs due or waiting for a retry
    pub async fn pending_count(&self) -> Result<i64, QueueError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM email_jobs WHERE status = $1")
                .bind(EmailJobStatus::Pending)
                .fetch_one(&self.db)
                .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_doubles() {
        assert_eq!(retry_delay(1), Duration::seconds(30));
        assert_eq!(retry_delay(2), Duration::seconds(60));
        assert_eq!(retry_delay(3), Duration::seconds(120));
        assert_eq!(retry_delay(4), Duration::seconds(240));
    }

    #[test]
    fn test_retry_delay_bounds() {
        assert_eq!(retry_delay(0), Duration::seconds(30));
        assert_eq!(retry_delay(-3), Duration::seconds(30));
        assert_eq!(retry_delay(8), Duration::seconds(3600));
        assert_eq!(retry_delay(i32::MAX), Duration::seconds(3600));
    }
}
