/// Newsletter subscribers
///
/// One row per email address (`newsletter_subscribers_email_key`).
/// Unsubscribing keeps the row with `is_active = false`; subscribing again
/// reactivates it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NewsletterSubscriber {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub is_active: bool,
    pub welcome_sent_at: Option<DateTime<Utc>>,
    pub subscribed_at: DateTime<Utc>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
}

/// Result of a subscribe call
#[derive(Debug, Clone)]
pub enum SubscribeOutcome {
    /// New address
    Created(NewsletterSubscriber),
    /// Previously unsubscribed address, now active again
    Reactivated(NewsletterSubscriber),
    /// Address is already subscribed; nothing changed
    AlreadyActive,
}

impl NewsletterSubscriber {
    /// Subscribes an address, reactivating it if it had unsubscribed
    pub async fn subscribe(
        pool: &PgPool,
        email: &str,
        name: Option<&str>,
    ) -> Result<SubscribeOutcome, sqlx::Error> {
        // xmax = 0 only for a freshly inserted row
        let row: Option<(bool,)> = sqlx::query_as(
            r#"
            INSERT INTO newsletter_subscribers (email, name)
            VALUES ($1, $2)
            ON CONFLICT (email) DO UPDATE
            SET is_active = TRUE,
                unsubscribed_at = NULL,
                subscribed_at = NOW(),
                name = COALESCE(EXCLUDED.name, newsletter_subscribers.name)
            WHERE newsletter_subscribers.is_active = FALSE
            RETURNING (xmax = 0)
            "#,
        )
        .bind(email)
        .bind(name)
        .fetch_optional(pool)
        .await?;

        let Some((inserted,)) = row else {
            return Ok(SubscribeOutcome::AlreadyActive);
        };

        let subscriber = Self::find_by_email(pool, email)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        Ok(if inserted {
            SubscribeOutcome::Created(subscriber)
        } else {
            SubscribeOutcome::Reactivated(subscriber)
        })
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, NewsletterSubscriber>(
            "SELECT * FROM newsletter_subscribers WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(pool)
        .await
    }

    /// Returns `false` if the address was not actively subscribed
    pub async fn unsubscribe(pool: &PgPool, email: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE newsletter_subscribers
            SET is_active = FALSE, unsubscribed_at = NOW()
            WHERE email = $1 AND is_active = TRUE
            "#,
        )
        .bind(email)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list(
        pool: &PgPool,
        active_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, NewsletterSubscriber>(
            r#"
            SELECT * FROM newsletter_subscribers
            WHERE (NOT $1 OR is_active)
            ORDER BY subscribed_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(active_only)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    pub async fn count_active(pool: &PgPool) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM newsletter_subscribers WHERE is_active")
                .fetch_one(pool)
                .await?;

        Ok(count)
    }

    /// Active subscribers that have never been sent the welcome email
    ///
    /// Stamps `welcome_sent_at` in the same statement, so two concurrent
    /// campaign runs never pick the same subscriber. Run it in the
    /// transaction that enqueues the emails.
    pub async fn claim_pending_welcome(conn: &mut PgConnection) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, NewsletterSubscriber>(
            r#"
            UPDATE newsletter_subscribers
            SET welcome_sent_at = NOW()
            WHERE id IN (
                SELECT id FROM newsletter_subscribers
                WHERE is_active AND welcome_sent_at IS NULL
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .fetch_all(conn)
        .await
    }
}
