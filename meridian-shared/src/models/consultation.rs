/// Consultation requests submitted from the public contact form
///
/// Anyone may submit one; a signed-in submitter is linked by `user_id`.
/// Admins work the request through `new -> contacted -> scheduled -> closed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "consultation_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConsultationStatus {
    New,
    Contacted,
    Scheduled,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ConsultationRequest {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub service: String,
    pub message: String,
    pub preferred_date: Option<DateTime<Utc>>,
    pub status: ConsultationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateConsultation {
    pub user_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub service: String,
    pub message: String,
    pub preferred_date: Option<DateTime<Utc>>,
}

impl ConsultationRequest {
    pub async fn create(pool: &PgPool, data: CreateConsultation) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ConsultationRequest>(
            r#"
            INSERT INTO consultation_requests
                (user_id, name, email, phone, company, service, message, preferred_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(data.user_id)
        .bind(data.name)
        .bind(data.email)
        .bind(data.phone)
        .bind(data.company)
        .bind(data.service)
        .bind(data.message)
        .bind(data.preferred_date)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ConsultationRequest>("SELECT * FROM consultation_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(
        pool: &PgPool,
        status: Option<ConsultationStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ConsultationRequest>(
            r#"
            SELECT * FROM consultation_requests
            WHERE ($1::consultation_status IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    pub async fn update_status(
        pool: &PgPool,
        id: Uuid,
        status: ConsultationStatus,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ConsultationRequest>(
            r#"
            UPDATE consultation_requests
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .fetch_optional(pool)
        .await
    }
}
