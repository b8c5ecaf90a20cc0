/// Consultation appointment booked by a user
///
/// The fee is fixed at booking time from configuration. An appointment is
/// `pending` until its payment is reconciled, which moves it to `confirmed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::payment::PaymentStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "appointment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    /// Whether an admin may move an appointment from `self` to `next`
    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;

        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Completed)
                | (Confirmed, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Appointment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub service: String,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub notes: Option<String>,
    pub status: AppointmentStatus,
    pub fee_minor: i64,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateAppointment {
    pub user_id: Uuid,
    pub service: String,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub notes: Option<String>,
    pub fee_minor: i64,
}

impl Appointment {
    pub async fn create(pool: &PgPool, data: CreateAppointment) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Appointment>(
            r#"
            INSERT INTO appointments (user_id, service, scheduled_at, duration_minutes, notes, fee_minor)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(data.user_id)
        .bind(data.service)
        .bind(data.scheduled_at)
        .bind(data.duration_minutes)
        .bind(data.notes)
        .bind(data.fee_minor)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Appointment>("SELECT * FROM appointments WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Lists appointments, soonest first; `user_id = None` lists everyone's
    pub async fn list(
        pool: &PgPool,
        user_id: Option<Uuid>,
        status: Option<AppointmentStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Appointment>(
            r#"
            SELECT * FROM appointments
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND ($2::appointment_status IS NULL OR status = $2)
            ORDER BY scheduled_at ASC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    /// Moves the appointment to `next` only if it is still in `current`
    ///
    /// Returns `None` if another request changed the status first.
    pub async fn transition(
        pool: &PgPool,
        id: Uuid,
        current: AppointmentStatus,
        next: AppointmentStatus,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Appointment>(
            r#"
            UPDATE appointments
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(current)
        .bind(next)
        .fetch_optional(pool)
        .await
    }

    /// Records the payment and confirms a pending appointment
    ///
    /// Returns `true` if this call changed the payment status.
    pub async fn confirm_payment(conn: &mut PgConnection, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE appointments
            SET payment_status = 'completed',
                status = CASE WHEN status = 'pending'
                              THEN 'confirmed'::appointment_status
                              ELSE status END,
                updated_at = NOW()
            WHERE id = $1 AND payment_status <> 'completed'
            "#,
        )
        .bind(id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
