/// Payment model and database operations
///
/// A payment funds at most one target, either a course enrollment or an
/// appointment (`payments_single_target_check`). Deleting the target sets
/// the foreign key to NULL so payment history survives a course deletion.
///
/// State changes that take part in reconciliation take a `&mut PgConnection`
/// so they run inside the caller's transaction, and every one of them is a
/// guarded conditional update: it reports whether it actually changed the
/// row rather than reading first and writing second.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Payment status, shared by payments, enrollments and appointments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

/// What a payment pays for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum PaymentTarget {
    Enrollment(Uuid),
    Appointment(Uuid),
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub enrollment_id: Option<Uuid>,

    /// Amount in minor currency units (kobo, cents)
    pub amount_minor: i64,
    pub currency: String,

    /// Gateway transaction reference, unique
    pub reference: String,
    pub authorization_url: Option<String>,
    pub status: PaymentStatus,

    /// Gateway channel (card, bank, ussd, ...)
    pub payment_method: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,

    /// Set when the payment succeeded but the course was already full
    pub refund_required: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// The payment's target, if it still has one
    pub fn target(&self) -> Option<PaymentTarget> {
        match (self.enrollment_id, self.appointment_id) {
            (Some(id), _) => Some(PaymentTarget::Enrollment(id)),
            (None, Some(id)) => Some(PaymentTarget::Appointment(id)),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub user_id: Uuid,
    pub target: PaymentTarget,
    pub amount_minor: i64,
    pub currency: String,
    pub reference: String,
    pub authorization_url: Option<String>,
}

impl Payment {
    /// Records a pending payment
    ///
    /// # Errors
    ///
    /// A reused reference violates `payments_reference_key`.
    pub async fn create(pool: &PgPool, data: CreatePayment) -> Result<Self, sqlx::Error> {
        let (enrollment_id, appointment_id) = match data.target {
            PaymentTarget::Enrollment(id) => (Some(id), None),
            PaymentTarget::Appointment(id) => (None, Some(id)),
        };

        sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments
                (user_id, enrollment_id, appointment_id, amount_minor, currency,
                 reference, authorization_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(data.user_id)
        .bind(enrollment_id)
        .bind(appointment_id)
        .bind(data.amount_minor)
        .bind(data.currency)
        .bind(data.reference)
        .bind(data.authorization_url)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_reference(
        pool: &PgPool,
        reference: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE reference = $1")
            .bind(reference)
            .fetch_optional(pool)
            .await
    }

    /// Latest pending payment for a target, reused instead of opening a
    /// second gateway transaction for the same enrollment or appointment
    pub async fn find_pending_for_target(
        pool: &PgPool,
        target: PaymentTarget,
    ) -> Result<Option<Self>, sqlx::Error> {
        let (column, id) = match target {
            PaymentTarget::Enrollment(id) => ("enrollment_id", id),
            PaymentTarget::Appointment(id) => ("appointment_id", id),
        };

        sqlx::query_as::<_, Payment>(&format!(
            "SELECT * FROM payments WHERE {} = $1 AND status = 'pending' \
             ORDER BY created_at DESC LIMIT 1",
            column
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Locks the payment row for the rest of the transaction
    pub async fn lock_by_reference(
        conn: &mut PgConnection,
        reference: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE reference = $1 FOR UPDATE")
            .bind(reference)
            .fetch_optional(conn)
            .await
    }

    /// Locks the payment row for the rest of the transaction
    pub async fn lock_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// `status -> completed` unless already completed
    ///
    /// Returns `true` only for the call that performed the transition.
    pub async fn mark_completed(
        conn: &mut PgConnection,
        id: Uuid,
        payment_method: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'completed',
                verified_at = NOW(),
                payment_method = COALESCE($2, payment_method),
                updated_at = NOW()
            WHERE id = $1 AND status <> 'completed'
            "#,
        )
        .bind(id)
        .bind(payment_method)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// `pending -> failed`; a completed payment is never downgraded
    pub async fn mark_failed(conn: &mut PgConnection, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'failed', verified_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn flag_refund_required(conn: &mut PgConnection, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE payments SET refund_required = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await?;

        Ok(())
    }

    /// Payments made by a user, newest first
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            SELECT * FROM payments
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    /// All payments, newest first, optionally filtered by status
    pub async fn list_all(
        pool: &PgPool,
        status: Option<PaymentStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            SELECT * FROM payments
            WHERE ($1::payment_status IS NULL OR status = $1)
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
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(enrollment_id: Option<Uuid>, appointment_id: Option<Uuid>) -> Payment {
        let now = Utc::now();
        Payment {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            appointment_id,
            enrollment_id,
            amount_minor: 1_500_000,
            currency: "NGN".to_string(),
            reference: "MRD-abc".to_string(),
            authorization_url: None,
            status: PaymentStatus::Pending,
            payment_method: None,
            verified_at: None,
            refund_required: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_payment_target() {
        let id = Uuid::new_v4();
        assert_eq!(payment(Some(id), None).target(), Some(PaymentTarget::Enrollment(id)));
        assert_eq!(payment(None, Some(id)).target(), Some(PaymentTarget::Appointment(id)));
        assert_eq!(payment(None, None).target(), None);
    }

    #[test]
    fn test_payment_status_serde() {
        assert_eq!(
            serde_json::to_string(&PaymentStatus::Completed).unwrap(),
            "\"completed\""
        );
        assert_eq!(PaymentStatus::Failed.as_str(), "failed");
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Completed.is_terminal());
    }

    #[test]
    fn test_payment_target_serde() {
        let id = Uuid::nil();
        let json = serde_json::to_value(PaymentTarget::Appointment(id)).unwrap();
        assert_eq!(json["type"], "appointment");
        assert_eq!(json["id"], id.to_string());
    }
}
