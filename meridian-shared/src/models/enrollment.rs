/// Course enrollment model
///
/// An enrollment is created `pending/pending` when a student asks to join a
/// course and only becomes `active` through payment reconciliation. One row
/// per (course, user), enforced by `course_enrollments_course_user_key`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::payment::PaymentStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "enrollment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    /// Awaiting payment
    Pending,
    /// Paid and counted against course capacity
    Active,
    Completed,
    /// Withdrawn, or paid after the course filled up
    Dropped,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Pending => "pending",
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Completed => "completed",
            EnrollmentStatus::Dropped => "dropped",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CourseEnrollment {
    pub id: Uuid,
    pub course_id: Uuid,
    pub user_id: Uuid,
    pub status: EnrollmentStatus,
    pub payment_status: PaymentStatus,
    pub payment_date: Option<DateTime<Utc>>,
    /// Percent complete, 0..=100
    pub progress: i32,
    pub enrolled_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Enrollment joined with its course, for "my courses" listings
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EnrollmentWithCourse {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub enrollment: CourseEnrollment,
    pub course_title: String,
    pub course_instructor_id: Uuid,
}

impl CourseEnrollment {
    /// Creates a pending enrollment
    ///
    /// # Errors
    ///
    /// A second enrollment for the same pair violates
    /// `course_enrollments_course_user_key`.
    pub async fn create(pool: &PgPool, course_id: Uuid, user_id: Uuid) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, CourseEnrollment>(
            r#"
            INSERT INTO course_enrollments (course_id, user_id)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(course_id)
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, CourseEnrollment>("SELECT * FROM course_enrollments WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_course_and_user(
        pool: &PgPool,
        course_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, CourseEnrollment>(
            "SELECT * FROM course_enrollments WHERE course_id = $1 AND user_id = $2",
        )
        .bind(course_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn list_for_course(pool: &PgPool, course_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, CourseEnrollment>(
            "SELECT * FROM course_enrollments WHERE course_id = $1 ORDER BY enrolled_at ASC",
        )
        .bind(course_id)
        .fetch_all(pool)
        .await
    }

    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Vec<EnrollmentWithCourse>, sqlx::Error> {
        sqlx::query_as::<_, EnrollmentWithCourse>(
            r#"
            SELECT e.*, c.title AS course_title, c.instructor_id AS course_instructor_id
            FROM course_enrollments e
            JOIN courses c ON c.id = e.course_id
            WHERE e.user_id = $1
            ORDER BY e.enrolled_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Number of active enrollments, which must equal the course counter
    pub async fn count_active(pool: &PgPool, course_id: Uuid) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM course_enrollments WHERE course_id = $1 AND status = 'active'",
        )
        .bind(course_id)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }

    /// `pending -> active` with the payment recorded
    ///
    /// Returns the activated row only for the call that performed the
    /// transition, so the course counter is incremented at most once.
    pub async fn activate(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, CourseEnrollment>(
            r#"
            UPDATE course_enrollments
            SET status = 'active',
                payment_status = 'completed',
                payment_date = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await
    }

    /// Paid but the course was full: `dropped` with the payment recorded
    pub async fn drop_paid(conn: &mut PgConnection, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE course_enrollments
            SET status = 'dropped',
                payment_status = 'completed',
                payment_date = NOW(),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(conn)
        .await?;

        Ok(())
    }
}
