/// Live class sessions and attendance records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "live_class_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LiveClassStatus {
    Scheduled,
    Live,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "attendance_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LiveClass {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub description: String,
    pub meeting_url: String,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: LiveClassStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateLiveClass {
    pub course_id: Uuid,
    pub title: String,
    pub description: String,
    pub meeting_url: String,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i32,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateLiveClass {
    pub title: Option<String>,
    pub description: Option<String>,
    pub meeting_url: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub status: Option<LiveClassStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Attendance {
    pub id: Uuid,
    pub course_id: Uuid,
    pub live_class_id: Option<Uuid>,
    pub user_id: Uuid,
    pub status: AttendanceStatus,
    pub recorded_by: Uuid,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RecordAttendance {
    pub course_id: Uuid,
    pub live_class_id: Option<Uuid>,
    pub user_id: Uuid,
    pub status: AttendanceStatus,
    pub recorded_by: Uuid,
}

impl LiveClass {
    pub async fn create(pool: &PgPool, data: CreateLiveClass) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, LiveClass>(
            r#"
            INSERT INTO live_classes
                (course_id, title, description, meeting_url, scheduled_at, duration_minutes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(data.course_id)
        .bind(data.title)
        .bind(data.description)
        .bind(data.meeting_url)
        .bind(data.scheduled_at)
        .bind(data.duration_minutes)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, LiveClass>("SELECT * FROM live_classes WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_course(pool: &PgPool, course_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, LiveClass>(
            "SELECT * FROM live_classes WHERE course_id = $1 ORDER BY scheduled_at ASC",
        )
        .bind(course_id)
        .fetch_all(pool)
        .await
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateLiveClass,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, LiveClass>(
            r#"
            UPDATE live_classes
            SET title = COALESCE($2, title),
                description = COALESCE($3, description),
                meeting_url = COALESCE($4, meeting_url),
                scheduled_at = COALESCE($5, scheduled_at),
                duration_minutes = COALESCE($6, duration_minutes),
                status = COALESCE($7, status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(data.title)
        .bind(data.description)
        .bind(data.meeting_url)
        .bind(data.scheduled_at)
        .bind(data.duration_minutes)
        .bind(data.status)
        .fetch_optional(pool)
        .await
    }

    /// Deletes a live class and the attendance recorded against it
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM attendance WHERE live_class_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM live_classes WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }
}

impl Attendance {
    /// Records attendance; marking the same student for the same live class
    /// again overwrites the status
    pub async fn record(pool: &PgPool, data: RecordAttendance) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Attendance>(
            r#"
            INSERT INTO attendance (course_id, live_class_id, user_id, status, recorded_by)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT ON CONSTRAINT attendance_live_class_user_key DO UPDATE
            SET status = EXCLUDED.status,
                recorded_by = EXCLUDED.recorded_by,
                recorded_at = NOW()
            RETURNING *
            "#,
        )
        .bind(data.course_id)
        .bind(data.live_class_id)
        .bind(data.user_id)
        .bind(data.status)
        .bind(data.recorded_by)
        .fetch_one(pool)
        .await
    }

    pub async fn list_for_course(
        pool: &PgPool,
        course_id: Uuid,
        live_class_id: Option<Uuid>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Attendance>(
            r#"
            SELECT * FROM attendance
            WHERE course_id = $1 AND ($2::uuid IS NULL OR live_class_id = $2)
            ORDER BY recorded_at DESC
            "#,
        )
        .bind(course_id)
        .bind(live_class_id)
        .fetch_all(pool)
        .await
    }
}
