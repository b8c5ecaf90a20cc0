/// Assignments, student submissions and marks
///
/// An assignment belongs to a course. Each student submits at most once
/// per assignment (`assignment_submissions_assignment_user_key`) and each
/// submission receives at most one mark (`assignment_marks_submission_key`);
/// re-marking updates the existing row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Assignment {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub description: String,
    pub due_date: Option<DateTime<Utc>>,
    pub max_score: i32,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Assignment {
    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        self.due_date.map_or(false, |due| now > due)
    }
}

#[derive(Debug, Clone)]
pub struct CreateAssignment {
    pub course_id: Uuid,
    pub title: String,
    pub description: String,
    pub due_date: Option<DateTime<Utc>>,
    pub max_score: i32,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AssignmentSubmission {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub attachment_url: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Submission with its mark, if graded
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SubmissionWithMark {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub submission: AssignmentSubmission,
    pub score: Option<i32>,
    pub feedback: Option<String>,
    pub graded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AssignmentMark {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub assignment_id: Uuid,
    pub graded_by: Uuid,
    pub score: i32,
    pub feedback: Option<String>,
    pub graded_at: DateTime<Utc>,
}

impl Assignment {
    pub async fn create(pool: &PgPool, data: CreateAssignment) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Assignment>(
            r#"
            INSERT INTO assignments (course_id, title, description, due_date, max_score, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(data.course_id)
        .bind(data.title)
        .bind(data.description)
        .bind(data.due_date)
        .bind(data.max_score)
        .bind(data.created_by)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Assignment>("SELECT * FROM assignments WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_course(pool: &PgPool, course_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Assignment>(
            "SELECT * FROM assignments WHERE course_id = $1 ORDER BY due_date ASC NULLS LAST, created_at ASC",
        )
        .bind(course_id)
        .fetch_all(pool)
        .await
    }
}

impl AssignmentSubmission {
    /// # Errors
    ///
    /// A second submission violates `assignment_submissions_assignment_user_key`.
    pub async fn create(
        pool: &PgPool,
        assignment_id: Uuid,
        user_id: Uuid,
        content: String,
        attachment_url: Option<String>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, AssignmentSubmission>(
            r#"
            INSERT INTO assignment_submissions (assignment_id, user_id, content, attachment_url)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(assignment_id)
        .bind(user_id)
        .bind(content)
        .bind(attachment_url)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, AssignmentSubmission>(
            "SELECT * FROM assignment_submissions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// All submissions for an assignment with their marks
    pub async fn list_for_assignment(
        pool: &PgPool,
        assignment_id: Uuid,
    ) -> Result<Vec<SubmissionWithMark>, sqlx::Error> {
        sqlx::query_as::<_, SubmissionWithMark>(
            r#"
            SELECT s.*, m.score, m.feedback, m.graded_at
            FROM assignment_submissions s
            LEFT JOIN assignment_marks m ON m.submission_id = s.id
            WHERE s.assignment_id = $1
            ORDER BY s.submitted_at ASC
            "#,
        )
        .bind(assignment_id)
        .fetch_all(pool)
        .await
    }

    /// One student's submission for an assignment, with its mark
    pub async fn find_for_user(
        pool: &PgPool,
        assignment_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<SubmissionWithMark>, sqlx::Error> {
        sqlx::query_as::<_, SubmissionWithMark>(
            r#"
            SELECT s.*, m.score, m.feedback, m.graded_at
            FROM assignment_submissions s
            LEFT JOIN assignment_marks m ON m.submission_id = s.id
            WHERE s.assignment_id = $1 AND s.user_id = $2
            "#,
        )
        .bind(assignment_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }
}

impl AssignmentMark {
    /// Grades a submission, replacing any earlier mark
    pub async fn upsert(
        pool: &PgPool,
        submission: &AssignmentSubmission,
        graded_by: Uuid,
        score: i32,
        feedback: Option<String>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, AssignmentMark>(
            r#"
            INSERT INTO assignment_marks (submission_id, assignment_id, graded_by, score, feedback)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT ON CONSTRAINT assignment_marks_submission_key DO UPDATE
            SET graded_by = EXCLUDED.graded_by,
                score = EXCLUDED.score,
                feedback = EXCLUDED.feedback,
                graded_at = NOW()
            RETURNING *
            "#,
        )
        .bind(submission.id)
        .bind(submission.assignment_id)
        .bind(graded_by)
        .bind(score)
        .bind(feedback)
        .fetch_one(pool)
        .await
    }
}
