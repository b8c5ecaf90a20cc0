/// Course model and database operations
///
/// A course owns its enrollments, assignments (with their submissions and
/// marks), live classes and attendance records. [`Course::delete_cascade`]
/// removes all of them in one transaction.
///
/// `enrolled_students` counts active enrollments. It only moves through
/// [`Course::try_increment_enrolled`], whose guard together with the
/// `courses_capacity_check` constraint keeps it at or below `max_students`.
///
/// # Example
///
/// ```no_run
/// use meridian_shared::models::course::{Course, CourseFilter};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let courses = Course::list(&pool, &CourseFilter::default(), 20, 0).await?;
/// for course in courses {
///     println!("{}: {}/{}", course.title, course.enrolled_students, course.max_students);
/// }
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "course_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CourseStatus {
    /// Open for enrollment
    Active,
    Inactive,
    Completed,
}

impl CourseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseStatus::Active => "active",
            CourseStatus::Inactive => "inactive",
            CourseStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub price_minor: i64,
    pub currency: String,
    pub instructor_id: Uuid,
    pub max_students: i32,
    pub enrolled_students: i32,
    pub status: CourseStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Course {
    /// Advisory check used at enrollment time; the hard guarantee is the
    /// guarded increment during reconciliation
    pub fn is_full(&self) -> bool {
        self.enrolled_students >= self.max_students
    }

    pub fn seats_left(&self) -> i32 {
        (self.max_students - self.enrolled_students).max(0)
    }
}

#[derive(Debug, Clone)]
pub struct CreateCourse {
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub price_minor: i64,
    pub currency: String,
    pub instructor_id: Uuid,
    pub max_students: i32,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Partial update; `None` leaves a field untouched
#[derive(Debug, Clone, Default)]
pub struct UpdateCourse {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<Option<String>>,
    pub price_minor: Option<i64>,
    pub max_students: Option<i32>,
    pub status: Option<CourseStatus>,
    pub start_date: Option<Option<DateTime<Utc>>>,
    pub end_date: Option<Option<DateTime<Utc>>>,
}

/// Listing filter for the public catalogue
#[derive(Debug, Clone, Default)]
pub struct CourseFilter {
    pub status: Option<CourseStatus>,
    pub category: Option<String>,
    pub instructor_id: Option<Uuid>,
}

/// Rows removed by a course deletion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    pub marks: u64,
    pub submissions: u64,
    pub assignments: u64,
    pub enrollments: u64,
    pub attendance: u64,
    pub live_classes: u64,
}

impl Course {
    pub async fn create(pool: &PgPool, data: CreateCourse) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Course>(
            r#"
            INSERT INTO courses
                (title, description, category, price_minor, currency, instructor_id,
                 max_students, start_date, end_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(data.title)
        .bind(data.description)
        .bind(data.category)
        .bind(data.price_minor)
        .bind(data.currency)
        .bind(data.instructor_id)
        .bind(data.max_students)
        .bind(data.start_date)
        .bind(data.end_date)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Lists courses, newest first
    pub async fn list(
        pool: &PgPool,
        filter: &CourseFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Course>(
            r#"
            SELECT * FROM courses
            WHERE ($1::course_status IS NULL OR status = $1)
              AND ($2::text IS NULL OR category = $2)
              AND ($3::uuid IS NULL OR instructor_id = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.status)
        .bind(filter.category.as_deref())
        .bind(filter.instructor_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateCourse,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE courses SET updated_at = NOW()");
        let mut bind_count = 1;

        let mut push = |column: &str, query: &mut String| {
            bind_count += 1;
            query.push_str(&format!(", {} = ${}", column, bind_count));
        };

        if data.title.is_some() {
            push("title", &mut query);
        }
        if data.description.is_some() {
            push("description", &mut query);
        }
        if data.category.is_some() {
            push("category", &mut query);
        }
        if data.price_minor.is_some() {
            push("price_minor", &mut query);
        }
        if data.max_students.is_some() {
            push("max_students", &mut query);
        }
        if data.status.is_some() {
            push("status", &mut query);
        }
        if data.start_date.is_some() {
            push("start_date", &mut query);
        }
        if data.end_date.is_some() {
            push("end_date", &mut query);
        }

        query.push_str(" WHERE id = $1 RETURNING *");

        let mut q = sqlx::query_as::<_, Course>(&query).bind(id);

        if let Some(title) = data.title {
            q = q.bind(title);
        }
        if let Some(description) = data.description {
            q = q.bind(description);
        }
        if let Some(category) = data.category {
            q = q.bind(category);
        }
        if let Some(price_minor) = data.price_minor {
            q = q.bind(price_minor);
        }
        if let Some(max_students) = data.max_students {
            q = q.bind(max_students);
        }
        if let Some(status) = data.status {
            q = q.bind(status);
        }
        if let Some(start_date) = data.start_date {
            q = q.bind(start_date);
        }
        if let Some(end_date) = data.end_date {
            q = q.bind(end_date);
        }

        q.fetch_optional(pool).await
    }

    /// Takes one seat if any is left
    ///
    /// Returns `false` when the course is full (or gone); the counter is
    /// then unchanged.
    pub async fn try_increment_enrolled(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE courses
            SET enrolled_students = enrolled_students + 1, updated_at = NOW()
            WHERE id = $1 AND enrolled_students < max_students
            "#,
        )
        .bind(id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Deletes a course and everything it owns in one transaction
    ///
    /// Order: marks and submissions of the course's assignments, assignments,
    /// enrollments, attendance, live classes, then the course row. Payments
    /// that referenced a deleted enrollment are kept with `enrollment_id`
    /// set to NULL by the foreign key.
    ///
    /// Returns `None` (and changes nothing) if the course does not exist.
    /// Any failure rolls the whole deletion back.
    pub async fn delete_cascade(
        pool: &PgPool,
        id: Uuid,
    ) -> Result<Option<CascadeReport>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        // Blocks concurrent enrollments (their FK check needs a key-share lock)
        let exists: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM courses WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        if exists.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        let mut report = CascadeReport::default();

        report.marks = sqlx::query(
            "DELETE FROM assignment_marks WHERE assignment_id IN \
             (SELECT id FROM assignments WHERE course_id = $1)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        report.submissions = sqlx::query(
            "DELETE FROM assignment_submissions WHERE assignment_id IN \
             (SELECT id FROM assignments WHERE course_id = $1)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        report.assignments = sqlx::query("DELETE FROM assignments WHERE course_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        report.enrollments = sqlx::query("DELETE FROM course_enrollments WHERE course_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        report.attendance = sqlx::query("DELETE FROM attendance WHERE course_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        report.live_classes = sqlx::query("DELETE FROM live_classes WHERE course_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            course_id = %id,
            enrollments = report.enrollments,
            assignments = report.assignments,
            live_classes = report.live_classes,
            "Course deleted"
        );

        Ok(Some(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course(enrolled: i32, max: i32) -> Course {
        let now = Utc::now();
        Course {
            id: Uuid::new_v4(),
            title: "Strategy 101".to_string(),
            description: String::new(),
            category: None,
            price_minor: 2_500_000,
            currency: "NGN".to_string(),
            instructor_id: Uuid::new_v4(),
            max_students: max,
            enrolled_students: enrolled,
            status: CourseStatus::Active,
            start_date: None,
            end_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_capacity_helpers() {
        assert!(!course(0, 1).is_full());
        assert!(course(1, 1).is_full());
        assert_eq!(course(3, 10).seats_left(), 7);
        assert_eq!(course(10, 10).seats_left(), 0);
    }

    #[test]
    fn test_course_status_serde() {
        assert_eq!(CourseStatus::Inactive.as_str(), "inactive");
        assert_eq!(
            serde_json::from_str::<CourseStatus>("\"completed\"").unwrap(),
            CourseStatus::Completed
        );
    }
}
