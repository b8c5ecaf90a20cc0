/// Course catalogue and enrollment endpoints
///
/// - `GET /v1/courses` - List courses (public)
/// - `GET /v1/courses/:id` - Get a course (public)
/// - `POST /v1/courses` - Create a course (admin)
/// - `PUT /v1/courses/:id` - Update (instructor or admin)
/// - `DELETE /v1/courses/:id` - Delete with everything the course owns (instructor or admin)
/// - `POST /v1/courses/:id/enroll` - Request enrollment
/// - `GET /v1/courses/:id/enrollments` - Course roster (instructor or admin)
/// - `GET /v1/enrollments/me` - The caller's enrollments
///
/// Enrolling only creates a `pending` enrollment. It becomes `active`, and
/// takes a seat, when its payment is reconciled.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{double_option, Page, Pagination},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use meridian_shared::{
    auth::{
        authorization::{require_admin, require_owner_or_admin},
        middleware::AuthContext,
    },
    models::{
        course::{CascadeReport, Course, CourseFilter, CourseStatus, CreateCourse, UpdateCourse},
        enrollment::{CourseEnrollment, EnrollmentWithCourse},
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Default, Deserialize)]
pub struct CourseQuery {
    pub status: Option<CourseStatus>,
    pub category: Option<String>,
    pub instructor_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCourseRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[validate(length(max = 100, message = "Category must be at most 100 characters"))]
    pub category: Option<String>,

    #[validate(range(min = 0, message = "Price cannot be negative"))]
    pub price_minor: i64,

    /// Defaults to the platform currency
    #[validate(length(equal = 3, message = "Currency must be a 3-letter code"))]
    pub currency: Option<String>,

    /// Defaults to the caller
    pub instructor_id: Option<Uuid>,

    #[validate(range(min = 1, message = "A course needs at least one seat"))]
    pub max_students: i32,

    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCourseRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: Option<String>,

    pub description: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub category: Option<Option<String>>,

    #[validate(range(min = 0, message = "Price cannot be negative"))]
    pub price_minor: Option<i64>,

    #[validate(range(min = 1, message = "A course needs at least one seat"))]
    pub max_students: Option<i32>,

    pub status: Option<CourseStatus>,

    #[serde(default, deserialize_with = "double_option")]
    pub start_date: Option<Option<DateTime<Utc>>>,

    #[serde(default, deserialize_with = "double_option")]
    pub end_date: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Serialize)]
pub struct DeleteCourseResponse {
    pub deleted: bool,
    pub removed: CascadeReport,
}

fn check_dates(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> ApiResult<()> {
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(ApiError::invalid_field(
                "end_date",
                "End date must not be before start date",
            ));
        }
    }
    Ok(())
}

async fn load_course(state: &AppState, course_id: Uuid) -> ApiResult<Course> {
    Course::find_by_id(&state.db, course_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Course not found".to_string()))
}

pub async fn list_courses(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    Query(query): Query<CourseQuery>,
) -> ApiResult<Json<Page<Course>>> {
    let filter = CourseFilter {
        status: query.status,
        category: query.category,
        instructor_id: query.instructor_id,
    };

    let courses = Course::list(&state.db, &filter, pagination.limit(), pagination.offset()).await?;

    Ok(Json(Page::new(courses, &pagination)))
}

pub async fn get_course(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
) -> ApiResult<Json<Course>> {
    Ok(Json(load_course(&state, course_id).await?))
}

pub async fn create_course(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateCourseRequest>,
) -> ApiResult<(StatusCode, Json<Course>)> {
    require_admin(&auth)?;
    req.validate()?;
    check_dates(req.start_date, req.end_date)?;

    let course = Course::create(
        &state.db,
        CreateCourse {
            title: req.title.trim().to_string(),
            description: req.description,
            category: req.category,
            price_minor: req.price_minor,
            currency: req
                .currency
                .map(|c| c.to_uppercase())
                .unwrap_or_else(|| state.config.payment.currency.clone()),
            instructor_id: req.instructor_id.unwrap_or(auth.user_id),
            max_students: req.max_students,
            start_date: req.start_date,
            end_date: req.end_date,
        },
    )
    .await?;

    tracing::info!(course_id = %course.id, instructor_id = %course.instructor_id, "Course created");

    Ok((StatusCode::CREATED, Json(course)))
}

pub async fn update_course(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(course_id): Path<Uuid>,
    Json(req): Json<UpdateCourseRequest>,
) -> ApiResult<Json<Course>> {
    let course = load_course(&state, course_id).await?;
    require_owner_or_admin(&auth, course.instructor_id)?;
    req.validate()?;

    let start = req.start_date.unwrap_or(course.start_date);
    let end = req.end_date.unwrap_or(course.end_date);
    check_dates(start, end)?;

    if let Some(max_students) = req.max_students {
        if max_students < course.enrolled_students {
            return Err(ApiError::invalid_field(
                "max_students",
                format!(
                    "Cannot go below the {} students already enrolled",
                    course.enrolled_students
                ),
            ));
        }
    }

    let updated = Course::update(
        &state.db,
        course_id,
        UpdateCourse {
            title: req.title.map(|t| t.trim().to_string()),
            description: req.description,
            category: req.category,
            price_minor: req.price_minor,
            max_students: req.max_students,
            status: req.status,
            start_date: req.start_date,
            end_date: req.end_date,
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Course not found".to_string()))?;

    Ok(Json(updated))
}

/// Deletes a course and everything it owns in one transaction
///
/// Payments for its enrollments are kept, detached from the deleted rows.
pub async fn delete_course(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(course_id): Path<Uuid>,
) -> ApiResult<Json<DeleteCourseResponse>> {
    let course = load_course(&state, course_id).await?;
    require_owner_or_admin(&auth, course.instructor_id)?;

    let removed = Course::delete_cascade(&state.db, course_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Course not found".to_string()))?;

    tracing::info!(course_id = %course_id, actor = %auth.user_id, "Course deleted");

    Ok(Json(DeleteCourseResponse {
        deleted: true,
        removed,
    }))
}

/// Requests enrollment in a course
///
/// # Errors
///
/// - `400 Bad Request`: the course is not open for enrollment
/// - `409 Conflict`: already enrolled, or the course is full
pub async fn enroll(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(course_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<CourseEnrollment>)> {
    let course = load_course(&state, course_id).await?;

    if course.status != CourseStatus::Active {
        return Err(ApiError::BadRequest(
            "Course is not open for enrollment".to_string(),
        ));
    }

    if CourseEnrollment::find_by_course_and_user(&state.db, course_id, auth.user_id)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict("Already enrolled".to_string()));
    }

    if course.is_full() {
        return Err(ApiError::Conflict("Course is full".to_string()));
    }

    // A concurrent duplicate still hits course_enrollments_course_user_key
    let enrollment = CourseEnrollment::create(&state.db, course_id, auth.user_id).await?;

    tracing::info!(
        enrollment_id = %enrollment.id,
        course_id = %course_id,
        user_id = %auth.user_id,
        "Enrollment requested"
    );

    Ok((StatusCode::CREATED, Json(enrollment)))
}

pub async fn list_enrollments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(course_id): Path<Uuid>,
) -> ApiResult<Json<Vec<CourseEnrollment>>> {
    let course = load_course(&state, course_id).await?;
    require_owner_or_admin(&auth, course.instructor_id)?;

    Ok(Json(CourseEnrollment::list_for_course(&state.db, course_id).await?))
}

pub async fn my_enrollments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<EnrollmentWithCourse>>> {
    Ok(Json(CourseEnrollment::list_for_user(&state.db, auth.user_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_check_dates() {
        let now = Utc::now();

        assert!(check_dates(None, None).is_ok());
        assert!(check_dates(Some(now), None).is_ok());
        assert!(check_dates(Some(now), Some(now + Duration::days(30))).is_ok());
        assert!(check_dates(Some(now), Some(now - Duration::days(1))).is_err());
    }

    #[test]
    fn test_create_course_validation() {
        let req: CreateCourseRequest = serde_json::from_value(serde_json::json!({
            "title": "",
            "price_minor": -1,
            "currency": "NAIRA",
            "max_students": 0
        }))
        .unwrap();

        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("title"));
        assert!(fields.contains_key("price_minor"));
        assert!(fields.contains_key("currency"));
        assert!(fields.contains_key("max_students"));
    }

    #[test]
    fn test_update_course_null_clears_category() {
        let req: UpdateCourseRequest =
            serde_json::from_value(serde_json::json!({ "category": null })).unwrap();
        assert_eq!(req.category, Some(None));
        assert!(req.title.is_none());
    }
}
