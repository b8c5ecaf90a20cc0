/// Assignment, submission and marking endpoints
///
/// - `GET /v1/courses/:id/assignments` - staff or enrolled students
/// - `POST /v1/courses/:id/assignments` - instructor or admin
/// - `POST /v1/assignments/:id/submissions` - students with an active enrollment
/// - `GET /v1/assignments/:id/submissions` - staff see all, students their own
/// - `POST /v1/submissions/:id/mark` - instructor or admin

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use meridian_shared::{
    auth::{
        authorization::{require_course_access, require_owner_or_admin},
        middleware::AuthContext,
    },
    models::{
        assignment::{
            Assignment, AssignmentMark, AssignmentSubmission, CreateAssignment, SubmissionWithMark,
        },
        course::Course,
        enrollment::{CourseEnrollment, EnrollmentStatus},
    },
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

fn default_max_score() -> i32 {
    100
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAssignmentRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,

    #[serde(default)]
    pub description: String,

    pub due_date: Option<DateTime<Utc>>,

    #[serde(default = "default_max_score")]
    #[validate(range(min = 1, max = 1000, message = "Max score must be 1-1000"))]
    pub max_score: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitRequest {
    #[validate(length(min = 1, message = "Submission cannot be empty"))]
    pub content: String,

    #[validate(url(message = "Attachment must be a URL"))]
    pub attachment_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MarkRequest {
    pub score: i32,
    pub feedback: Option<String>,
}

async fn load_course(state: &AppState, course_id: Uuid) -> ApiResult<Course> {
    Course::find_by_id(&state.db, course_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Course not found".to_string()))
}

async fn load_assignment(state: &AppState, assignment_id: Uuid) -> ApiResult<(Assignment, Course)> {
    let assignment = Assignment::find_by_id(&state.db, assignment_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Assignment not found".to_string()))?;
    let course = load_course(state, assignment.course_id).await?;

    Ok((assignment, course))
}

pub async fn list_assignments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(course_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Assignment>>> {
    let course = load_course(&state, course_id).await?;
    require_course_access(&state.db, &auth, course.id, course.instructor_id).await?;

    Ok(Json(Assignment::list_for_course(&state.db, course_id).await?))
}

pub async fn create_assignment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(course_id): Path<Uuid>,
    Json(req): Json<CreateAssignmentRequest>,
) -> ApiResult<(StatusCode, Json<Assignment>)> {
    let course = load_course(&state, course_id).await?;
    require_owner_or_admin(&auth, course.instructor_id)?;
    req.validate()?;

    let assignment = Assignment::create(
        &state.db,
        CreateAssignment {
            course_id,
            title: req.title.trim().to_string(),
            description: req.description,
            due_date: req.due_date,
            max_score: req.max_score,
            created_by: auth.user_id,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(assignment)))
}

/// Submits work for an assignment
///
/// # Errors
///
/// - `403 Forbidden`: no active enrollment in the course
/// - `400 Bad Request`: past the due date
/// - `409 Conflict`: already submitted
pub async fn submit(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(assignment_id): Path<Uuid>,
    Json(req): Json<SubmitRequest>,
) -> ApiResult<(StatusCode, Json<AssignmentSubmission>)> {
    req.validate()?;
    let (assignment, course) = load_assignment(&state, assignment_id).await?;

    let enrollment = CourseEnrollment::find_by_course_and_user(&state.db, course.id, auth.user_id).await?;
    if !matches!(enrollment, Some(ref e) if e.status == EnrollmentStatus::Active) {
        return Err(ApiError::Forbidden(
            "An active enrollment is required to submit".to_string(),
        ));
    }

    if assignment.is_past_due(Utc::now()) {
        return Err(ApiError::BadRequest("Assignment is past its due date".to_string()));
    }

    let submission = AssignmentSubmission::create(
        &state.db,
        assignment.id,
        auth.user_id,
        req.content,
        req.attachment_url,
    )
    .await?;

    tracing::info!(submission_id = %submission.id, assignment_id = %assignment.id, "Assignment submitted");

    Ok((StatusCode::CREATED, Json(submission)))
}

pub async fn list_submissions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(assignment_id): Path<Uuid>,
) -> ApiResult<Json<Vec<SubmissionWithMark>>> {
    let (assignment, course) = load_assignment(&state, assignment_id).await?;
    let access = require_course_access(&state.db, &auth, course.id, course.instructor_id).await?;

    let submissions = if access.is_staff() {
        AssignmentSubmission::list_for_assignment(&state.db, assignment.id).await?
    } else {
        AssignmentSubmission::find_for_user(&state.db, assignment.id, auth.user_id)
            .await?
            .into_iter()
            .collect()
    };

    Ok(Json(submissions))
}

/// Grades a submission; grading again replaces the mark
pub async fn mark_submission(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(submission_id): Path<Uuid>,
    Json(req): Json<MarkRequest>,
) -> ApiResult<Json<AssignmentMark>> {
    let submission = AssignmentSubmission::find_by_id(&state.db, submission_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Submission not found".to_string()))?;
    let (assignment, course) = load_assignment(&state, submission.assignment_id).await?;
    require_owner_or_admin(&auth, course.instructor_id)?;

    if req.score < 0 || req.score > assignment.max_score {
        return Err(ApiError::invalid_field(
            "score",
            format!("Score must be between 0 and {}", assignment.max_score),
        ));
    }

    let mark = AssignmentMark::upsert(&state.db, &submission, auth.user_id, req.score, req.feedback).await?;

    Ok(Json(mark))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_defaults() {
        let req: CreateAssignmentRequest =
            serde_json::from_value(serde_json::json!({ "title": "Market sizing" })).unwrap();

        assert_eq!(req.max_score, 100);
        assert!(req.description.is_empty());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_submit_validation() {
        let req = SubmitRequest {
            content: String::new(),
            attachment_url: Some("not a url".to_string()),
        };

        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("content"));
        assert!(errors.field_errors().contains_key("attachment_url"));
    }
}
