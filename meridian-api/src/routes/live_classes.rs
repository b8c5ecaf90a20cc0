/// Live class and attendance endpoints
///
/// - `GET /v1/courses/:id/live-classes` - staff or enrolled students
/// - `POST /v1/courses/:id/live-classes` - instructor or admin
/// - `PUT /v1/live-classes/:id` - instructor or admin
/// - `DELETE /v1/live-classes/:id` - instructor or admin
/// - `GET /v1/courses/:id/attendance` - instructor or admin
/// - `POST /v1/courses/:id/attendance` - instructor or admin

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
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
        course::Course,
        enrollment::CourseEnrollment,
        live_class::{
            Attendance, AttendanceStatus, CreateLiveClass, LiveClass, LiveClassStatus,
            RecordAttendance, UpdateLiveClass,
        },
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

fn default_duration() -> i32 {
    60
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateLiveClassRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[validate(url(message = "Meeting URL must be a URL"))]
    pub meeting_url: String,

    pub scheduled_at: DateTime<Utc>,

    #[serde(default = "default_duration")]
    #[validate(range(min = 1, max = 600, message = "Duration must be 1-600 minutes"))]
    pub duration_minutes: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateLiveClassRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: Option<String>,
    pub description: Option<String>,
    #[validate(url(message = "Meeting URL must be a URL"))]
    pub meeting_url: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    #[validate(range(min = 1, max = 600, message = "Duration must be 1-600 minutes"))]
    pub duration_minutes: Option<i32>,
    pub status: Option<LiveClassStatus>,
}

#[derive(Debug, Deserialize)]
pub struct RecordAttendanceRequest {
    pub live_class_id: Option<Uuid>,
    pub user_id: Uuid,
    pub status: AttendanceStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct AttendanceQuery {
    pub live_class_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: bool,
}

async fn load_course(state: &AppState, course_id: Uuid) -> ApiResult<Course> {
    Course::find_by_id(&state.db, course_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Course not found".to_string()))
}

/// Loads a live class and checks the caller runs its course
async fn load_owned_live_class(
    state: &AppState,
    auth: &AuthContext,
    live_class_id: Uuid,
) -> ApiResult<LiveClass> {
    let live_class = LiveClass::find_by_id(&state.db, live_class_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Live class not found".to_string()))?;
    let course = load_course(state, live_class.course_id).await?;
    require_owner_or_admin(auth, course.instructor_id)?;

    Ok(live_class)
}

pub async fn list_live_classes(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(course_id): Path<Uuid>,
) -> ApiResult<Json<Vec<LiveClass>>> {
    let course = load_course(&state, course_id).await?;
    require_course_access(&state.db, &auth, course.id, course.instructor_id).await?;

    Ok(Json(LiveClass::list_for_course(&state.db, course_id).await?))
}

pub async fn create_live_class(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(course_id): Path<Uuid>,
    Json(req): Json<CreateLiveClassRequest>,
) -> ApiResult<(StatusCode, Json<LiveClass>)> {
    let course = load_course(&state, course_id).await?;
    require_owner_or_admin(&auth, course.instructor_id)?;
    req.validate()?;

    let live_class = LiveClass::create(
        &state.db,
        CreateLiveClass {
            course_id,
            title: req.title.trim().to_string(),
            description: req.description,
            meeting_url: req.meeting_url,
            scheduled_at: req.scheduled_at,
            duration_minutes: req.duration_minutes,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(live_class)))
}

pub async fn update_live_class(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(live_class_id): Path<Uuid>,
    Json(req): Json<UpdateLiveClassRequest>,
) -> ApiResult<Json<LiveClass>> {
    load_owned_live_class(&state, &auth, live_class_id).await?;
    req.validate()?;

    let updated = LiveClass::update(
        &state.db,
        live_class_id,
        UpdateLiveClass {
            title: req.title.map(|t| t.trim().to_string()),
            description: req.description,
            meeting_url: req.meeting_url,
            scheduled_at: req.scheduled_at,
            duration_minutes: req.duration_minutes,
            status: req.status,
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Live class not found".to_string()))?;

    Ok(Json(updated))
}

pub async fn delete_live_class(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(live_class_id): Path<Uuid>,
) -> ApiResult<Json<DeletedResponse>> {
    load_owned_live_class(&state, &auth, live_class_id).await?;

    let deleted = LiveClass::delete(&state.db, live_class_id).await?;

    Ok(Json(DeletedResponse { deleted }))
}

pub async fn list_attendance(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(course_id): Path<Uuid>,
    Query(query): Query<AttendanceQuery>,
) -> ApiResult<Json<Vec<Attendance>>> {
    let course = load_course(&state, course_id).await?;
    require_owner_or_admin(&auth, course.instructor_id)?;

    Ok(Json(
        Attendance::list_for_course(&state.db, course_id, query.live_class_id).await?,
    ))
}

/// Records (or corrects) a student's attendance
///
/// The student must be enrolled in the course and the live class, if given,
/// must belong to it.
pub async fn record_attendance(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(course_id): Path<Uuid>,
    Json(req): Json<RecordAttendanceRequest>,
) -> ApiResult<(StatusCode, Json<Attendance>)> {
    let course = load_course(&state, course_id).await?;
    require_owner_or_admin(&auth, course.instructor_id)?;

    if let Some(live_class_id) = req.live_class_id {
        let live_class = LiveClass::find_by_id(&state.db, live_class_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Live class not found".to_string()))?;

        if live_class.course_id != course_id {
            return Err(ApiError::BadRequest(
                "Live class belongs to another course".to_string(),
            ));
        }
    }

    if CourseEnrollment::find_by_course_and_user(&state.db, course_id, req.user_id)
        .await?
        .is_none()
    {
        return Err(ApiError::BadRequest(
            "Student is not enrolled in this course".to_string(),
        ));
    }

    let attendance = Attendance::record(
        &state.db,
        RecordAttendance {
            course_id,
            live_class_id: req.live_class_id,
            user_id: req.user_id,
            status: req.status,
            recorded_by: auth.user_id,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(attendance)))
}
