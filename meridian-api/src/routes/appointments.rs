/// Appointment endpoints
///
/// - `POST /v1/appointments` - Book an appointment
/// - `GET /v1/appointments` - The caller's appointments (admins see all)
/// - `GET /v1/appointments/:id` - Owner or admin
/// - `PUT /v1/appointments/:id/status` - Move through the status machine (admin)
/// - `POST /v1/appointments/:id/cancel` - Owner or admin
///
/// A new appointment is `pending` and carries the configured fee. Paying it
/// confirms it; see `payments`.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{Page, Pagination},
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
    models::appointment::{Appointment, AppointmentStatus, CreateAppointment},
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

fn default_duration() -> i32 {
    60
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAppointmentRequest {
    #[validate(length(min = 1, max = 255, message = "Service must be 1-255 characters"))]
    pub service: String,

    pub scheduled_at: DateTime<Utc>,

    #[serde(default = "default_duration")]
    #[validate(range(min = 15, max = 480, message = "Duration must be 15-480 minutes"))]
    pub duration_minutes: i32,

    #[validate(length(max = 2000, message = "Notes must be at most 2000 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AppointmentQuery {
    pub status: Option<AppointmentStatus>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
}

async fn load_appointment(state: &AppState, appointment_id: Uuid) -> ApiResult<Appointment> {
    Appointment::find_by_id(&state.db, appointment_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Appointment not found".to_string()))
}

/// Applies a status change guarded on the current status
async fn apply_transition(
    state: &AppState,
    appointment: &Appointment,
    next: AppointmentStatus,
) -> ApiResult<Appointment> {
    if !appointment.status.can_transition_to(next) {
        return Err(ApiError::BadRequest(format!(
            "Cannot move appointment from {} to {}",
            appointment.status.as_str(),
            next.as_str()
        )));
    }

    Appointment::transition(&state.db, appointment.id, appointment.status, next)
        .await?
        .ok_or_else(|| ApiError::Conflict("Appointment was modified concurrently".to_string()))
}

pub async fn create_appointment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateAppointmentRequest>,
) -> ApiResult<(StatusCode, Json<Appointment>)> {
    req.validate()?;

    if req.scheduled_at <= Utc::now() {
        return Err(ApiError::invalid_field(
            "scheduled_at",
            "Appointments must be scheduled in the future",
        ));
    }

    let appointment = Appointment::create(
        &state.db,
        CreateAppointment {
            user_id: auth.user_id,
            service: req.service.trim().to_string(),
            scheduled_at: req.scheduled_at,
            duration_minutes: req.duration_minutes,
            notes: req.notes,
            fee_minor: state.config.payment.appointment_fee_minor,
        },
    )
    .await?;

    tracing::info!(
        appointment_id = %appointment.id,
        user_id = %auth.user_id,
        "Appointment booked"
    );

    Ok((StatusCode::CREATED, Json(appointment)))
}

pub async fn list_appointments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(pagination): Query<Pagination>,
    Query(query): Query<AppointmentQuery>,
) -> ApiResult<Json<Page<Appointment>>> {
    let owner = if auth.is_admin { None } else { Some(auth.user_id) };

    let appointments = Appointment::list(
        &state.db,
        owner,
        query.status,
        pagination.limit(),
        pagination.offset(),
    )
    .await?;

    Ok(Json(Page::new(appointments, &pagination)))
}

pub async fn get_appointment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(appointment_id): Path<Uuid>,
) -> ApiResult<Json<Appointment>> {
    let appointment = load_appointment(&state, appointment_id).await?;
    require_owner_or_admin(&auth, appointment.user_id)?;

    Ok(Json(appointment))
}

pub async fn update_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(appointment_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> ApiResult<Json<Appointment>> {
    require_admin(&auth)?;

    let appointment = load_appointment(&state, appointment_id).await?;
    let updated = apply_transition(&state, &appointment, req.status).await?;

    tracing::info!(
        appointment_id = %updated.id,
        actor = %auth.user_id,
        status = updated.status.as_str(),
        "Appointment status changed"
    );

    Ok(Json(updated))
}

pub async fn cancel_appointment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(appointment_id): Path<Uuid>,
) -> ApiResult<Json<Appointment>> {
    let appointment = load_appointment(&state, appointment_id).await?;
    require_owner_or_admin(&auth, appointment.user_id)?;

    let cancelled = apply_transition(&state, &appointment, AppointmentStatus::Cancelled).await?;

    tracing::info!(appointment_id = %cancelled.id, actor = %auth.user_id, "Appointment cancelled");

    Ok(Json(cancelled))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_appointment_defaults() {
        let req: CreateAppointmentRequest = serde_json::from_value(serde_json::json!({
            "service": "Business strategy",
            "scheduled_at": "2026-05-04T10:00:00Z"
        }))
        .unwrap();

        assert_eq!(req.duration_minutes, 60);
        assert!(req.notes.is_none());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_create_appointment_rejects_short_slot() {
        let req: CreateAppointmentRequest = serde_json::from_value(serde_json::json!({
            "service": "Business strategy",
            "scheduled_at": "2026-05-04T10:00:00Z",
            "duration_minutes": 5
        }))
        .unwrap();

        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("duration_minutes"));
    }

    #[test]
    fn test_status_request_parsing() {
        let req: UpdateStatusRequest =
            serde_json::from_value(serde_json::json!({ "status": "completed" })).unwrap();
        assert_eq!(req.status, AppointmentStatus::Completed);

        assert!(serde_json::from_value::<UpdateStatusRequest>(
            serde_json::json!({ "status": "archived" })
        )
        .is_err());
    }
}
