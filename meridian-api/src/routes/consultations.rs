/// Consultation request endpoints
///
/// - `POST /v1/consultations` - Submit the contact form (public)
/// - `GET /v1/consultations` - List requests (admin)
/// - `PUT /v1/consultations/:id/status` - Update a request's status (admin)

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{optional_auth, Page, Pagination},
};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use meridian_shared::{
    auth::{authorization::require_admin, middleware::AuthContext},
    models::consultation::{ConsultationRequest, ConsultationStatus, CreateConsultation},
    notifications::{notify, Notification},
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateConsultationRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(max = 30, message = "Phone must be at most 30 characters"))]
    pub phone: Option<String>,

    #[validate(length(max = 255, message = "Company must be at most 255 characters"))]
    pub company: Option<String>,

    #[validate(length(min = 1, max = 255, message = "Service must be 1-255 characters"))]
    pub service: String,

    #[validate(length(min = 1, max = 5000, message = "Message must be 1-5000 characters"))]
    pub message: String,

    pub preferred_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConsultationQuery {
    pub status: Option<ConsultationStatus>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: ConsultationStatus,
}

/// Records a consultation request and acknowledges it by email
///
/// A signed-in submitter is linked to the request; an unusable token is
/// treated as anonymous.
pub async fn create_consultation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateConsultationRequest>,
) -> ApiResult<(StatusCode, Json<ConsultationRequest>)> {
    req.validate()?;

    let user_id = optional_auth(&state, &headers).await.map(|auth| auth.user_id);

    let consultation = ConsultationRequest::create(
        &state.db,
        CreateConsultation {
            user_id,
            name: req.name.trim().to_string(),
            email: req.email.trim().to_lowercase(),
            phone: req.phone,
            company: req.company,
            service: req.service.trim().to_string(),
            message: req.message,
            preferred_date: req.preferred_date,
        },
    )
    .await?;

    tracing::info!(consultation_id = %consultation.id, "Consultation request received");

    notify(
        &state.db,
        &consultation.email,
        Some(&consultation.name),
        Notification::ConsultationReceived {
            service: consultation.service.clone(),
        },
    )
    .await;

    Ok((StatusCode::CREATED, Json(consultation)))
}

pub async fn list_consultations(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(pagination): Query<Pagination>,
    Query(query): Query<ConsultationQuery>,
) -> ApiResult<Json<Page<ConsultationRequest>>> {
    require_admin(&auth)?;

    let requests = ConsultationRequest::list(
        &state.db,
        query.status,
        pagination.limit(),
        pagination.offset(),
    )
    .await?;

    Ok(Json(Page::new(requests, &pagination)))
}

pub async fn update_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(consultation_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> ApiResult<Json<ConsultationRequest>> {
    require_admin(&auth)?;

    let consultation = ConsultationRequest::update_status(&state.db, consultation_id, req.status)
        .await?
        .ok_or_else(|| ApiError::NotFound("Consultation request not found".to_string()))?;

    Ok(Json(consultation))
}
