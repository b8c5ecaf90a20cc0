/// Payment endpoints
///
/// - `POST /v1/payments/initialize` - Open a gateway transaction for an enrollment or appointment
/// - `POST /v1/payments/confirm` - Client-side confirmation after the gateway redirect
/// - `POST /v1/payments/webhook` - Gateway callback, authenticated by signature
/// - `GET /v1/payments` - Payment history (own, or all for admins)
/// - `GET /v1/payments/:id` - Owner or admin
///
/// Confirm and webhook both end in `payments::reconcile`, which settles a
/// payment exactly once whichever arrives first.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{Page, Pagination},
};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use meridian_shared::{
    auth::{authorization::require_owner_or_admin, middleware::AuthContext},
    models::{
        appointment::{Appointment, AppointmentStatus},
        course::Course,
        enrollment::{CourseEnrollment, EnrollmentStatus},
        payment::{CreatePayment, Payment, PaymentStatus, PaymentTarget},
        user::User,
    },
    payments::{
        generate_reference,
        paystack::SIGNATURE_HEADER,
        reconcile::{self, PaymentLocator, Reconciliation},
        InitializeRequest,
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct InitializePaymentRequest {
    pub enrollment_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
}

impl InitializePaymentRequest {
    /// Exactly one target must be named
    fn target(&self) -> ApiResult<PaymentTarget> {
        match (self.enrollment_id, self.appointment_id) {
            (Some(id), None) => Ok(PaymentTarget::Enrollment(id)),
            (None, Some(id)) => Ok(PaymentTarget::Appointment(id)),
            _ => Err(ApiError::BadRequest(
                "Provide exactly one of enrollment_id or appointment_id".to_string(),
            )),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InitializePaymentResponse {
    pub payment: Payment,
    pub authorization_url: Option<String>,
    pub reference: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub reference: String,
    pub payment_id: Option<Uuid>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct WebhookAck {
    pub received: bool,
    pub processed: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymentQuery {
    pub status: Option<PaymentStatus>,
}

/// What the caller is about to pay, in minor units
struct Charge {
    amount_minor: i64,
    currency: String,
    description: String,
}

/// Checks the caller may pay for `target` and that it still needs paying
async fn resolve_charge(
    state: &AppState,
    auth: &AuthContext,
    target: PaymentTarget,
) -> ApiResult<Charge> {
    match target {
        PaymentTarget::Enrollment(id) => {
            let enrollment = CourseEnrollment::find_by_id(&state.db, id)
                .await?
                .ok_or_else(|| ApiError::NotFound("Enrollment not found".to_string()))?;

            if enrollment.user_id != auth.user_id {
                return Err(ApiError::Forbidden(
                    "You can only pay for your own enrollment".to_string(),
                ));
            }
            if enrollment.status != EnrollmentStatus::Pending
                || enrollment.payment_status != PaymentStatus::Pending
            {
                return Err(ApiError::Conflict("Enrollment is already paid".to_string()));
            }

            let course = Course::find_by_id(&state.db, enrollment.course_id)
                .await?
                .ok_or_else(|| ApiError::NotFound("Course not found".to_string()))?;

            if course.is_full() {
                return Err(ApiError::Conflict("Course is full".to_string()));
            }

            Ok(Charge {
                amount_minor: course.price_minor,
                currency: course.currency,
                description: course.title,
            })
        }
        PaymentTarget::Appointment(id) => {
            let appointment = Appointment::find_by_id(&state.db, id)
                .await?
                .ok_or_else(|| ApiError::NotFound("Appointment not found".to_string()))?;

            if appointment.user_id != auth.user_id {
                return Err(ApiError::Forbidden(
                    "You can only pay for your own appointment".to_string(),
                ));
            }
            if appointment.status == AppointmentStatus::Cancelled {
                return Err(ApiError::BadRequest("Appointment is cancelled".to_string()));
            }
            if appointment.payment_status != PaymentStatus::Pending {
                return Err(ApiError::Conflict("Appointment is already paid".to_string()));
            }

            Ok(Charge {
                amount_minor: appointment.fee_minor,
                currency: state.config.payment.currency.clone(),
                description: appointment.service,
            })
        }
    }
}

/// Opens a gateway transaction
///
/// An unfinished payment for the same target is returned as-is instead of
/// opening a second transaction.
///
/// # Errors
///
/// - `403 Forbidden`: the target belongs to someone else
/// - `409 Conflict`: already paid, or the course filled up
/// - `502/503`: the gateway failed; nothing is recorded
pub async fn initialize(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<InitializePaymentRequest>,
) -> ApiResult<(StatusCode, Json<InitializePaymentResponse>)> {
    let target = req.target()?;
    let charge = resolve_charge(&state, &auth, target).await?;

    if charge.amount_minor <= 0 {
        return Err(ApiError::BadRequest("Nothing to pay".to_string()));
    }

    if let Some(existing) = Payment::find_pending_for_target(&state.db, target).await? {
        if existing.user_id == auth.user_id && existing.authorization_url.is_some() {
            return Ok((
                StatusCode::OK,
                Json(InitializePaymentResponse {
                    authorization_url: existing.authorization_url.clone(),
                    reference: existing.reference.clone(),
                    payment: existing,
                }),
            ));
        }
    }

    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found".to_string()))?;

    let reference = generate_reference();
    let initialized = state
        .gateway
        .initialize(&InitializeRequest {
            email: user.email,
            amount_minor: charge.amount_minor,
            currency: charge.currency.clone(),
            reference: reference.clone(),
            callback_url: Some(state.frontend_link("/payment/callback")),
            metadata: serde_json::json!({
                "user_id": auth.user_id,
                "target": target,
                "description": charge.description,
            }),
        })
        .await?;

    let created = Payment::create(
        &state.db,
        CreatePayment {
            user_id: auth.user_id,
            target,
            amount_minor: charge.amount_minor,
            currency: charge.currency,
            reference: initialized.reference.clone(),
            authorization_url: Some(initialized.authorization_url.clone()),
        },
    )
    .await;

    let payment = match created {
        Ok(payment) => payment,
        // A concurrent initialize for the same target got there first
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            let existing = Payment::find_pending_for_target(&state.db, target)
                .await?
                .filter(|existing| existing.user_id == auth.user_id);

            return match existing {
                Some(existing) => {
                    tracing::info!(
                        payment_id = %existing.id,
                        abandoned_reference = %initialized.reference,
                        "Payment already in progress, returning it"
                    );
                    Ok((
                        StatusCode::OK,
                        Json(InitializePaymentResponse {
                            authorization_url: existing.authorization_url.clone(),
                            reference: existing.reference.clone(),
                            payment: existing,
                        }),
                    ))
                }
                None => Err(sqlx::Error::Database(db_err).into()),
            };
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(
        payment_id = %payment.id,
        reference = %payment.reference,
        amount_minor = payment.amount_minor,
        "Payment initialized"
    );

    Ok((
        StatusCode::CREATED,
        Json(InitializePaymentResponse {
            authorization_url: Some(initialized.authorization_url),
            reference: initialized.reference,
            payment,
        }),
    ))
}

/// Confirms a payment after the customer returns from the gateway
///
/// The gateway is asked for the transaction state; the client's word is not
/// taken for it. Confirming twice is harmless and reports
/// `already_processed`.
pub async fn confirm(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<ConfirmPaymentRequest>,
) -> ApiResult<Json<Reconciliation>> {
    let reference = req.reference.trim();
    if reference.is_empty() {
        return Err(ApiError::invalid_field("reference", "Reference is required"));
    }

    let payment = match req.payment_id {
        Some(id) => Payment::find_by_id(&state.db, id).await?,
        None => Payment::find_by_reference(&state.db, reference).await?,
    }
    .ok_or_else(|| ApiError::NotFound("Payment not found".to_string()))?;

    require_owner_or_admin(&auth, payment.user_id)?;

    let locator = match req.payment_id {
        Some(id) => PaymentLocator::Id { id, reference },
        None => PaymentLocator::Reference(reference),
    };

    let reconciliation =
        reconcile::confirm_payment(&state.db, state.gateway.as_ref(), locator).await?;

    Ok(Json(reconciliation))
}

/// Gateway webhook
///
/// Always acknowledged with `200` once the body is read, including for a bad
/// signature, so the gateway does not keep retrying; `processed` says
/// whether anything was applied.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome =
        reconcile::handle_webhook(&state.db, state.gateway.as_ref(), &body, signature).await?;

    Ok(Json(WebhookAck {
        received: true,
        processed: outcome.processed(),
    }))
}

pub async fn list_payments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(pagination): Query<Pagination>,
    Query(query): Query<PaymentQuery>,
) -> ApiResult<Json<Page<Payment>>> {
    let payments = if auth.is_admin {
        Payment::list_all(&state.db, query.status, pagination.limit(), pagination.offset()).await?
    } else {
        Payment::list_for_user(&state.db, auth.user_id, pagination.limit(), pagination.offset())
            .await?
    };

    Ok(Json(Page::new(payments, &pagination)))
}

pub async fn get_payment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(payment_id): Path<Uuid>,
) -> ApiResult<Json<Payment>> {
    let payment = Payment::find_by_id(&state.db, payment_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Payment not found".to_string()))?;
    require_owner_or_admin(&auth, payment.user_id)?;

    Ok(Json(payment))
}
