/// Payment reconciliation
///
/// Converges a payment, the enrollment or appointment it funds, and the
/// course seat counter to a terminal state exactly once, whichever entry
/// path (client confirm or webhook) arrives first or however often either
/// one repeats.
///
/// # Flow
///
/// 1. Obtain an authoritative [`VerifiedTransaction`]: from the gateway's
///    verify endpoint (client confirm) or from a signed webhook.
/// 2. In one transaction: lock the payment row, then apply guarded
///    conditional updates. Each guard reports whether it changed anything,
///    so a repeated call finds nothing to do and reports
///    [`ReconcileOutcome::AlreadyProcessed`].
/// 3. After commit, queue the receipt and enrollment emails.
///
/// No gateway call happens while the row lock is held, and a gateway error
/// returns before any write.

use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::paystack::WebhookEvent;
use super::{PaymentGateway, TransactionStatus, VerifiedTransaction};
use crate::models::appointment::Appointment;
use crate::models::course::Course;
use crate::models::enrollment::CourseEnrollment;
use crate::models::payment::{Payment, PaymentTarget};
use crate::models::user::User;
use crate::notifications::{notify, Notification};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// This call completed the payment
    Completed,
    /// An earlier call already settled the payment; nothing changed
    AlreadyProcessed,
    /// Paid, but the course had no seat left; the payment needs a refund
    CapacityExceeded,
    /// Paid for an enrollment or appointment that another payment already
    /// settled; the payment needs a refund
    Duplicate,
    /// The gateway reports the transaction failed
    Failed,
    /// The gateway has not settled the transaction yet; nothing changed
    Pending,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Payment not found")]
    NotFound,

    #[error("Payment reference does not match")]
    ReferenceMismatch,

    #[error("Paid amount {actual} {actual_currency} does not match expected {expected} {expected_currency}")]
    AmountMismatch {
        expected: i64,
        expected_currency: String,
        actual: i64,
        actual_currency: String,
    },

    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),

    #[error(transparent)]
    Gateway(#[from] super::GatewayError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// How the payment row is found
#[derive(Debug, Clone, Copy)]
pub enum PaymentLocator<'a> {
    /// Local id; the reference must match
    Id { id: Uuid, reference: &'a str },
    Reference(&'a str),
}

/// Result of a reconciliation
#[derive(Debug, Clone, Serialize)]
pub struct Reconciliation {
    pub outcome: ReconcileOutcome,
    /// Payment as of the end of reconciliation
    pub payment: Payment,
}

/// What happened to a webhook delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Signature missing or wrong; nothing was read
    Rejected,
    /// Valid, but not an event we act on (or an unknown reference)
    Ignored,
    Processed(ReconcileOutcome),
}

impl WebhookOutcome {
    pub fn processed(&self) -> bool {
        matches!(self, WebhookOutcome::Processed(_))
    }
}

/// Client-confirm entry path
///
/// Queries the gateway and reconciles whatever it reports. The client never
/// gets to say whether the payment succeeded.
pub async fn confirm_payment(
    pool: &PgPool,
    gateway: &dyn PaymentGateway,
    locator: PaymentLocator<'_>,
) -> Result<Reconciliation, ReconcileError> {
    let reference = match locator {
        PaymentLocator::Id { reference, .. } => reference,
        PaymentLocator::Reference(reference) => reference,
    };

    let verified = gateway.verify(reference).await?;
    apply_verification(pool, locator, &verified).await
}

/// Webhook entry path
///
/// The signature is checked against the raw bytes before anything is
/// parsed. Only `charge.success` is reconciled.
pub async fn handle_webhook(
    pool: &PgPool,
    gateway: &dyn PaymentGateway,
    body: &[u8],
    signature: Option<&str>,
) -> Result<WebhookOutcome, ReconcileError> {
    if !gateway.verify_webhook_signature(body, signature) {
        warn!(
            has_signature = signature.is_some(),
            "Rejected webhook with invalid signature"
        );
        return Ok(WebhookOutcome::Rejected);
    }

    let event = WebhookEvent::parse(body)
        .map_err(|e| ReconcileError::MalformedPayload(e.to_string()))?;

    if !event.is_charge_success() {
        info!(event = %event.event, "Ignoring webhook event");
        return Ok(WebhookOutcome::Ignored);
    }

    let verified: VerifiedTransaction = event.data.into();

    match apply_verification(pool, PaymentLocator::Reference(&verified.reference), &verified).await
    {
        Ok(reconciliation) => Ok(WebhookOutcome::Processed(reconciliation.outcome)),
        Err(ReconcileError::NotFound) => {
            warn!(reference = %verified.reference, "Webhook for unknown payment reference");
            Ok(WebhookOutcome::Ignored)
        }
        // A redelivery cannot change the verdict, so acknowledge it
        Err(e @ (ReconcileError::AmountMismatch { .. } | ReconcileError::ReferenceMismatch)) => {
            warn!(reference = %verified.reference, error = %e, "Webhook does not match payment");
            Ok(WebhookOutcome::Ignored)
        }
        Err(e) => Err(e),
    }
}

/// Applies a verified gateway result to local state
pub async fn apply_verification(
    pool: &PgPool,
    locator: PaymentLocator<'_>,
    verified: &VerifiedTransaction,
) -> Result<Reconciliation, ReconcileError> {
    let mut tx = pool.begin().await?;

    let payment = match locator {
        PaymentLocator::Id { id, .. } => Payment::lock_by_id(&mut *tx, id).await?,
        PaymentLocator::Reference(reference) => {
            Payment::lock_by_reference(&mut *tx, reference).await?
        }
    }
    .ok_or(ReconcileError::NotFound)?;

    if payment.reference != verified.reference {
        return Err(ReconcileError::ReferenceMismatch);
    }

    let outcome = match verified.status {
        TransactionStatus::Success => {
            if verified.amount_minor != payment.amount_minor
                || !verified.currency.eq_ignore_ascii_case(&payment.currency)
            {
                warn!(
                    payment_id = %payment.id,
                    expected = payment.amount_minor,
                    actual = verified.amount_minor,
                    "Paid amount does not match payment"
                );
                return Err(ReconcileError::AmountMismatch {
                    expected: payment.amount_minor,
                    expected_currency: payment.currency.clone(),
                    actual: verified.amount_minor,
                    actual_currency: verified.currency.clone(),
                });
            }

            if !Payment::mark_completed(&mut *tx, payment.id, verified.channel.as_deref()).await? {
                ReconcileOutcome::AlreadyProcessed
            } else {
                match payment.target() {
                    Some(PaymentTarget::Enrollment(enrollment_id)) => {
                        match CourseEnrollment::activate(&mut *tx, enrollment_id).await? {
                            Some(enrollment) => {
                                if Course::try_increment_enrolled(&mut *tx, enrollment.course_id)
                                    .await?
                                {
                                    ReconcileOutcome::Completed
                                } else {
                                    CourseEnrollment::drop_paid(&mut *tx, enrollment_id).await?;
                                    Payment::flag_refund_required(&mut *tx, payment.id).await?;
                                    warn!(
                                        payment_id = %payment.id,
                                        course_id = %enrollment.course_id,
                                        "Course full at confirmation, refund required"
                                    );
                                    ReconcileOutcome::CapacityExceeded
                                }
                            }
                            // Already settled by another payment, or dropped
                            None => flag_duplicate(&mut *tx, &payment).await?,
                        }
                    }
                    Some(PaymentTarget::Appointment(appointment_id)) => {
                        if Appointment::confirm_payment(&mut *tx, appointment_id).await? {
                            ReconcileOutcome::Completed
                        } else {
                            flag_duplicate(&mut *tx, &payment).await?
                        }
                    }
                    None => ReconcileOutcome::Completed,
                }
            }
        }
        status if status.is_failure() => {
            if Payment::mark_failed(&mut *tx, payment.id).await? {
                ReconcileOutcome::Failed
            } else {
                ReconcileOutcome::AlreadyProcessed
            }
        }
        _ => ReconcileOutcome::Pending,
    };

    let payment = Payment::lock_by_id(&mut *tx, payment.id)
        .await?
        .ok_or(ReconcileError::NotFound)?;

    tx.commit().await?;

    info!(
        payment_id = %payment.id,
        reference = %payment.reference,
        outcome = ?outcome,
        "Payment reconciled"
    );

    if outcome == ReconcileOutcome::Completed {
        send_confirmation_emails(pool, &payment).await;
    }

    Ok(Reconciliation { outcome, payment })
}

/// Marks a settled payment whose target was already paid for
async fn flag_duplicate(
    conn: &mut PgConnection,
    payment: &Payment,
) -> Result<ReconcileOutcome, sqlx::Error> {
    Payment::flag_refund_required(conn, payment.id).await?;
    warn!(
        payment_id = %payment.id,
        reference = %payment.reference,
        "Target already paid by another payment, refund required"
    );
    Ok(ReconcileOutcome::Duplicate)
}

async fn send_confirmation_emails(pool: &PgPool, payment: &Payment) {
    let user = match User::find_by_id(pool, payment.user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return,
        Err(e) => {
            warn!(error = %e, payment_id = %payment.id, "Could not load payer for receipt");
            return;
        }
    };

    let description = match payment.target() {
        Some(PaymentTarget::Enrollment(enrollment_id)) => {
            let course = match CourseEnrollment::find_by_id(pool, enrollment_id).await {
                Ok(Some(enrollment)) => Course::find_by_id(pool, enrollment.course_id)
                    .await
                    .ok()
                    .flatten(),
                _ => None,
            };

            match course {
                Some(course) => {
                    notify(
                        pool,
                        &user.email,
                        Some(&user.name),
                        Notification::EnrollmentConfirmed {
                            course_title: course.title.clone(),
                        },
                    )
                    .await;
                    course.title
                }
                None => "Course enrollment".to_string(),
            }
        }
        Some(PaymentTarget::Appointment(appointment_id)) => {
            match Appointment::find_by_id(pool, appointment_id).await {
                Ok(Some(appointment)) => format!("Appointment: {}", appointment.service),
                _ => "Appointment".to_string(),
            }
        }
        None => "Payment".to_string(),
    };

    notify(
        pool,
        &user.email,
        Some(&user.name),
        Notification::PaymentReceipt {
            reference: payment.reference.clone(),
            amount_minor: payment.amount_minor,
            currency: payment.currency.clone(),
            description,
        },
    )
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::paystack::{sign, PaystackGateway};
    use std::time::Duration;

    fn offline_pool() -> PgPool {
        sqlx::postgres::PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgresql://nobody@127.0.0.1:1/meridian")
            .unwrap()
    }

    fn offline_gateway() -> PaystackGateway {
        PaystackGateway::new("http://127.0.0.1:1", "sk_test_reconcile", Duration::from_millis(200))
            .unwrap()
    }

    #[tokio::test]
    async fn test_webhook_bad_signature_touches_nothing() {
        // The pool points nowhere; reaching the database would error
        let pool = offline_pool();
        let gateway = offline_gateway();
        let body = br#"{"event":"charge.success","data":{"reference":"MRD-1","status":"success","amount":1,"currency":"NGN"}}"#;

        let outcome = handle_webhook(&pool, &gateway, body, Some("deadbeef")).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Rejected);
        assert!(!outcome.processed());

        let outcome = handle_webhook(&pool, &gateway, body, None).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Rejected);
    }

    #[tokio::test]
    async fn test_webhook_malformed_after_valid_signature() {
        let pool = offline_pool();
        let gateway = offline_gateway();
        let body = b"{not json";
        let signature = sign("sk_test_reconcile", body);

        let err = handle_webhook(&pool, &gateway, body, Some(&signature))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::MalformedPayload(_)));
    }

    #[tokio::test]
    async fn test_webhook_other_events_ignored() {
        let pool = offline_pool();
        let gateway = offline_gateway();
        let body = br#"{"event":"transfer.success","data":{"reference":"TRF-1","status":"success","amount":1,"currency":"NGN"}}"#;
        let signature = sign("sk_test_reconcile", body);

        let outcome = handle_webhook(&pool, &gateway, body, Some(&signature)).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Ignored);
    }

    #[test]
    fn test_outcome_wire_names() {
        assert_eq!(
            serde_json::to_value(ReconcileOutcome::Duplicate).unwrap(),
            serde_json::json!("duplicate")
        );
        assert_eq!(
            serde_json::to_value(ReconcileOutcome::CapacityExceeded).unwrap(),
            serde_json::json!("capacity_exceeded")
        );
    }

    #[tokio::test]
    async fn test_confirm_gateway_failure_is_not_mutation() {
        // Gateway unreachable: the error surfaces before any database access
        let pool = offline_pool();
        let gateway = offline_gateway();

        let err = confirm_payment(&pool, &gateway, PaymentLocator::Reference("MRD-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Gateway(_)));
    }
}
