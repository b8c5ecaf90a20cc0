/// Transactional email, enqueued as outbox rows
///
/// Handlers describe *what* to tell a user with a [`Notification`]; the
/// worker turns the stored payload back into a `Notification`, renders it and
/// delivers it. Nothing here talks to SMTP.
///
/// Use [`notify`] from request handlers: it logs and swallows failures so an
/// email problem never fails the request. Use [`enqueue`] when the email must
/// commit or roll back together with other writes.

use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use tracing::{error, info};

use crate::models::email_job::{EmailJob, NewEmailJob};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// Sent on registration, carries the verification link
    Welcome { verify_url: String },
    VerifyEmail { verify_url: String },
    PasswordReset { reset_url: String },
    /// Acknowledgement to whoever filled in the consultation form
    ConsultationReceived { service: String },
    EnrollmentConfirmed { course_title: String },
    PaymentReceipt {
        reference: String,
        amount_minor: i64,
        currency: String,
        description: String,
    },
    NewsletterWelcome { unsubscribe_url: String },
}

impl Notification {
    /// Stable name stored in `email_jobs.kind`
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Welcome { .. } => "welcome",
            Notification::VerifyEmail { .. } => "verify_email",
            Notification::PasswordReset { .. } => "password_reset",
            Notification::ConsultationReceived { .. } => "consultation_received",
            Notification::EnrollmentConfirmed { .. } => "enrollment_confirmed",
            Notification::PaymentReceipt { .. } => "payment_receipt",
            Notification::NewsletterWelcome { .. } => "newsletter_welcome",
        }
    }

    pub fn to_job(&self, recipient: &str, recipient_name: Option<&str>) -> NewEmailJob {
        NewEmailJob {
            kind: self.kind().to_string(),
            recipient: recipient.to_string(),
            recipient_name: recipient_name.map(str::to_string),
            payload: serde_json::to_value(self).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Recovers the notification from a stored job
    pub fn from_job(job: &EmailJob) -> Result<Self, serde_json::Error> {
        serde_json::from_value(job.payload.clone())
    }
}

/// Enqueues an email, propagating failure
pub async fn enqueue<'e, E>(
    executor: E,
    recipient: &str,
    recipient_name: Option<&str>,
    notification: &Notification,
) -> Result<EmailJob, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    EmailJob::enqueue(executor, notification.to_job(recipient, recipient_name)).await
}

/// Enqueues an email; failures are logged and otherwise ignored
pub async fn notify<'e, E>(
    executor: E,
    recipient: &str,
    recipient_name: Option<&str>,
    notification: Notification,
) -> Option<EmailJob>
where
    E: PgExecutor<'e>,
{
    match enqueue(executor, recipient, recipient_name, &notification).await {
        Ok(job) => {
            info!(job_id = %job.id, kind = notification.kind(), "Email queued");
            Some(job)
        }
        Err(e) => {
            error!(error = %e, kind = notification.kind(), "Failed to queue email");
            None
        }
    }
}
