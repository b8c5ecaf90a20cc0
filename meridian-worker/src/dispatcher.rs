/// Email dispatcher
///
/// Main worker loop. Each tick it returns abandoned `sending` jobs to the
/// queue, claims a batch of due jobs and delivers them one at a time with a
/// fixed pause after every send, so the spacing holds across batches too.
/// When the queue is empty it sleeps for the poll interval.
///
/// Shutdown is cooperative: cancelling the token stops the loop after the
/// message in flight, and jobs claimed but not yet sent are released.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use meridian_worker::{config::DispatchConfig, dispatcher::Dispatcher, mailer::Mailer, queue::EmailQueue};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool, mailer: Arc<dyn Mailer>) -> anyhow::Result<()> {
/// let config = DispatchConfig::default();
/// let dispatcher = Dispatcher::new(EmailQueue::new(pool, config.max_attempts), mailer, config);
///
/// let token = dispatcher.shutdown_token();
/// tokio::spawn(async move {
///     tokio::signal::ctrl_c().await.ok();
///     token.cancel();
/// });
///
/// dispatcher.run().await?;
/// # Ok(())
/// # }
/// ```

use std::sync::Arc;

use meridian_shared::{models::email_job::EmailJob, notifications::Notification};
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    config::DispatchConfig,
    mailer::{Mailer, OutgoingEmail},
    queue::{EmailQueue, FailureOutcome, QueueError},
    templates,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Bad payload or address; the job fails immediately
    Permanent(String),
    /// Worth another attempt after backoff
    Transient(String),
}

/// Turns a claimed job into a message
pub fn compose(job: &EmailJob) -> Result<OutgoingEmail, DeliveryError> {
    let notification = Notification::from_job(job).map_err(|e| {
        DeliveryError::Permanent(format!("Undecodable payload for kind '{}': {}", job.kind, e))
    })?;

    let rendered = templates::render(&notification, job.recipient_name.as_deref());

    Ok(OutgoingEmail {
        to_email: job.recipient.clone(),
        to_name: job.recipient_name.clone(),
        subject: rendered.subject,
        html: rendered.html,
        text: rendered.text,
    })
}

pub async fn deliver(mailer: &dyn Mailer, job: &EmailJob) -> Result<(), DeliveryError> {
    let email = compose(job)?;

    mailer.send(&email).await.map_err(|e| {
        if e.is_permanent() {
            DeliveryError::Permanent(e.to_string())
        } else {
            DeliveryError::Transient(e.to_string())
        }
    })
}

pub struct Dispatcher {
    queue: EmailQueue,
    mailer: Arc<dyn Mailer>,
    config: DispatchConfig,
    shutdown_token: CancellationToken,
}

impl Dispatcher {
    pub fn new(queue: EmailQueue, mailer: Arc<dyn Mailer>, config: DispatchConfig) -> Self {
        Self {
            queue,
            mailer,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Sleeps for `duration`; returns true if shutdown was requested meanwhile
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown_token.cancelled() => true,
            _ = sleep(duration) => false,
        }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        info!(
            batch_size = self.config.batch_size,
            send_delay_ms = self.config.send_delay.as_millis() as u64,
            "Email dispatcher started"
        );

        while !self.shutdown_token.is_cancelled() {
            if let Err(e) = self.queue.requeue_stale(self.config.stale_after).await {
                warn!(error = %e, "Failed to requeue stale email jobs");
            }

            let jobs = match self.queue.claim(self.config.batch_size).await {
                Ok(jobs) => jobs,
                Err(e) => {
                    error!(error = %e, "Failed to claim email jobs");
                    if self.pause(self.config.poll_interval).await {
                        break;
                    }
                    continue;
                }
            };

            if jobs.is_empty() {
                if self.pause(self.config.poll_interval).await {
                    break;
                }
                continue;
            }

            self.send_batch(jobs).await;
        }

        info!("Email dispatcher stopped");
        Ok(())
    }

    async fn send_batch(&self, jobs: Vec<EmailJob>) {
        let mut remaining = jobs.into_iter();

        while let Some(job) = remaining.next() {
            self.process(&job).await;

            // Also after the last job, so the next batch keeps the spacing
            if self.pause(self.config.send_delay).await {
                let unsent: Vec<Uuid> = remaining.map(|job| job.id).collect();
                if unsent.is_empty() {
                    break;
                }
                match self.queue.release(&unsent).await {
                    Ok(count) => info!(count, "Released unsent email jobs on shutdown"),
                    Err(e) => error!(error = %e, "Failed to release email jobs on shutdown"),
                }
                break;
            }
        }
    }

    async fn process(&self, job: &EmailJob) {
        let result = deliver(self.mailer.as_ref(), job).await;

        let recorded: Result<(), QueueError> = match result {
            Ok(()) => {
                info!(job_id = %job.id, kind = %job.kind, "Email sent");
                self.queue.mark_sent(job.id).await
            }
            Err(DeliveryError::Permanent(reason)) => {
                error!(job_id = %job.id, kind = %job.kind, error = %reason, "Email failed permanently");
                self.queue.mark_dead(job.id, &reason).await
            }
            Err(DeliveryError::Transient(reason)) => {
                match self.queue.mark_failed(job, &reason).await {
                    Ok(FailureOutcome::Retrying { available_at }) => {
                        warn!(
                            job_id = %job.id,
                            attempts = job.attempts,
                            retry_at = %available_at,
                            error = %reason,
                            "Email send failed, will retry"
                        );
                        Ok(())
                    }
                    Ok(FailureOutcome::GaveUp) => {
                        error!(job_id = %job.id, attempts = job.attempts, error = %reason, "Email send failed, giving up");
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
        };

        if let Err(e) = recorded {
            // The row stays in `sending` and is picked up again by requeue_stale.
            error!(job_id = %job.id, error = %e, "Failed to record email outcome");
        } else {
            debug!(job_id = %job.id, "Email outcome recorded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::MailError;
    use async_trait::async_trait;
    use chrono::Utc;
    use meridian_shared::models::email_job::EmailJobStatus;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<OutgoingEmail>>,
        fail_with: Option<MailError>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
            if let Some(e) = &self.fail_with {
                return Err(e.clone());
            }
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    fn job(notification: &Notification) -> EmailJob {
        let new_job = notification.to_job("ada@example.com", Some("Ada"));
        let now = Utc::now();

        EmailJob {
            id: Uuid::new_v4(),
            kind: new_job.kind,
            recipient: new_job.recipient,
            recipient_name: new_job.recipient_name,
            payload: new_job.payload,
            status: EmailJobStatus::Sending,
            attempts: 1,
            last_error: None,
            available_at: now,
            sent_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_deliver_renders_and_sends() {
        let mailer = RecordingMailer::default();
        let job = job(&Notification::EnrollmentConfirmed {
            course_title: "Corporate Strategy".to_string(),
        });

        deliver(&mailer, &job).await.unwrap();

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to_email, "ada@example.com");
        assert_eq!(sent[0].to_name.as_deref(), Some("Ada"));
        assert_eq!(sent[0].subject, "You're enrolled in Corporate Strategy");
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_permanent() {
        let mailer = RecordingMailer::default();
        let mut job = job(&Notification::VerifyEmail {
            verify_url: "https://meridian.example/verify".to_string(),
        });
        job.payload = serde_json::json!({ "kind": "carrier_pigeon" });

        let err = deliver(&mailer, &job).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Permanent(_)));
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_is_transient() {
        let mailer = RecordingMailer {
            fail_with: Some(MailError::Transport("connection refused".to_string())),
            ..Default::default()
        };
        let job = job(&Notification::PasswordReset {
            reset_url: "https://meridian.example/reset".to_string(),
        });

        let err = deliver(&mailer, &job).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Transient(_)));
    }

    #[tokio::test]
    async fn test_bad_address_is_permanent() {
        let mailer = RecordingMailer {
            fail_with: Some(MailError::InvalidAddress {
                address: "nope".to_string(),
                reason: "missing @".to_string(),
            }),
            ..Default::default()
        };
        let job = job(&Notification::NewsletterWelcome {
            unsubscribe_url: "https://meridian.example/newsletter/unsubscribe".to_string(),
        });

        let err = deliver(&mailer, &job).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Permanent(_)));
    }

    #[test]
    fn test_compose_uses_recipient() {
        let job = job(&Notification::ConsultationReceived {
            service: "Financial advisory".to_string(),
        });

        let email = compose(&job).unwrap();
        assert_eq!(email.to_email, "ada@example.com");
        assert!(email.text.contains("Financial advisory"));
        assert!(email.html.contains("Financial advisory"));
    }
}
