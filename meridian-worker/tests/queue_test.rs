/// Outbox queue against a real database
///
/// Run with:
///
/// ```bash
/// TEST_DATABASE_URL=postgresql://localhost/meridian_test cargo test -p meridian-worker -- --ignored
/// ```
///
/// Tests hold `SERIAL` so parallel claims cannot steal each other's rows.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use meridian_shared::{
    db::migrations::run_migrations,
    models::email_job::{EmailJob, EmailJobStatus},
    notifications::{enqueue, Notification},
};
use meridian_worker::{
    config::{DispatchConfig, MailConfig, MailTransportConfig},
    dispatcher::Dispatcher,
    mailer::{LettreMailer, MailError, Mailer, OutgoingEmail},
    queue::{EmailQueue, FailureOutcome},
};
use sqlx::PgPool;
use uuid::Uuid;

static SERIAL: std::sync::Mutex<()> = std::sync::Mutex::new(());

async fn setup() -> PgPool {
    dotenvy::dotenv().ok();
    let url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set for database tests");

    let pool = PgPool::connect(&url).await.unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

async fn reload(pool: &PgPool, id: Uuid) -> EmailJob {
    EmailJob::find_by_id(pool, id).await.unwrap().unwrap()
}

/// Claims until `id` shows up, handing everything else back
async fn claim_one(queue: &EmailQueue, id: Uuid) -> EmailJob {
    let claimed = queue.claim(1000).await.unwrap();
    let others: Vec<Uuid> = claimed.iter().map(|j| j.id).filter(|j| *j != id).collect();
    queue.release(&others).await.unwrap();

    claimed
        .into_iter()
        .find(|j| j.id == id)
        .expect("job should be claimable")
}

#[tokio::test]
#[ignore]
async fn test_outbox_lifecycle() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let pool = setup().await;
    let queue = EmailQueue::new(pool.clone(), 2);

    let job = enqueue(
        &pool,
        "lifecycle@example.com",
        Some("Ada"),
        &Notification::VerifyEmail {
            verify_url: "https://meridian.example/verify-email?token=t".to_string(),
        },
    )
    .await
    .unwrap();
    assert_eq!(job.status, EmailJobStatus::Pending);
    assert_eq!(job.attempts, 0);

    // First attempt fails and is rescheduled
    let claimed = claim_one(&queue, job.id).await;
    assert_eq!(claimed.status, EmailJobStatus::Sending);
    assert_eq!(claimed.attempts, 1);

    let outcome = queue.mark_failed(&claimed, "connection refused").await.unwrap();
    assert!(matches!(outcome, FailureOutcome::Retrying { .. }));

    let stored = reload(&pool, job.id).await;
    assert_eq!(stored.status, EmailJobStatus::Pending);
    assert_eq!(stored.last_error.as_deref(), Some("connection refused"));
    assert!(stored.available_at > chrono::Utc::now());

    // Not due yet, so a claim skips it
    let early = queue.claim(1000).await.unwrap();
    let others: Vec<Uuid> = early.iter().map(|j| j.id).collect();
    queue.release(&others).await.unwrap();
    assert!(!others.contains(&job.id));

    // Second attempt is the last one
    sqlx::query("UPDATE email_jobs SET available_at = NOW() WHERE id = $1")
        .bind(job.id)
        .execute(&pool)
        .await
        .unwrap();
    let claimed = claim_one(&queue, job.id).await;
    assert_eq!(claimed.attempts, 2);

    let outcome = queue.mark_failed(&claimed, "connection refused").await.unwrap();
    assert_eq!(outcome, FailureOutcome::GaveUp);
    assert_eq!(reload(&pool, job.id).await.status, EmailJobStatus::Failed);
}

#[tokio::test]
#[ignore]
async fn test_dispatcher_sends_to_file() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let pool = setup().await;
    let dir = tempfile::tempdir().unwrap();

    let job = enqueue(
        &pool,
        "dispatch@example.com",
        None,
        &Notification::EnrollmentConfirmed {
            course_title: "Corporate Finance".to_string(),
        },
    )
    .await
    .unwrap();

    let mailer = LettreMailer::from_config(&MailConfig {
        transport: MailTransportConfig::File {
            dir: dir.path().to_path_buf(),
        },
        from_email: "hello@meridian.example".to_string(),
        from_name: "Meridian".to_string(),
    })
    .unwrap();

    let config = DispatchConfig {
        poll_interval: Duration::from_millis(100),
        send_delay: Duration::from_millis(10),
        batch_size: 1000,
        ..DispatchConfig::default()
    };
    let dispatcher = Dispatcher::new(
        EmailQueue::new(pool.clone(), config.max_attempts),
        Arc::new(mailer),
        config,
    );
    let token = dispatcher.shutdown_token();

    let handle = tokio::spawn(async move { dispatcher.run().await });

    let mut sent = false;
    for _ in 0..100 {
        if reload(&pool, job.id).await.status == EmailJobStatus::Sent {
            sent = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    token.cancel();
    handle.await.unwrap().unwrap();

    assert!(sent, "job should be sent");
    let stored = reload(&pool, job.id).await;
    assert!(stored.sent_at.is_some());
    assert!(stored.last_error.is_none());
    assert!(std::fs::read_dir(dir.path()).unwrap().count() >= 1);
}

/// Records when each recipient was sent to
#[derive(Default)]
struct TimingMailer {
    sent: Mutex<Vec<(String, Instant)>>,
}

#[async_trait]
impl Mailer for TimingMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        self.sent
            .lock()
            .unwrap()
            .push((email.to_email.clone(), Instant::now()));
        Ok(())
    }
}

#[tokio::test]
#[ignore]
async fn test_send_delay_spans_batches() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let pool = setup().await;
    let run = Uuid::new_v4();
    let recipients = [format!("first-{}@example.com", run), format!("second-{}@example.com", run)];

    let mut ids = Vec::new();
    for recipient in &recipients {
        let job = enqueue(
            &pool,
            recipient,
            None,
            &Notification::NewsletterWelcome {
                unsubscribe_url: "https://meridian.example/newsletter/unsubscribe".to_string(),
            },
        )
        .await
        .unwrap();
        ids.push(job.id);
    }

    let send_delay = Duration::from_millis(300);
    let config = DispatchConfig {
        poll_interval: Duration::from_millis(50),
        send_delay,
        // One job per batch, so the two sends fall in different batches
        batch_size: 1,
        ..DispatchConfig::default()
    };
    let mailer = Arc::new(TimingMailer::default());
    let dispatcher = Dispatcher::new(
        EmailQueue::new(pool.clone(), config.max_attempts),
        mailer.clone(),
        config,
    );
    let token = dispatcher.shutdown_token();
    let handle = tokio::spawn(async move { dispatcher.run().await });

    for _ in 0..200 {
        let mut done = true;
        for id in &ids {
            if reload(&pool, *id).await.status != EmailJobStatus::Sent {
                done = false;
            }
        }
        if done {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    token.cancel();
    handle.await.unwrap().unwrap();

    let sent = mailer.sent.lock().unwrap();
    let at = |recipient: &str| {
        sent.iter()
            .find(|(to, _)| to == recipient)
            .map(|(_, at)| *at)
            .expect("recipient should have been sent to")
    };
    let (first, second) = (at(&recipients[0]), at(&recipients[1]));
    let gap = if first > second { first - second } else { second - first };
    assert!(gap >= send_delay, "sends only {:?} apart", gap);
}
