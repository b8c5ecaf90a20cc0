//! # Meridian Worker
//!
//! Background process that delivers transactional email queued by the API.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p meridian-worker
//! ```

use std::sync::Arc;

use meridian_shared::db::pool::{close_pool, create_pool, DatabaseConfig};
use meridian_worker::{
    config::WorkerConfig,
    dispatcher::Dispatcher,
    mailer::{LettreMailer, Mailer},
    queue::EmailQueue,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "meridian_worker=debug,meridian_shared=info".into());

    let json = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, finishing current email");
    token.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!("Meridian Worker v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = WorkerConfig::from_env()?;

    let pool = create_pool(DatabaseConfig::new(
        config.database_url.clone(),
        config.max_connections,
    ))
    .await?;

    let mailer: Arc<dyn Mailer> = Arc::new(LettreMailer::from_config(&config.mail)?);
    let queue = EmailQueue::new(pool.clone(), config.dispatch.max_attempts);

    match queue.pending_count().await {
        Ok(count) => tracing::info!(pending = count, "Email outbox loaded"),
        Err(e) => tracing::warn!(error = %e, "Could not count pending emails"),
    }

    let dispatcher = Dispatcher::new(queue, mailer, config.dispatch.clone());
    tokio::spawn(shutdown_signal(dispatcher.shutdown_token()));

    dispatcher.run().await?;

    close_pool(pool).await;
    tracing::info!("Worker stopped");

    Ok(())
}
