//! # Meridian API Server
//!
//! HTTP API for the Meridian consulting and training platform: accounts,
//! courses and enrollment, appointments, payments, blog, consultations and
//! newsletter.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/meridian \
//! JWT_SECRET=$(openssl rand -hex 32) \
//! PAYSTACK_SECRET_KEY=sk_test_xxx \
//! cargo run -p meridian-api
//! ```
//!
//! Set `LOG_FORMAT=json` for structured logs.

use meridian_api::{
    app::{build_router, AppState},
    config::Config,
};
use meridian_shared::{
    db::{
        migrations::run_migrations,
        pool::{close_pool, create_pool, DatabaseConfig},
    },
    payments::paystack::PaystackGateway,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "meridian_api=debug,meridian_shared=info,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    tracing::info!("Meridian API v{} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let pool = create_pool(DatabaseConfig::new(
        config.database.url.clone(),
        config.database.max_connections,
    ))
    .await?;
    run_migrations(&pool).await?;

    let gateway = PaystackGateway::new(
        config.payment.base_url.clone(),
        config.payment.secret_key.clone(),
        config.payment.timeout(),
    )?;

    let bind_address = config.bind_address();
    let state = AppState::new(pool.clone(), config, Arc::new(gateway));
    let app = build_router(state);

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %bind_address, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    close_pool(pool).await;
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
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

    tracing::info!("Shutdown signal received");
}
