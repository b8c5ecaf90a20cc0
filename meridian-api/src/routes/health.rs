/// Liveness and database check
///
/// `GET /health` answers `200` with `"status": "healthy"` when the database
/// responds, and `503` with `"status": "degraded"` when it does not, so a load
/// balancer can take the instance out of rotation.
///
/// ```json
/// { "status": "healthy", "version": "0.1.0", "database": "connected", "pending_emails": 0 }
/// ```

use crate::app::AppState;
use axum::{extract::State, http::StatusCode, Json};
use meridian_shared::models::email_job::EmailJob;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
    /// Outbox backlog; absent when the database is down
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_emails: Option<i64>,
}

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let connected = sqlx::query("SELECT 1").execute(&state.db).await.is_ok();

    let pending_emails = if connected {
        EmailJob::count_pending(&state.db).await.ok()
    } else {
        None
    };

    let (code, status, database) = if connected {
        (StatusCode::OK, "healthy", "connected")
    } else {
        tracing::warn!("Health check could not reach the database");
        (StatusCode::SERVICE_UNAVAILABLE, "degraded", "disconnected")
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: database.to_string(),
            pending_emails,
        }),
    )
}
