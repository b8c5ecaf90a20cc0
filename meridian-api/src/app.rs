/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use meridian_api::{app::AppState, config::Config};
/// use meridian_shared::payments::paystack::PaystackGateway;
/// use sqlx::PgPool;
/// use std::sync::Arc;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let gateway = PaystackGateway::new(
///     config.payment.base_url.clone(),
///     config.payment.secret_key.clone(),
///     config.payment.timeout(),
/// )?;
/// let state = AppState::new(pool, config, Arc::new(gateway));
/// let app = meridian_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{config::Config, middleware::security::SecurityHeadersLayer};
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{get, post, put},
    Router,
};
use meridian_shared::{auth::middleware::authenticate, payments::PaymentGateway};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    /// Application configuration
    pub config: Arc<Config>,

    /// Payment gateway client, built once at startup
    pub gateway: Arc<dyn PaymentGateway>,
}

impl AppState {
    /// Creates new application state
    pub fn new(db: PgPool, config: Config, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            db,
            config: Arc::new(config),
            gateway,
        }
    }

    /// Gets JWT secret for token operations
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }

    /// Absolute frontend URL for a path, used in emails
    pub fn frontend_link(&self, path_and_query: &str) -> String {
        format!("{}{}", self.config.api.frontend_url, path_and_query)
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /health                               public
/// /v1/auth/{register,login,refresh}     public
/// /v1/auth/{verify-email,forgot-password,reset-password}  public
/// /v1/auth/{me,resend-verification}     bearer
/// /v1/users[/:id[/role]]                bearer (self or admin)
/// /v1/courses                           GET public, writes bearer
/// /v1/courses/:id/{enroll,enrollments,assignments,live-classes,attendance}
/// /v1/enrollments/me                    bearer
/// /v1/assignments/:id/submissions       bearer
/// /v1/submissions/:id/mark              bearer
/// /v1/live-classes/:id                  bearer
/// /v1/appointments[/:id[/status|/cancel]]  bearer
/// /v1/payments/webhook                  gateway signature
/// /v1/payments[/initialize|/confirm|/:id]  bearer
/// /v1/blogs                             GET public, writes admin
/// /v1/consultations                     POST public, rest admin
/// /v1/newsletter/{subscribe,unsubscribe}  public
/// /v1/newsletter/{subscribers,campaigns/welcome}  admin
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Security headers
/// 2. CORS (tower-http CorsLayer)
/// 3. Logging (tower-http TraceLayer)
/// 4. Authentication (protected routes only)
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    // Health check (public, no auth)
    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    // Public routes
    let public_routes = Router::new()
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/refresh", post(routes::auth::refresh))
        .route("/auth/verify-email", post(routes::auth::verify_email))
        .route("/auth/forgot-password", post(routes::auth::forgot_password))
        .route("/auth/reset-password", post(routes::auth::reset_password))
        .route("/courses", get(routes::courses::list_courses))
        .route("/courses/:id", get(routes::courses::get_course))
        .route("/blogs", get(routes::blogs::list_blogs))
        .route("/blogs/:id", get(routes::blogs::get_blog_by_slug))
        .route("/consultations", post(routes::consultations::create_consultation))
        .route("/newsletter/subscribe", post(routes::newsletter::subscribe))
        .route("/newsletter/unsubscribe", post(routes::newsletter::unsubscribe))
        .route("/payments/webhook", post(routes::payments::webhook));

    // Routes that require a bearer token
    let protected_routes = Router::new()
        .route("/auth/me", get(routes::auth::me))
        .route("/auth/resend-verification", post(routes::auth::resend_verification))
        .route("/users", get(routes::users::list_users))
        .route(
            "/users/:id",
            get(routes::users::get_user).put(routes::users::update_user),
        )
        .route("/users/:id/role", put(routes::users::set_role))
        .route("/courses", post(routes::courses::create_course))
        .route(
            "/courses/:id",
            put(routes::courses::update_course).delete(routes::courses::delete_course),
        )
        .route("/courses/:id/enroll", post(routes::courses::enroll))
        .route("/courses/:id/enrollments", get(routes::courses::list_enrollments))
        .route("/enrollments/me", get(routes::courses::my_enrollments))
        .route(
            "/courses/:id/assignments",
            get(routes::assignments::list_assignments).post(routes::assignments::create_assignment),
        )
        .route(
            "/assignments/:id/submissions",
            get(routes::assignments::list_submissions).post(routes::assignments::submit),
        )
        .route("/submissions/:id/mark", post(routes::assignments::mark_submission))
        .route(
            "/courses/:id/live-classes",
            get(routes::live_classes::list_live_classes)
                .post(routes::live_classes::create_live_class),
        )
        .route(
            "/live-classes/:id",
            put(routes::live_classes::update_live_class)
                .delete(routes::live_classes::delete_live_class),
        )
        .route(
            "/courses/:id/attendance",
            get(routes::live_classes::list_attendance).post(routes::live_classes::record_attendance),
        )
        .route(
            "/appointments",
            get(routes::appointments::list_appointments)
                .post(routes::appointments::create_appointment),
        )
        .route("/appointments/:id", get(routes::appointments::get_appointment))
        .route("/appointments/:id/status", put(routes::appointments::update_status))
        .route("/appointments/:id/cancel", post(routes::appointments::cancel_appointment))
        .route("/payments", get(routes::payments::list_payments))
        .route("/payments/initialize", post(routes::payments::initialize))
        .route("/payments/confirm", post(routes::payments::confirm))
        .route("/payments/:id", get(routes::payments::get_payment))
        .route("/blogs", post(routes::blogs::create_blog))
        .route(
            "/blogs/:id",
            put(routes::blogs::update_blog).delete(routes::blogs::delete_blog),
        )
        .route("/consultations", get(routes::consultations::list_consultations))
        .route(
            "/consultations/:id/status",
            put(routes::consultations::update_status),
        )
        .route("/newsletter/subscribers", get(routes::newsletter::list_subscribers))
        .route(
            "/newsletter/campaigns/welcome",
            post(routes::newsletter::send_welcome_campaign),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ));

    // Build complete v1 API
    let v1_routes = Router::new().merge(public_routes).merge(protected_routes);

    // Configure CORS based on environment
    let cors = if state.config.cors_allows_any() {
        // Development mode: permissive CORS
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    // Combine all routes with middleware stack
    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

/// JWT authentication middleware layer
///
/// Validates the bearer token, loads the user to read the current admin
/// flag, then injects `AuthContext` into request extensions.
async fn jwt_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, crate::error::ApiError> {
    let auth_context = authenticate(&state.db, state.jwt_secret(), req.headers()).await?;

    req.extensions_mut().insert(auth_context);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use axum::{body::Body, http::StatusCode};
    use meridian_shared::payments::paystack::PaystackGateway;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let config = test_config();
        let pool = sqlx::postgres::PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy(&config.database.url)
            .unwrap();
        let gateway = PaystackGateway::new(
            config.payment.base_url.clone(),
            config.payment.secret_key.clone(),
            config.payment.timeout(),
        )
        .unwrap();

        AppState::new(pool, config, Arc::new(gateway))
    }

    #[tokio::test]
    async fn test_protected_route_requires_bearer() {
        let app = build_router(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/auth/me")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_garbage_token_rejected_before_database() {
        let app = build_router(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/courses/00000000-0000-0000-0000-000000000001/enroll")
                    .header("Authorization", "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_frontend_link() {
        let state = test_state();
        assert_eq!(
            state.frontend_link("/verify-email?token=abc"),
            "http://localhost:3000/verify-email?token=abc"
        );
    }
}
