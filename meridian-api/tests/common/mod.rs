//! Shared helpers for the API integration tests
//!
//! Two kinds of context:
//!
//! - [`offline_app`]: router over a pool pointing at a closed port, for
//!   request paths that are decided before the database is touched
//! - [`TestContext`]: real database from `TEST_DATABASE_URL` with migrations
//!   applied, plus a wiremock server standing in for the payment gateway

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use meridian_api::{
    app::{build_router, AppState},
    config::{ApiConfig, Config, DatabaseConfig, JwtConfig, PaymentConfig},
};
use meridian_shared::{
    auth::{
        jwt::{create_token, Claims, TokenType},
        password::hash_password,
    },
    models::{
        course::{Course, CreateCourse},
        user::{CreateUser, User},
    },
    payments::paystack::PaystackGateway,
};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::{
    matchers::{method, path, path_regex},
    Mock, MockServer, Request as MockRequest, ResponseTemplate,
};

pub const JWT_SECRET: &str = "integration-secret-key-at-least-32-bytes";
pub const GATEWAY_SECRET: &str = "sk_test_integration";

pub fn test_config(database_url: &str, gateway_url: &str) -> Config {
    Config {
        api: ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec!["*".to_string()],
            production: false,
            frontend_url: "http://localhost:3000".to_string(),
        },
        database: DatabaseConfig {
            url: database_url.to_string(),
            max_connections: 5,
        },
        jwt: JwtConfig {
            secret: JWT_SECRET.to_string(),
        },
        payment: PaymentConfig {
            secret_key: GATEWAY_SECRET.to_string(),
            base_url: gateway_url.to_string(),
            timeout_secs: 2,
            currency: "NGN".to_string(),
            appointment_fee_minor: 2_000_000,
        },
    }
}

fn build_app(pool: PgPool, config: Config) -> Router {
    let gateway = PaystackGateway::new(
        config.payment.base_url.clone(),
        config.payment.secret_key.clone(),
        config.payment.timeout(),
    )
    .unwrap();

    build_router(AppState::new(pool, config, Arc::new(gateway)))
}

/// Router whose database is unreachable
///
/// Must be called inside a tokio runtime.
pub fn offline_app() -> Router {
    let config = test_config("postgresql://127.0.0.1:1/meridian_offline", "http://127.0.0.1:1");
    let pool = PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(300))
        .connect_lazy(&config.database.url)
        .unwrap();

    build_app(pool, config)
}

/// Sends a request and returns the status and JSON body (`Null` if empty)
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }

    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    (status, json)
}

pub struct TestContext {
    pub db: PgPool,
    pub app: Router,
    pub gateway: MockServer,
}

impl TestContext {
    /// Connects to `TEST_DATABASE_URL`, migrates, and starts a mock gateway
    pub async fn new() -> Self {
        dotenvy::dotenv().ok();
        let url = std::env::var("TEST_DATABASE_URL")
            .expect("TEST_DATABASE_URL must be set for database tests");

        let db = PgPool::connect(&url).await.unwrap();
        sqlx::migrate!("../migrations").run(&db).await.unwrap();

        let gateway = MockServer::start().await;
        let app = build_app(db.clone(), test_config(&url, &gateway.uri()));

        Self { db, app, gateway }
    }

    /// Creates a verified user and returns it with an access token
    pub async fn user(&self, is_admin: bool) -> (User, String) {
        let user = User::create(
            &self.db,
            CreateUser {
                email: format!("user-{}@example.com", Uuid::new_v4()),
                password_hash: hash_password("Str0ng-Passw0rd!").unwrap(),
                name: "Test User".to_string(),
                phone: None,
            },
        )
        .await
        .unwrap();

        let user = if is_admin {
            User::set_admin(&self.db, user.id, true).await.unwrap().unwrap()
        } else {
            user
        };

        let token = create_token(&Claims::new(user.id, TokenType::Access), JWT_SECRET).unwrap();
        (user, token)
    }

    pub async fn course(&self, instructor_id: Uuid, price_minor: i64, max_students: i32) -> Course {
        Course::create(
            &self.db,
            CreateCourse {
                title: format!("Course {}", Uuid::new_v4()),
                description: "Integration test course".to_string(),
                category: Some("finance".to_string()),
                price_minor,
                currency: "NGN".to_string(),
                instructor_id,
                max_students,
                start_date: None,
                end_date: None,
            },
        )
        .await
        .unwrap()
    }

    /// Gateway that accepts every initialize and reports every verify as
    /// paid for `amount_minor`
    pub async fn mock_successful_gateway(&self, amount_minor: i64) {
        Mock::given(method("POST"))
            .and(path("/transaction/initialize"))
            .respond_with(|req: &MockRequest| {
                let body: Value = serde_json::from_slice(&req.body).unwrap_or(Value::Null);
                let reference = body["reference"].as_str().unwrap_or_default().to_string();
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "status": true,
                    "message": "Authorization URL created",
                    "data": {
                        "authorization_url": format!("https://checkout.example/{}", reference),
                        "access_code": "ac_test",
                        "reference": reference,
                    }
                }))
            })
            .mount(&self.gateway)
            .await;

        Mock::given(method("GET"))
            .and(path_regex(r"^/transaction/verify/.+$"))
            .respond_with(move |req: &MockRequest| {
                let reference = req
                    .url
                    .path_segments()
                    .and_then(|segments| segments.last())
                    .unwrap_or_default()
                    .to_string();
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "status": true,
                    "message": "Verification successful",
                    "data": {
                        "reference": reference,
                        "status": "success",
                        "amount": amount_minor,
                        "currency": "NGN",
                        "channel": "card",
                        "paid_at": "2026-01-15T10:00:00Z",
                    }
                }))
            })
            .mount(&self.gateway)
            .await;
    }

    /// Enrolls the user and pays through initialize + confirm
    ///
    /// Returns the enrollment id and the payment reference.
    pub async fn enroll_and_initialize(&self, course_id: Uuid, token: &str) -> (Uuid, String) {
        let (status, enrollment) = send(
            &self.app,
            "POST",
            &format!("/v1/courses/{}/enroll", course_id),
            Some(token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "enroll failed: {}", enrollment);
        let enrollment_id: Uuid = enrollment["id"].as_str().unwrap().parse().unwrap();

        let (status, init) = send(
            &self.app,
            "POST",
            "/v1/payments/initialize",
            Some(token),
            Some(serde_json::json!({ "enrollment_id": enrollment_id })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "initialize failed: {}", init);

        (enrollment_id, init["reference"].as_str().unwrap().to_string())
    }

    pub async fn confirm(&self, token: &str, reference: &str) -> (StatusCode, Value) {
        send(
            &self.app,
            "POST",
            "/v1/payments/confirm",
            Some(token),
            Some(serde_json::json!({ "reference": reference })),
        )
        .await
    }
}
