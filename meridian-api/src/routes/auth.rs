/// Authentication endpoints
///
/// # Endpoints
///
/// - `POST /v1/auth/register` - Register new user
/// - `POST /v1/auth/login` - Login and get tokens
/// - `POST /v1/auth/refresh` - Refresh access token
/// - `POST /v1/auth/verify-email` - Consume an email verification token
/// - `POST /v1/auth/forgot-password` - Email a password reset link
/// - `POST /v1/auth/reset-password` - Consume a reset token and set a new password
/// - `POST /v1/auth/resend-verification` - New verification email (bearer)
/// - `GET /v1/auth/me` - Current user (bearer)

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use meridian_shared::{
    auth::{
        jwt,
        middleware::AuthContext,
        password,
        tokens::{hash_token, OneTimeToken, TokenPurpose},
    },
    models::user::{CreateUser, User},
    notifications::{notify, Notification},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Register request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    /// Email address
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Password (will be validated for strength)
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    /// Display name
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    #[validate(length(max = 30, message = "Phone must be at most 30 characters"))]
    pub phone: Option<String>,
}

/// Tokens issued on register and login
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,

    /// Access token (24h)
    pub access_token: String,

    /// Refresh token (30d)
    pub refresh_token: String,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// Email address
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Password
    pub password: String,
}

/// Refresh token request
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    /// Refresh token
    pub refresh_token: String,
}

/// Refresh token response
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    /// New access token (24h)
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

fn issue_tokens(state: &AppState, user_id: Uuid) -> ApiResult<(String, String)> {
    let access_claims = jwt::Claims::new(user_id, jwt::TokenType::Access);
    let refresh_claims = jwt::Claims::new(user_id, jwt::TokenType::Refresh);

    let access_token = jwt::create_token(&access_claims, state.jwt_secret())?;
    let refresh_token = jwt::create_token(&refresh_claims, state.jwt_secret())?;

    Ok((access_token, refresh_token))
}

fn check_password_strength(field: &str, candidate: &str) -> ApiResult<()> {
    password::validate_password_strength(candidate).map_err(|e| ApiError::invalid_field(field, e))
}

/// Register a new user
///
/// Creates the account, stores a hashed 24h verification token and queues the
/// welcome email carrying the verification link.
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Validation failed
/// - `409 Conflict`: Email already exists
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    req.validate()?;
    check_password_strength("password", &req.password)?;

    let password_hash = password::hash_password(&req.password)?;

    let mut user = User::create(
        &state.db,
        CreateUser {
            email: req.email.trim().to_string(),
            password_hash,
            name: req.name.trim().to_string(),
            phone: req.phone,
        },
    )
    .await?;

    let token = OneTimeToken::generate(TokenPurpose::EmailVerification);
    User::set_verification_token(&state.db, user.id, &token.hash, token.expires_at).await?;
    user.email_verification_expires_at = Some(token.expires_at);

    notify(
        &state.db,
        &user.email,
        Some(&user.name),
        Notification::Welcome {
            verify_url: state.frontend_link(&format!("/verify-email?token={}", token.plaintext)),
        },
    )
    .await;

    tracing::info!(user_id = %user.id, "User registered");

    let (access_token, refresh_token) = issue_tokens(&state, user.id)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user,
            access_token,
            refresh_token,
        }),
    ))
}

/// Login endpoint
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Validation failed
/// - `401 Unauthorized`: Invalid credentials
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    req.validate()?;

    let user = User::find_by_email(&state.db, req.email.trim())
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid email or password".to_string()))?;

    let valid = password::verify_password(&req.password, &user.password_hash)?;
    if !valid {
        tracing::info!(user_id = %user.id, "Failed login attempt");
        return Err(ApiError::Unauthorized(
            "Invalid email or password".to_string(),
        ));
    }

    User::update_last_login(&state.db, user.id).await?;

    let (access_token, refresh_token) = issue_tokens(&state, user.id)?;

    Ok(Json(AuthResponse {
        user,
        access_token,
        refresh_token,
    }))
}

/// Token refresh endpoint
///
/// # Errors
///
/// - `401 Unauthorized`: Invalid or expired refresh token
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let access_token = jwt::refresh_access_token(&req.refresh_token, state.jwt_secret())?;

    Ok(Json(RefreshResponse { access_token }))
}

/// Consumes an email verification token
///
/// The token is single use; an unknown, expired or already used token is a
/// `400` and leaves the account unverified.
pub async fn verify_email(
    State(state): State<AppState>,
    Json(req): Json<TokenRequest>,
) -> ApiResult<Json<User>> {
    let user = User::verify_email(&state.db, &hash_token(req.token.trim()))
        .await?
        .ok_or_else(|| ApiError::BadRequest("Invalid or expired verification token".to_string()))?;

    tracing::info!(user_id = %user.id, "Email verified");

    Ok(Json(user))
}

/// Emails a password reset link
///
/// Responds identically whether or not the address has an account.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;

    let token = OneTimeToken::generate(TokenPurpose::PasswordReset);

    if let Some(user) =
        User::set_reset_token(&state.db, req.email.trim(), &token.hash, token.expires_at).await?
    {
        notify(
            &state.db,
            &user.email,
            Some(&user.name),
            Notification::PasswordReset {
                reset_url: state.frontend_link(&format!("/reset-password?token={}", token.plaintext)),
            },
        )
        .await;
    }

    Ok(MessageResponse::new(
        "If an account exists for that email, a reset link has been sent",
    ))
}

/// Consumes a reset token and sets the new password
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    check_password_strength("new_password", &req.new_password)?;

    let password_hash = password::hash_password(&req.new_password)?;

    let user = User::reset_password(&state.db, &hash_token(req.token.trim()), &password_hash)
        .await?
        .ok_or_else(|| ApiError::BadRequest("Invalid or expired reset token".to_string()))?;

    tracing::info!(user_id = %user.id, "Password reset");

    Ok(MessageResponse::new("Password has been reset"))
}

/// Issues a fresh verification token, invalidating the previous one
pub async fn resend_verification(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<MessageResponse>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    if user.is_email_verified {
        return Err(ApiError::Conflict("Email already verified".to_string()));
    }

    let token = OneTimeToken::generate(TokenPurpose::EmailVerification);
    if !User::set_verification_token(&state.db, user.id, &token.hash, token.expires_at).await? {
        return Err(ApiError::Conflict("Email already verified".to_string()));
    }

    notify(
        &state.db,
        &user.email,
        Some(&user.name),
        Notification::VerifyEmail {
            verify_url: state.frontend_link(&format!("/verify-email?token={}", token.plaintext)),
        },
    )
    .await;

    Ok(MessageResponse::new("Verification email sent"))
}

/// The authenticated user
pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<User>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_validation() {
        let req = RegisterRequest {
            email: "not-an-email".to_string(),
            password: "short".to_string(),
            name: String::new(),
            phone: None,
        };

        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
        assert!(fields.contains_key("name"));
    }

    #[test]
    fn test_password_strength_maps_to_field() {
        match check_password_strength("new_password", "allletters") {
            Err(ApiError::ValidationError(details)) => {
                assert_eq!(details[0].field, "new_password");
            }
            other => panic!("unexpected: {:?}", other),
        }

        assert!(check_password_strength("password", "Secure123").is_ok());
    }
}
