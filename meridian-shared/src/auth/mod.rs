/// Authentication and authorization utilities
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and strength validation
/// - [`jwt`]: access/refresh token generation and validation (HS256)
/// - [`tokens`]: single-use email verification and password reset tokens
/// - [`middleware`]: bearer token resolution into an [`middleware::AuthContext`]
/// - [`authorization`]: admin and ownership checks
///
/// The ownership rule used everywhere is `owner_id == acting_user_id || acting_user.is_admin`.

pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod tokens;
