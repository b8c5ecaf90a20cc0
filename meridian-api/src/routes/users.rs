/// User management endpoints
///
/// - `GET /v1/users` - List users (admin)
/// - `GET /v1/users/:id` - Get a profile (self or admin)
/// - `PUT /v1/users/:id` - Update a profile (self or admin)
/// - `PUT /v1/users/:id/role` - Grant or revoke admin (admin)

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{double_option, Page, Pagination},
};
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use meridian_shared::{
    auth::{
        authorization::{require_admin, require_owner_or_admin},
        middleware::AuthContext,
    },
    models::user::{UpdateProfile, User},
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub phone: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    pub bio: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    pub avatar_url: Option<Option<String>>,
}

impl From<UpdateUserRequest> for UpdateProfile {
    fn from(req: UpdateUserRequest) -> Self {
        UpdateProfile {
            name: req.name.map(|n| n.trim().to_string()),
            phone: req.phone,
            bio: req.bio,
            avatar_url: req.avatar_url,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub is_admin: bool,
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(pagination): Query<Pagination>,
) -> ApiResult<Json<Page<User>>> {
    require_admin(&auth)?;

    let users = User::list(&state.db, pagination.limit(), pagination.offset()).await?;
    let total = User::count(&state.db).await?;

    Ok(Json(Page::new(users, &pagination).with_total(total)))
}

pub async fn get_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<User>> {
    require_owner_or_admin(&auth, user_id)?;

    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

pub async fn update_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<Json<User>> {
    require_owner_or_admin(&auth, user_id)?;
    req.validate()?;

    let update = UpdateProfile::from(req);
    if update.is_empty() {
        return Err(ApiError::BadRequest("No fields to update".to_string()));
    }

    let user = User::update_profile(&state.db, user_id, update)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

/// Grants or revokes the admin role
///
/// An admin cannot revoke their own role.
pub async fn set_role(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<SetRoleRequest>,
) -> ApiResult<Json<User>> {
    require_admin(&auth)?;

    if user_id == auth.user_id && !req.is_admin {
        return Err(ApiError::BadRequest(
            "Admins cannot revoke their own role".to_string(),
        ));
    }

    let user = User::set_admin(&state.db, user_id, req.is_admin)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    tracing::info!(
        actor = %auth.user_id,
        user_id = %user.id,
        is_admin = user.is_admin,
        "User role changed"
    );

    Ok(Json(user))
}
