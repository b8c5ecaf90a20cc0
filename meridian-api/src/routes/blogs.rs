/// Blog endpoints
///
/// - `GET /v1/blogs` - Published posts, newest first; `?tag=` filters
/// - `GET /v1/blogs/:slug` - One published post
/// - `POST /v1/blogs` - Create (admin)
/// - `PUT /v1/blogs/:id` - Update (admin)
/// - `DELETE /v1/blogs/:id` - Delete (admin)
///
/// Admins may pass `?include_drafts=true` to the listing.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{double_option, optional_auth, Page, Pagination},
};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use meridian_shared::{
    auth::{authorization::require_admin, middleware::AuthContext},
    models::blog::{slugify, Blog, BlogStatus, CreateBlog, UpdateBlog},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Default, Deserialize)]
pub struct BlogQuery {
    pub tag: Option<String>,
    #[serde(default)]
    pub include_drafts: bool,
}

fn default_status() -> BlogStatus {
    BlogStatus::Draft
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBlogRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,

    /// Derived from the title when omitted
    #[validate(length(min = 1, max = 255, message = "Slug must be 1-255 characters"))]
    pub slug: Option<String>,

    #[validate(length(max = 500, message = "Excerpt must be at most 500 characters"))]
    pub excerpt: Option<String>,

    #[validate(length(min = 1, message = "Content cannot be empty"))]
    pub content: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[validate(url(message = "Cover image must be a URL"))]
    pub cover_image_url: Option<String>,

    #[serde(default = "default_status")]
    pub status: BlogStatus,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateBlogRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: Option<String>,

    #[validate(length(min = 1, max = 255, message = "Slug must be 1-255 characters"))]
    pub slug: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub excerpt: Option<Option<String>>,

    #[validate(length(min = 1, message = "Content cannot be empty"))]
    pub content: Option<String>,

    pub tags: Option<Vec<String>>,

    #[serde(default, deserialize_with = "double_option")]
    pub cover_image_url: Option<Option<String>>,

    pub status: Option<BlogStatus>,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: bool,
}

/// Normalises a client-supplied or title-derived slug
fn make_slug(source: &str) -> ApiResult<String> {
    let slug = slugify(source);
    if slug.is_empty() {
        return Err(ApiError::invalid_field(
            "slug",
            "Slug must contain at least one letter or digit",
        ));
    }
    Ok(slug)
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = tags
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    cleaned.sort();
    cleaned.dedup();
    cleaned
}

pub async fn list_blogs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(pagination): Query<Pagination>,
    Query(query): Query<BlogQuery>,
) -> ApiResult<Json<Page<Blog>>> {
    let mut published_only = true;
    if query.include_drafts {
        if let Some(auth) = optional_auth(&state, &headers).await {
            published_only = !auth.is_admin;
        }
    }

    let tag = query.tag.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let tag = tag.map(str::to_lowercase);

    let blogs = Blog::list(
        &state.db,
        published_only,
        tag.as_deref(),
        pagination.limit(),
        pagination.offset(),
    )
    .await?;

    Ok(Json(Page::new(blogs, &pagination)))
}

pub async fn get_blog_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<Blog>> {
    let blog = Blog::find_published_by_slug(&state.db, &slug)
        .await?
        .ok_or_else(|| ApiError::NotFound("Blog post not found".to_string()))?;

    Ok(Json(blog))
}

pub async fn create_blog(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateBlogRequest>,
) -> ApiResult<(StatusCode, Json<Blog>)> {
    require_admin(&auth)?;
    req.validate()?;

    let slug = make_slug(req.slug.as_deref().unwrap_or(&req.title))?;

    let blog = Blog::create(
        &state.db,
        CreateBlog {
            author_id: auth.user_id,
            title: req.title.trim().to_string(),
            slug,
            excerpt: req.excerpt,
            content: req.content,
            tags: clean_tags(req.tags),
            cover_image_url: req.cover_image_url,
            status: req.status,
        },
    )
    .await?;

    tracing::info!(blog_id = %blog.id, slug = %blog.slug, "Blog post created");

    Ok((StatusCode::CREATED, Json(blog)))
}

pub async fn update_blog(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(blog_id): Path<Uuid>,
    Json(req): Json<UpdateBlogRequest>,
) -> ApiResult<Json<Blog>> {
    require_admin(&auth)?;
    req.validate()?;

    let slug = req.slug.as_deref().map(make_slug).transpose()?;

    let blog = Blog::update(
        &state.db,
        blog_id,
        UpdateBlog {
            title: req.title.map(|t| t.trim().to_string()),
            slug,
            excerpt: req.excerpt,
            content: req.content,
            tags: req.tags.map(clean_tags),
            cover_image_url: req.cover_image_url,
            status: req.status,
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Blog post not found".to_string()))?;

    Ok(Json(blog))
}

pub async fn delete_blog(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(blog_id): Path<Uuid>,
) -> ApiResult<Json<DeletedResponse>> {
    require_admin(&auth)?;

    if !Blog::delete(&state.db, blog_id).await? {
        return Err(ApiError::NotFound("Blog post not found".to_string()));
    }

    tracing::info!(blog_id = %blog_id, actor = %auth.user_id, "Blog post deleted");

    Ok(Json(DeletedResponse { deleted: true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_slug() {
        assert_eq!(make_slug("Cash Flow 101").unwrap(), "cash-flow-101");
        assert!(make_slug("!!!").is_err());
    }

    #[test]
    fn test_clean_tags() {
        let tags = vec![
            " Finance ".to_string(),
            "finance".to_string(),
            "".to_string(),
            "SME".to_string(),
        ];
        assert_eq!(clean_tags(tags), vec!["finance", "sme"]);
    }

    #[test]
    fn test_create_blog_defaults_to_draft() {
        let req: CreateBlogRequest = serde_json::from_value(serde_json::json!({
            "title": "Hello",
            "content": "First post"
        }))
        .unwrap();

        assert_eq!(req.status, BlogStatus::Draft);
        assert!(req.tags.is_empty());
        assert!(req.validate().is_ok());
    }
}
