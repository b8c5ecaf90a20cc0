/// Blog posts
///
/// Posts are addressed publicly by slug (`blogs_slug_key`). Only published
/// posts are visible to the public; `published_at` is stamped on the first
/// publish and kept if the post is later unpublished and republished.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "blog_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BlogStatus {
    Draft,
    Published,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Blog {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub tags: Vec<String>,
    pub cover_image_url: Option<String>,
    pub status: BlogStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateBlog {
    pub author_id: Uuid,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub tags: Vec<String>,
    pub cover_image_url: Option<String>,
    pub status: BlogStatus,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateBlog {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub excerpt: Option<Option<String>>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub cover_image_url: Option<Option<String>>,
    pub status: Option<BlogStatus>,
}

/// Turns a title into a URL slug
///
/// Lowercases, keeps ASCII letters and digits, and collapses everything
/// else into single hyphens.
///
/// ```
/// use meridian_shared::models::blog::slugify;
///
/// assert_eq!(slugify("  Growing Your SME: 5 Tips!  "), "growing-your-sme-5-tips");
/// ```
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

impl Blog {
    pub async fn create(pool: &PgPool, data: CreateBlog) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Blog>(
            r#"
            INSERT INTO blogs
                (author_id, title, slug, excerpt, content, tags, cover_image_url, status, published_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8,
                    CASE WHEN $8 = 'published'::blog_status THEN NOW() END)
            RETURNING *
            "#,
        )
        .bind(data.author_id)
        .bind(data.title)
        .bind(data.slug)
        .bind(data.excerpt)
        .bind(data.content)
        .bind(data.tags)
        .bind(data.cover_image_url)
        .bind(data.status)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Blog>("SELECT * FROM blogs WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_published_by_slug(
        pool: &PgPool,
        slug: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Blog>("SELECT * FROM blogs WHERE slug = $1 AND status = 'published'")
            .bind(slug)
            .fetch_optional(pool)
            .await
    }

    /// Lists posts, newest first
    ///
    /// `published_only` hides drafts; `tag` keeps posts carrying that tag.
    pub async fn list(
        pool: &PgPool,
        published_only: bool,
        tag: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Blog>(
            r#"
            SELECT * FROM blogs
            WHERE (NOT $1 OR status = 'published')
              AND ($2::text IS NULL OR $2 = ANY(tags))
            ORDER BY COALESCE(published_at, created_at) DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(published_only)
        .bind(tag)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    pub async fn update(pool: &PgPool, id: Uuid, data: UpdateBlog) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE blogs SET updated_at = NOW()");
        let mut bind_count = 1;

        if data.title.is_some() {
            bind_count += 1;
            query.push_str(&format!(", title = ${}", bind_count));
        }
        if data.slug.is_some() {
            bind_count += 1;
            query.push_str(&format!(", slug = ${}", bind_count));
        }
        if data.excerpt.is_some() {
            bind_count += 1;
            query.push_str(&format!(", excerpt = ${}", bind_count));
        }
        if data.content.is_some() {
            bind_count += 1;
            query.push_str(&format!(", content = ${}", bind_count));
        }
        if data.tags.is_some() {
            bind_count += 1;
            query.push_str(&format!(", tags = ${}", bind_count));
        }
        if data.cover_image_url.is_some() {
            bind_count += 1;
            query.push_str(&format!(", cover_image_url = ${}", bind_count));
        }
        if data.status.is_some() {
            bind_count += 1;
            query.push_str(&format!(
                ", status = ${0}, published_at = CASE WHEN ${0} = 'published'::blog_status \
                 THEN COALESCE(published_at, NOW()) ELSE published_at END",
                bind_count
            ));
        }

        query.push_str(" WHERE id = $1 RETURNING *");

        let mut q = sqlx::query_as::<_, Blog>(&query).bind(id);

        if let Some(title) = data.title {
            q = q.bind(title);
        }
        if let Some(slug) = data.slug {
            q = q.bind(slug);
        }
        if let Some(excerpt) = data.excerpt {
            q = q.bind(excerpt);
        }
        if let Some(content) = data.content {
            q = q.bind(content);
        }
        if let Some(tags) = data.tags {
            q = q.bind(tags);
        }
        if let Some(cover_image_url) = data.cover_image_url {
            q = q.bind(cover_image_url);
        }
        if let Some(status) = data.status {
            q = q.bind(status);
        }

        q.fetch_optional(pool).await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM blogs WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
