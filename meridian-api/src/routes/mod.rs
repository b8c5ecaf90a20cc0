/// API route handlers
///
/// One module per resource:
///
/// - `health`: Health check endpoint
/// - `auth`: register, login, refresh, email verification, password reset
/// - `users`: profiles and admin user management
/// - `courses`: catalogue, enrollment requests, course deletion
/// - `assignments`: assignments, submissions and marks
/// - `live_classes`: live class sessions and attendance
/// - `appointments`: consultation appointments
/// - `payments`: initialize, confirm, webhook, history
/// - `blogs`: blog CMS
/// - `consultations`: contact-form consultation requests
/// - `newsletter`: subscriptions and the welcome campaign

pub mod appointments;
pub mod assignments;
pub mod auth;
pub mod blogs;
pub mod consultations;
pub mod courses;
pub mod health;
pub mod live_classes;
pub mod newsletter;
pub mod payments;
pub mod users;

use axum::http::HeaderMap;
use meridian_shared::auth::middleware::{authenticate, AuthContext};
use serde::{Deserialize, Deserializer, Serialize};

use crate::app::AppState;

/// Default page size
pub const DEFAULT_PER_PAGE: i64 = 20;

/// Largest page a client may request
pub const MAX_PER_PAGE: i64 = 100;

/// `?page=&per_page=` query parameters (1-based pages)
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Pagination {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl Pagination {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> i64 {
        self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.limit())
    }
}

/// One page of results
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, pagination: &Pagination) -> Self {
        Self {
            items,
            page: pagination.page(),
            per_page: pagination.limit(),
            total: None,
        }
    }

    pub fn with_total(mut self, total: i64) -> Self {
        self.total = Some(total);
        self
    }
}

/// Distinguishes an absent field from an explicit `null`
///
/// Use with `#[serde(default, deserialize_with = "double_option")]`:
/// absent gives `None`, `null` gives `Some(None)`.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Resolves the caller on a public route, if they sent a usable token
///
/// A bad token is treated as anonymous rather than rejected.
pub(crate) async fn optional_auth(state: &AppState, headers: &HeaderMap) -> Option<AuthContext> {
    if !headers.contains_key(axum::http::header::AUTHORIZATION) {
        return None;
    }

    match authenticate(&state.db, state.jwt_secret(), headers).await {
        Ok(auth) => Some(auth),
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring unusable credentials on public route");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "double_option")]
        bio: Option<Option<String>>,
    }

    #[test]
    fn test_double_option() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.bio, None);

        let cleared: Patch = serde_json::from_str(r#"{"bio": null}"#).unwrap();
        assert_eq!(cleared.bio, Some(None));

        let set: Patch = serde_json::from_str(r#"{"bio": "hi"}"#).unwrap();
        assert_eq!(set.bio, Some(Some("hi".to_string())));
    }

    #[test]
    fn test_pagination_defaults() {
        let p = Pagination::default();
        assert_eq!(p.page(), 1);
        assert_eq!(p.limit(), DEFAULT_PER_PAGE);
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn test_pagination_clamps() {
        let p = Pagination {
            page: Some(3),
            per_page: Some(10),
        };
        assert_eq!(p.offset(), 20);

        let p = Pagination {
            page: Some(0),
            per_page: Some(10_000),
        };
        assert_eq!(p.page(), 1);
        assert_eq!(p.limit(), MAX_PER_PAGE);

        let p = Pagination {
            page: Some(-4),
            per_page: Some(0),
        };
        assert_eq!(p.limit(), 1);
        assert_eq!(p.offset(), 0);
    }
}
