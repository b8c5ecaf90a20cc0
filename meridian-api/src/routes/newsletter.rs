/// Newsletter endpoints
///
/// - `POST /v1/newsletter/subscribe` - Subscribe (public)
/// - `POST /v1/newsletter/unsubscribe` - Unsubscribe (public)
/// - `GET /v1/newsletter/subscribers` - List subscribers (admin)
/// - `POST /v1/newsletter/campaigns/welcome` - Queue the welcome email for
///   everyone who has not had it yet (admin)
///
/// The campaign only queues emails; the worker sends them one at a time with
/// a delay between messages.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{Page, Pagination},
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use meridian_shared::{
    auth::{authorization::require_admin, middleware::AuthContext},
    models::newsletter::{NewsletterSubscriber, SubscribeOutcome},
    notifications::{enqueue, Notification},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct SubscribeRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UnsubscribeRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubscriberQuery {
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Serialize)]
pub struct SubscribersPage {
    #[serde(flatten)]
    pub page: Page<NewsletterSubscriber>,
    pub active_count: i64,
}

#[derive(Debug, Serialize)]
pub struct UnsubscribeResponse {
    pub unsubscribed: bool,
}

#[derive(Debug, Serialize)]
pub struct CampaignResponse {
    pub queued: usize,
}

/// Subscribes an address
///
/// A previously unsubscribed address is reactivated.
///
/// # Errors
///
/// - `409 Conflict`: already subscribed
pub async fn subscribe(
    State(state): State<AppState>,
    Json(req): Json<SubscribeRequest>,
) -> ApiResult<(StatusCode, Json<NewsletterSubscriber>)> {
    req.validate()?;
    let email = req.email.trim().to_lowercase();
    let name = req.name.as_deref().map(str::trim);

    match NewsletterSubscriber::subscribe(&state.db, &email, name).await? {
        SubscribeOutcome::Created(subscriber) => {
            tracing::info!(subscriber_id = %subscriber.id, "Newsletter subscription created");
            Ok((StatusCode::CREATED, Json(subscriber)))
        }
        SubscribeOutcome::Reactivated(subscriber) => {
            tracing::info!(subscriber_id = %subscriber.id, "Newsletter subscription reactivated");
            Ok((StatusCode::CREATED, Json(subscriber)))
        }
        SubscribeOutcome::AlreadyActive => {
            Err(ApiError::Conflict("Already subscribed".to_string()))
        }
    }
}

/// Unsubscribes an address
///
/// Unknown or already-unsubscribed addresses succeed with
/// `unsubscribed: false` so the endpoint does not reveal who is subscribed.
pub async fn unsubscribe(
    State(state): State<AppState>,
    Json(req): Json<UnsubscribeRequest>,
) -> ApiResult<Json<UnsubscribeResponse>> {
    req.validate()?;
    let email = req.email.trim().to_lowercase();

    let unsubscribed = NewsletterSubscriber::unsubscribe(&state.db, &email).await?;

    Ok(Json(UnsubscribeResponse { unsubscribed }))
}

pub async fn list_subscribers(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(pagination): Query<Pagination>,
    Query(query): Query<SubscriberQuery>,
) -> ApiResult<Json<SubscribersPage>> {
    require_admin(&auth)?;

    let subscribers = NewsletterSubscriber::list(
        &state.db,
        query.active_only,
        pagination.limit(),
        pagination.offset(),
    )
    .await?;
    let active_count = NewsletterSubscriber::count_active(&state.db).await?;

    Ok(Json(SubscribersPage {
        page: Page::new(subscribers, &pagination),
        active_count,
    }))
}

/// Queues the welcome email for every active subscriber who has not had it
///
/// Claiming subscribers and queueing their emails commit together, so a
/// failure leaves them eligible for the next run and a concurrent run cannot
/// claim the same subscribers.
pub async fn send_welcome_campaign(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<CampaignResponse>> {
    require_admin(&auth)?;

    let mut tx = state.db.begin().await?;

    let subscribers = NewsletterSubscriber::claim_pending_welcome(&mut *tx).await?;
    let unsubscribe_url = state.frontend_link("/newsletter/unsubscribe");

    for subscriber in &subscribers {
        enqueue(
            &mut *tx,
            &subscriber.email,
            subscriber.name.as_deref(),
            &Notification::NewsletterWelcome {
                unsubscribe_url: unsubscribe_url.clone(),
            },
        )
        .await?;
    }

    tx.commit().await?;

    tracing::info!(
        actor = %auth.user_id,
        queued = subscribers.len(),
        "Newsletter welcome campaign queued"
    );

    Ok(Json(CampaignResponse {
        queued: subscribers.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_validation() {
        let req = SubscribeRequest {
            email: "reader@example.com".to_string(),
            name: None,
        };
        assert!(req.validate().is_ok());

        let req = SubscribeRequest {
            email: "nope".to_string(),
            name: Some(String::new()),
        };
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("email"));
        assert!(errors.field_errors().contains_key("name"));
    }

    #[test]
    fn test_subscribers_page_shape() {
        let body = SubscribersPage {
            page: Page::new(Vec::new(), &Pagination::default()),
            active_count: 3,
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["active_count"], 3);
        assert_eq!(json["page"], 1);
        assert!(json["items"].as_array().unwrap().is_empty());
    }
}
