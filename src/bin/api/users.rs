use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;

use crate::{
    access_control::Actor,
    store::{Page, StoreError},
};

use super::{
    actor::require_writer,
    error::AppError,
    pagination::{positive, Paginated},
    state::AppState,
    views::{SubscriptionView, UserView},
};

#[derive(Deserialize, Debug, Default)]
pub struct SubscriptionQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub recipes_limit: Option<String>,
}

impl SubscriptionQuery {
    fn recipes_limit(&self) -> Option<i64> {
        self.recipes_limit.as_deref().and_then(positive).map(i64::from)
    }
}

pub async fn retrieve(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i32>,
) -> Result<Json<UserView>, AppError> {
    let viewer = actor.id();

    let view = state
        .run(move |store| {
            let user = store.user(id)?.ok_or(AppError::NotFound)?;
            Ok(UserView::build(store, viewer, user)?)
        })
        .await?;

    Ok(Json(view))
}

pub async fn me(State(state): State<AppState>, actor: Actor) -> Result<Json<UserView>, AppError> {
    let Actor::User(user) = actor else {
        return Err(AppError::Unauthorized);
    };

    let view = state
        .run(move |store| Ok(UserView::build(store, Some(user.id), user)?))
        .await?;

    Ok(Json(view))
}

pub async fn subscriptions(
    State(state): State<AppState>,
    actor: Actor,
    OriginalUri(uri): OriginalUri,
    Query(query): Query<SubscriptionQuery>,
) -> Result<Json<Paginated<SubscriptionView>>, AppError> {
    let user_id = actor.id().ok_or(AppError::Unauthorized)?;

    let page = Page::new(
        query.page.as_deref().and_then(positive).unwrap_or(1),
        query.limit.as_deref().and_then(positive).unwrap_or(state.page_size),
    );
    let recipes_limit = query.recipes_limit();

    let (views, count) = state
        .run(move |store| {
            let (authors, count) = store.followed_authors(user_id, page)?;
            let views = authors
                .into_iter()
                .map(|author| SubscriptionView::build(store, user_id, author, recipes_limit))
                .collect::<Result<Vec<_>, _>>()?;
            Ok((views, count))
        })
        .await?;

    Ok(Json(Paginated::new(views, count, page, &uri)))
}

pub async fn subscribe(
    State(state): State<AppState>,
    actor: Actor,
    Path(author_id): Path<i32>,
    Query(query): Query<SubscriptionQuery>,
) -> Result<(StatusCode, Json<SubscriptionView>), AppError> {
    let user_id = require_writer(&actor)?;
    let recipes_limit = query.recipes_limit();

    let view = state
        .run(move |store| {
            let author = store.user(author_id)?.ok_or(AppError::NotFound)?;

            store.follow(user_id, author_id).map_err(|error| match error {
                StoreError::DuplicateEntry => AppError::DuplicateEntry("Already subscribed to this author.".to_owned()),
                other => other.into(),
            })?;
            info!(user_id, author_id, "Subscribed");

            Ok(SubscriptionView::build(store, user_id, author, recipes_limit)?)
        })
        .await?;

    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn unsubscribe(
    State(state): State<AppState>,
    actor: Actor,
    Path(author_id): Path<i32>,
) -> Result<StatusCode, AppError> {
    let user_id = require_writer(&actor)?;

    state
        .run(move |store| {
            store.user(author_id)?.ok_or(AppError::NotFound)?;

            if store.unfollow(user_id, author_id)? {
                Ok(())
            } else {
                Err(AppError::MissingEntry("Not subscribed to this author.".to_owned()))
            }
        })
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use rstest::rstest;

    use crate::{
        api::testing::{seeded, Fixture},
        store::RecipeStore,
    };

    #[rstest]
    #[tokio::test]
    async fn subscribing_to_oneself_is_rejected(seeded: Fixture) {
        let uri = format!("/api/users/{}/subscribe/", seeded.other.id);

        let response = seeded.send(Method::POST, &uri, Some("other-token"), None).await;

        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.json()["detail"], "You cannot subscribe to yourself.");
        assert!(!seeded.store.is_following(seeded.other.id, seeded.other.id).unwrap());
    }

    #[rstest]
    #[tokio::test]
    async fn second_subscription_is_a_bad_request(seeded: Fixture) {
        let uri = format!("/api/users/{}/subscribe/?recipes_limit=1", seeded.author.id);

        let first = seeded.send(Method::POST, &uri, Some("other-token"), None).await;
        let second = seeded.send(Method::POST, &uri, Some("other-token"), None).await;

        assert_eq!(first.status, StatusCode::CREATED);
        let subscription = first.json();
        assert_eq!(subscription["id"], seeded.author.id);
        assert_eq!(subscription["is_subscribed"], true);
        assert_eq!(subscription["recipes"].as_array().unwrap().len(), 1);
        assert_eq!(subscription["recipes_count"], 2);
        assert_eq!(second.status, StatusCode::BAD_REQUEST);
    }

    #[rstest]
    #[tokio::test]
    async fn subscribing_to_missing_user_is_not_found(seeded: Fixture) {
        let response = seeded
            .send(Method::POST, "/api/users/9999/subscribe/", Some("other-token"), None)
            .await;

        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[rstest]
    #[tokio::test]
    async fn anonymous_cannot_subscribe(seeded: Fixture) {
        let uri = format!("/api/users/{}/subscribe/", seeded.author.id);

        let response = seeded.send(Method::POST, &uri, None, None).await;

        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    #[rstest]
    #[tokio::test]
    async fn unsubscribe_without_subscription_is_a_bad_request(seeded: Fixture) {
        let uri = format!("/api/users/{}/subscribe/", seeded.author.id);

        let response = seeded.send(Method::DELETE, &uri, Some("other-token"), None).await;

        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }

    #[rstest]
    #[tokio::test]
    async fn subscriptions_list_followed_authors(seeded: Fixture) {
        let subscribe = format!("/api/users/{}/subscribe/", seeded.author.id);
        seeded.send(Method::POST, &subscribe, Some("other-token"), None).await;

        let response = seeded
            .send(Method::GET, "/api/users/subscriptions/", Some("other-token"), None)
            .await;
        let profile = seeded
            .send(Method::GET, &format!("/api/users/{}/", seeded.author.id), Some("other-token"), None)
            .await;

        let page = response.json();
        assert_eq!(page["count"], 1);
        assert_eq!(page["results"][0]["username"], "author");
        assert_eq!(page["results"][0]["recipes"].as_array().unwrap().len(), 2);
        assert_eq!(profile.json()["is_subscribed"], true);
    }

    #[rstest]
    #[tokio::test]
    async fn me_requires_authentication(seeded: Fixture) {
        let anonymous = seeded.send(Method::GET, "/api/users/me/", None, None).await;
        let known = seeded.send(Method::GET, "/api/users/me/", Some("author-token"), None).await;

        assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
        assert_eq!(known.json()["username"], "author");
    }
}
