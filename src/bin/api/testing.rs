//! Router fixture shared by the handler tests.

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use rstest::fixture;
use serde_json::Value;
use tower::ServiceExt;

use crate::{
    database::models::{ingredient::Ingredient, recipe::Recipe, tag::Tag, user::User},
    store::MemoryStore,
};

use super::{router, state::AppState};

pub struct Fixture {
    pub app: Router,
    pub store: MemoryStore,
    pub author: User,
    pub other: User,
    pub lunch: Tag,
    pub salt: Ingredient,
    pub soup: Recipe,
    pub stew: Recipe,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn text(&self) -> String {
        String::from_utf8(self.body.to_vec()).unwrap()
    }
}

/// Tokens: `author-token`, `other-token`, `admin-token`, `banned-token`,
/// `banned-admin-token`. `author` owns `soup` and `stew`.
#[fixture]
pub fn seeded() -> Fixture {
    let store = MemoryStore::new();

    let author = store.insert_user("author", false);
    let other = store.insert_user("other", false);
    let admin = store.insert_user("admin", true);
    let banned = store.insert_user("banned", false);
    let banned_admin = store.insert_user("banned_admin", true);
    store.set_active(banned.id, false);
    store.set_active(banned_admin.id, false);

    store.insert_token("author-token", author.id);
    store.insert_token("other-token", other.id);
    store.insert_token("admin-token", admin.id);
    store.insert_token("banned-token", banned.id);
    store.insert_token("banned-admin-token", banned_admin.id);

    store.insert_tag("Breakfast", "#E26C2D", "breakfast");
    let lunch = store.insert_tag("Lunch", "#49B64E", "lunch");

    let salt = store.insert_ingredient("Salt", "grams");
    let sugar = store.insert_ingredient("Sugar", "grams");

    let soup = store.insert_recipe(author.id, "Soup", &[(salt.id, 5.0)]);
    let stew = store.insert_recipe(author.id, "Stew", &[(salt.id, 3.0), (sugar.id, 0.5)]);

    let app = router(AppState::new(Arc::new(store.clone()), 6));

    Fixture {
        app,
        store,
        author,
        other,
        lunch,
        salt,
        soup,
        stew,
    }
}

impl Fixture {
    pub async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> TestResponse {
        let body = body.map(|value| value.to_string()).unwrap_or_default();

        self.send_raw(method, uri, token, &body).await
    }

    pub async fn send_raw(&self, method: Method, uri: &str, token: Option<&str>, body: &str) -> TestResponse {
        send_to(&self.app, method, uri, token, body).await
    }
}

/// One request against any router, for tests that build their own store.
pub async fn send_to(app: &Router, method: Method, uri: &str, token: Option<&str>, body: &str) -> TestResponse {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Token {token}"));
    }

    let response = app
        .clone()
        .oneshot(request.body(Body::from(body.to_owned())).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();

    TestResponse { status, headers, body }
}
