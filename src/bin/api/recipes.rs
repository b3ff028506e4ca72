use std::collections::HashSet;

use axum::{
    extract::{rejection::JsonRejection, OriginalUri, Path, Query, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        Method, StatusCode,
    },
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use tracing::info;

use crate::{
    access_control::{authorize, Action, Actor},
    database::models::recipe::Recipe,
    shopping_list::shopping_list_for,
    store::{Page, RecipeDraft, RecipeFilter, RecipeStore, StoreError},
};

use super::{
    actor::require_writer,
    error::AppError,
    pagination::{positive, Paginated},
    state::AppState,
    views::{RecipeView, ShortRecipeView},
};

const NAME_MAX_CHARS: usize = 200;
const MIN_AMOUNT: f64 = 0.01;

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct IngredientAmount {
    pub id: i32,
    pub amount: f64,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct RecipePayload {
    #[serde(default)]
    pub ingredients: Vec<IngredientAmount>,
    #[serde(default)]
    pub tags: Vec<i32>,
    pub image: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub cooking_time: i64,
}

impl RecipePayload {
    /// Checks the payload shape; whether the referenced tags and ingredients
    /// exist is left to the store.
    pub fn validate(self, require_image: bool) -> Result<RecipeDraft, AppError> {
        let invalid = |message: &str| Err(AppError::Validation(message.to_owned()));

        if self.name.trim().is_empty() {
            return invalid("Recipe name is required.");
        }
        if self.name.chars().count() > NAME_MAX_CHARS {
            return invalid("Recipe name must be at most 200 characters.");
        }
        if self.tags.is_empty() {
            return invalid("At least one tag is required.");
        }
        if self.ingredients.is_empty() {
            return invalid("At least one ingredient is required.");
        }

        let mut seen_tags = HashSet::new();
        if !self.tags.iter().all(|id| seen_tags.insert(*id)) {
            return invalid("Tags must not repeat.");
        }

        let mut seen_ingredients = HashSet::new();
        if !self.ingredients.iter().all(|line| seen_ingredients.insert(line.id)) {
            return invalid("Ingredients must not repeat.");
        }

        if self
            .ingredients
            .iter()
            .any(|line| !line.amount.is_finite() || line.amount < MIN_AMOUNT)
        {
            return invalid("Ingredient amount must be at least 0.01.");
        }

        let Some(cooking_time) = i16::try_from(self.cooking_time).ok().filter(|time| *time >= 1) else {
            return invalid("Cooking time must be at least 1 minute.");
        };

        let image = self.image.filter(|image| !image.trim().is_empty());
        if require_image && image.is_none() {
            return invalid("Image is required.");
        }

        Ok(RecipeDraft {
            name: self.name,
            text: self.text,
            image,
            cooking_time,
            tags: self.tags,
            ingredients: self
                .ingredients
                .into_iter()
                .map(|line| (line.id, line.amount))
                .collect(),
        })
    }
}

#[derive(Debug, Default, PartialEq)]
struct ListParams {
    page: Option<u32>,
    limit: Option<u32>,
    author: Option<i32>,
    tags: Vec<String>,
    is_favorited: bool,
    is_in_shopping_cart: bool,
}

impl ListParams {
    fn parse(pairs: Vec<(String, String)>) -> Self {
        let flag = |value: &str| matches!(value, "1" | "true");

        pairs
            .into_iter()
            .fold(Self::default(), |mut params, (key, value)| {
                match key.as_str() {
                    "page" => params.page = positive(&value),
                    "limit" => params.limit = positive(&value),
                    "author" => params.author = value.parse().ok(),
                    "tags" => params.tags.push(value),
                    "is_favorited" => params.is_favorited = flag(&value),
                    "is_in_shopping_cart" => params.is_in_shopping_cart = flag(&value),
                    _ => {}
                }
                params
            })
    }
}

pub async fn list(
    State(state): State<AppState>,
    actor: Actor,
    OriginalUri(uri): OriginalUri,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<Paginated<RecipeView>>, AppError> {
    AppError::check(&actor, authorize(&actor, Action::Read, None))?;

    let params = ListParams::parse(pairs);
    let page = Page::new(params.page.unwrap_or(1), params.limit.unwrap_or(state.page_size));
    let viewer = actor.id();

    // personal filters match nothing for anonymous actors
    if viewer.is_none() && (params.is_favorited || params.is_in_shopping_cart) {
        return Ok(Json(Paginated::new(Vec::new(), 0, page, &uri)));
    }

    let filter = RecipeFilter {
        author: params.author,
        tags: params.tags,
        favorited_by: viewer.filter(|_| params.is_favorited),
        in_cart_of: viewer.filter(|_| params.is_in_shopping_cart),
    };

    let (views, count) = state
        .run(move |store| {
            let (recipes, count) = store.recipes(&filter, page)?;
            let views = recipes
                .into_iter()
                .map(|recipe| RecipeView::build(store, viewer, recipe))
                .collect::<Result<Vec<_>, _>>()?;
            Ok((views, count))
        })
        .await?;

    Ok(Json(Paginated::new(views, count, page, &uri)))
}

pub async fn create(
    State(state): State<AppState>,
    actor: Actor,
    payload: Result<Json<RecipePayload>, JsonRejection>,
) -> Result<(StatusCode, Json<RecipeView>), AppError> {
    let author_id = require_writer(&actor)?;
    let draft = payload?.0.validate(true)?;

    let view = state
        .run(move |store| {
            let recipe = store.create_recipe(author_id, &draft)?;
            info!(recipe_id = recipe.id, author_id, "Recipe created");
            Ok(RecipeView::build(store, Some(author_id), recipe)?)
        })
        .await?;

    Ok((StatusCode::CREATED, Json(view)))
}

/// Coarse check, lookup, then object check: 401/403 come before 404.
async fn authorized_recipe(state: &AppState, actor: &Actor, method: &Method, id: i32) -> Result<Recipe, AppError> {
    let action = Action::from_method(method);
    AppError::check(actor, authorize(actor, action, None))?;

    let recipe = state.run(move |store| store.recipe(id)?.ok_or(AppError::NotFound)).await?;
    AppError::check(actor, authorize(actor, action, Some(&recipe)))?;

    Ok(recipe)
}

pub async fn retrieve(
    State(state): State<AppState>,
    actor: Actor,
    method: Method,
    Path(id): Path<i32>,
) -> Result<Json<RecipeView>, AppError> {
    let recipe = authorized_recipe(&state, &actor, &method, id).await?;

    let viewer = actor.id();
    let view = state
        .run(move |store| Ok(RecipeView::build(store, viewer, recipe)?))
        .await?;

    Ok(Json(view))
}

pub async fn update(
    State(state): State<AppState>,
    actor: Actor,
    method: Method,
    Path(id): Path<i32>,
    payload: Result<Json<RecipePayload>, JsonRejection>,
) -> Result<Json<RecipeView>, AppError> {
    authorized_recipe(&state, &actor, &method, id).await?;

    let draft = payload?.0.validate(false)?;
    let viewer = actor.id();

    let view = state
        .run(move |store| {
            let recipe = store.update_recipe(id, &draft)?;
            info!(recipe_id = id, "Recipe updated");
            Ok(RecipeView::build(store, viewer, recipe)?)
        })
        .await?;

    Ok(Json(view))
}

pub async fn destroy(
    State(state): State<AppState>,
    actor: Actor,
    method: Method,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    authorized_recipe(&state, &actor, &method, id).await?;

    state.run(move |store| Ok(store.delete_recipe(id)?)).await?;
    info!(recipe_id = id, "Recipe deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// The per-user recipe collections a recipe can be added to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Collection {
    Favorites,
    ShoppingCart,
}

impl Collection {
    fn label(self) -> &'static str {
        match self {
            Collection::Favorites => "favorites",
            Collection::ShoppingCart => "the shopping cart",
        }
    }

    fn add(self, store: &dyn RecipeStore, user_id: i32, recipe_id: i32) -> Result<(), StoreError> {
        match self {
            Collection::Favorites => store.add_favorite(user_id, recipe_id),
            Collection::ShoppingCart => store.add_to_cart(user_id, recipe_id),
        }
    }

    fn remove(self, store: &dyn RecipeStore, user_id: i32, recipe_id: i32) -> Result<bool, StoreError> {
        match self {
            Collection::Favorites => store.remove_favorite(user_id, recipe_id),
            Collection::ShoppingCart => store.remove_from_cart(user_id, recipe_id),
        }
    }
}

async fn add_to(
    state: AppState,
    actor: Actor,
    recipe_id: i32,
    collection: Collection,
) -> Result<(StatusCode, Json<ShortRecipeView>), AppError> {
    let user_id = require_writer(&actor)?;

    let view = state
        .run(move |store| {
            let recipe = store
                .recipe(recipe_id)?
                .ok_or_else(|| AppError::Validation("Recipe does not exist.".to_owned()))?;

            collection
                .add(store, user_id, recipe_id)
                .map_err(|error| match error {
                    StoreError::DuplicateEntry => {
                        AppError::DuplicateEntry(format!("Recipe is already in {}.", collection.label()))
                    }
                    StoreError::InvalidReference => AppError::Validation("Recipe does not exist.".to_owned()),
                    other => other.into(),
                })?;

            Ok(ShortRecipeView::from(recipe))
        })
        .await?;

    Ok((StatusCode::CREATED, Json(view)))
}

async fn remove_from(
    state: AppState,
    actor: Actor,
    recipe_id: i32,
    collection: Collection,
) -> Result<StatusCode, AppError> {
    let user_id = require_writer(&actor)?;

    state
        .run(move |store| {
            store.recipe(recipe_id)?.ok_or(AppError::NotFound)?;

            if collection.remove(store, user_id, recipe_id)? {
                Ok(())
            } else {
                Err(AppError::MissingEntry(format!("Recipe is not in {}.", collection.label())))
            }
        })
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_favorite(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i32>,
) -> Result<(StatusCode, Json<ShortRecipeView>), AppError> {
    add_to(state, actor, id, Collection::Favorites).await
}

pub async fn remove_favorite(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    remove_from(state, actor, id, Collection::Favorites).await
}

pub async fn add_to_cart(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i32>,
) -> Result<(StatusCode, Json<ShortRecipeView>), AppError> {
    add_to(state, actor, id, Collection::ShoppingCart).await
}

pub async fn remove_from_cart(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    remove_from(state, actor, id, Collection::ShoppingCart).await
}

pub async fn download_shopping_cart(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<impl IntoResponse, AppError> {
    let user_id = actor.id().ok_or(AppError::Unauthorized)?;

    let text = state
        .run(move |store| Ok(shopping_list_for(store, user_id)?.render()))
        .await?;

    Ok((
        [
            (CONTENT_TYPE, "text/plain; charset=utf-8"),
            (CONTENT_DISPOSITION, "attachment; filename=shopping_list.txt"),
        ],
        text,
    ))
}

#[cfg(test)]
mod tests {
    use axum::http::header;
    use rstest::rstest;
    use serde_json::{json, Value};

    use super::*;
    use crate::api::testing::{seeded, Fixture};

    fn payload(value: Value) -> RecipePayload {
        serde_json::from_value(value).unwrap()
    }

    fn valid() -> Value {
        json!({
            "ingredients": [{"id": 1, "amount": 10}, {"id": 2, "amount": 0.5}],
            "tags": [1, 2],
            "image": "data:image/png;base64,AAAA",
            "name": "Pancakes",
            "text": "Mix and fry.",
            "cooking_time": 20
        })
    }

    fn with(field: &str, value: Value) -> Value {
        let mut body = valid();
        body[field] = value;
        body
    }

    #[rstest]
    fn valid_payload_becomes_a_draft() {
        let draft = payload(valid()).validate(true).unwrap();

        assert_eq!(draft.tags, vec![1, 2]);
        assert_eq!(draft.ingredients, vec![(1, 10.0), (2, 0.5)]);
        assert_eq!(draft.cooking_time, 20);
    }

    #[rstest]
    #[case::no_tags(with("tags", json!([])))]
    #[case::no_ingredients(with("ingredients", json!([])))]
    #[case::repeated_tag(with("tags", json!([1, 1])))]
    #[case::repeated_ingredient(with("ingredients", json!([{"id": 1, "amount": 1}, {"id": 1, "amount": 2}])))]
    #[case::tiny_amount(with("ingredients", json!([{"id": 1, "amount": 0.001}])))]
    #[case::zero_cooking_time(with("cooking_time", json!(0)))]
    #[case::huge_cooking_time(with("cooking_time", json!(100_000)))]
    #[case::empty_name(with("name", json!("  ")))]
    #[case::long_name(with("name", json!("a".repeat(201))))]
    #[case::no_image(with("image", Value::Null))]
    fn invalid_payloads_are_rejected(#[case] body: Value) {
        assert!(matches!(payload(body).validate(true), Err(AppError::Validation(_))));
    }

    #[rstest]
    fn image_is_optional_on_update() {
        let draft = payload(with("image", Value::Null)).validate(false).unwrap();

        assert_eq!(draft.image, None);
    }

    #[rstest]
    fn list_params_collect_repeated_tags() {
        let params = ListParams::parse(vec![
            ("tags".to_owned(), "breakfast".to_owned()),
            ("tags".to_owned(), "lunch".to_owned()),
            ("is_favorited".to_owned(), "1".to_owned()),
            ("page".to_owned(), "0".to_owned()),
            ("limit".to_owned(), "3".to_owned()),
        ]);

        assert_eq!(params.tags, vec!["breakfast", "lunch"]);
        assert!(params.is_favorited);
        assert!(!params.is_in_shopping_cart);
        assert_eq!(params.page, None);
        assert_eq!(params.limit, Some(3));
    }

    fn create_body(f: &Fixture) -> Value {
        json!({
            "ingredients": [{"id": f.salt.id, "amount": 5}],
            "tags": [f.lunch.id],
            "image": "data:image/png;base64,AAAA",
            "name": "Soup",
            "text": "Boil.",
            "cooking_time": 30
        })
    }

    #[rstest]
    #[tokio::test]
    async fn anonymous_create_is_unauthorized(seeded: Fixture) {
        let body = create_body(&seeded);

        let response = seeded.send(Method::POST, "/api/recipes/", None, Some(body)).await;

        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    #[rstest]
    #[tokio::test]
    async fn banned_user_create_is_forbidden(seeded: Fixture) {
        let body = create_body(&seeded);

        let response = seeded
            .send(Method::POST, "/api/recipes/", Some("banned-token"), Some(body))
            .await;

        assert_eq!(response.status, StatusCode::FORBIDDEN);
    }

    #[rstest]
    #[tokio::test]
    async fn unknown_token_is_unauthorized(seeded: Fixture) {
        let response = seeded.send(Method::GET, "/api/recipes/", Some("nope"), None).await;

        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    #[rstest]
    #[tokio::test]
    async fn create_returns_full_representation(seeded: Fixture) {
        let body = create_body(&seeded);

        let response = seeded
            .send(Method::POST, "/api/recipes/", Some("author-token"), Some(body))
            .await;

        assert_eq!(response.status, StatusCode::CREATED);
        let recipe = response.json();
        assert_eq!(recipe["name"], "Soup");
        assert_eq!(recipe["author"]["id"], seeded.author.id);
        assert_eq!(recipe["author"]["is_subscribed"], false);
        assert_eq!(recipe["tags"][0]["slug"], "lunch");
        assert_eq!(recipe["ingredients"][0]["name"], "Salt");
        assert_eq!(recipe["ingredients"][0]["amount"], 5.0);
        assert_eq!(recipe["is_favorited"], false);
        assert_eq!(recipe["is_in_shopping_cart"], false);
    }

    #[rstest]
    #[tokio::test]
    async fn create_with_unknown_ingredient_is_a_bad_request(seeded: Fixture) {
        let mut body = create_body(&seeded);
        body["ingredients"] = json!([{"id": 9999, "amount": 1}]);

        let response = seeded
            .send(Method::POST, "/api/recipes/", Some("author-token"), Some(body))
            .await;

        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }

    #[rstest]
    #[tokio::test]
    async fn malformed_json_is_a_bad_request(seeded: Fixture) {
        let response = seeded
            .send_raw(Method::POST, "/api/recipes/", Some("author-token"), "{not json")
            .await;

        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert!(response.json()["detail"].is_string());
    }

    #[rstest]
    #[case::anonymous(None, StatusCode::UNAUTHORIZED)]
    #[case::other_user(Some("other-token"), StatusCode::FORBIDDEN)]
    #[case::banned_admin(Some("banned-admin-token"), StatusCode::FORBIDDEN)]
    #[case::author(Some("author-token"), StatusCode::OK)]
    #[case::admin(Some("admin-token"), StatusCode::OK)]
    #[tokio::test]
    async fn patch_follows_ownership(seeded: Fixture, #[case] token: Option<&str>, #[case] expected: StatusCode) {
        let mut body = create_body(&seeded);
        body["name"] = json!("Better soup");
        let uri = format!("/api/recipes/{}/", seeded.soup.id);

        let response = seeded.send(Method::PATCH, &uri, token, Some(body)).await;

        assert_eq!(response.status, expected);
    }

    #[rstest]
    #[tokio::test]
    async fn patch_missing_recipe_is_not_found(seeded: Fixture) {
        let body = create_body(&seeded);

        let response = seeded
            .send(Method::PATCH, "/api/recipes/9999/", Some("author-token"), Some(body))
            .await;

        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[rstest]
    #[tokio::test]
    async fn delete_by_stranger_is_forbidden_and_by_author_succeeds(seeded: Fixture) {
        let uri = format!("/api/recipes/{}/", seeded.soup.id);

        let denied = seeded.send(Method::DELETE, &uri, Some("other-token"), None).await;
        let deleted = seeded.send(Method::DELETE, &uri, Some("author-token"), None).await;
        let gone = seeded.send(Method::GET, &uri, None, None).await;

        assert_eq!(denied.status, StatusCode::FORBIDDEN);
        assert_eq!(deleted.status, StatusCode::NO_CONTENT);
        assert_eq!(gone.status, StatusCode::NOT_FOUND);
    }

    #[rstest]
    #[tokio::test]
    async fn anyone_can_read_a_recipe(seeded: Fixture) {
        let uri = format!("/api/recipes/{}/", seeded.soup.id);

        let response = seeded.send(Method::GET, &uri, None, None).await;

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.json()["name"], "Soup");
    }

    #[rstest]
    #[tokio::test]
    async fn list_is_paginated(seeded: Fixture) {
        let response = seeded.send(Method::GET, "/api/recipes/?limit=1", None, None).await;

        assert_eq!(response.status, StatusCode::OK);
        let page = response.json();
        assert_eq!(page["count"], 2);
        assert_eq!(page["results"].as_array().unwrap().len(), 1);
        assert_eq!(page["next"], "/api/recipes/?limit=1&page=2");
        assert_eq!(page["previous"], Value::Null);
    }

    #[rstest]
    #[tokio::test]
    async fn cart_add_twice_is_a_bad_request(seeded: Fixture) {
        let uri = format!("/api/recipes/{}/shopping_cart/", seeded.soup.id);

        let first = seeded.send(Method::POST, &uri, Some("other-token"), None).await;
        let second = seeded.send(Method::POST, &uri, Some("other-token"), None).await;

        assert_eq!(first.status, StatusCode::CREATED);
        assert_eq!(first.json()["name"], "Soup");
        assert_eq!(second.status, StatusCode::BAD_REQUEST);
        assert!(second.json()["detail"].as_str().unwrap().contains("already"));
    }

    #[rstest]
    #[tokio::test]
    async fn removing_absent_favorite_is_a_bad_request(seeded: Fixture) {
        let uri = format!("/api/recipes/{}/favorite/", seeded.soup.id);

        let response = seeded.send(Method::DELETE, &uri, Some("other-token"), None).await;

        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }

    #[rstest]
    #[tokio::test]
    async fn favorite_shows_up_in_representation_and_filter(seeded: Fixture) {
        let favorite = format!("/api/recipes/{}/favorite/", seeded.soup.id);

        let added = seeded.send(Method::POST, &favorite, Some("other-token"), None).await;
        let listed = seeded
            .send(Method::GET, "/api/recipes/?is_favorited=1", Some("other-token"), None)
            .await;
        let anonymous = seeded.send(Method::GET, "/api/recipes/?is_favorited=1", None, None).await;

        assert_eq!(added.status, StatusCode::CREATED);
        let page = listed.json();
        assert_eq!(page["count"], 1);
        assert_eq!(page["results"][0]["id"], seeded.soup.id);
        assert_eq!(page["results"][0]["is_favorited"], true);
        assert_eq!(anonymous.json()["count"], 0);
    }

    #[rstest]
    #[tokio::test]
    async fn favorite_of_missing_recipe_is_a_bad_request(seeded: Fixture) {
        let response = seeded
            .send(Method::POST, "/api/recipes/9999/favorite/", Some("other-token"), None)
            .await;

        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }

    #[rstest]
    #[tokio::test]
    async fn download_renders_the_aggregated_cart(seeded: Fixture) {
        for recipe in [seeded.soup.id, seeded.stew.id] {
            let uri = format!("/api/recipes/{recipe}/shopping_cart/");
            seeded.send(Method::POST, &uri, Some("other-token"), None).await;
        }

        let response = seeded
            .send(Method::GET, "/api/recipes/download_shopping_cart/", Some("other-token"), None)
            .await;

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.headers[header::CONTENT_TYPE], "text/plain; charset=utf-8");
        assert_eq!(
            response.headers[header::CONTENT_DISPOSITION],
            "attachment; filename=shopping_list.txt"
        );
        assert_eq!(response.text(), "Salt (grams) - 8.0\nSugar (grams) - 0.5\n");
    }

    #[rstest]
    #[tokio::test]
    async fn download_requires_authentication(seeded: Fixture) {
        let response = seeded
            .send(Method::GET, "/api/recipes/download_shopping_cart/", None, None)
            .await;

        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }
}
