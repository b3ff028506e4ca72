use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::database::models::ingredient::Ingredient;

use super::{error::AppError, state::AppState};

#[derive(Deserialize, Debug, Default)]
pub struct IngredientQuery {
    /// Case-insensitive name prefix.
    pub name: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<IngredientQuery>,
) -> Result<Json<Vec<Ingredient>>, AppError> {
    let prefix = query.name.filter(|name| !name.is_empty());

    let ingredients = state
        .run(move |store| Ok(store.ingredients(prefix.as_deref())?))
        .await?;

    Ok(Json(ingredients))
}

pub async fn retrieve(State(state): State<AppState>, Path(id): Path<i32>) -> Result<Json<Ingredient>, AppError> {
    let ingredient = state
        .run(move |store| store.ingredient(id)?.ok_or(AppError::NotFound))
        .await?;

    Ok(Json(ingredient))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use rstest::rstest;

    use crate::api::testing::{seeded, Fixture};

    #[rstest]
    #[tokio::test]
    async fn prefix_filter_ignores_case(seeded: Fixture) {
        let response = seeded.send(Method::GET, "/api/ingredients/?name=SA", None, None).await;

        assert_eq!(response.status, StatusCode::OK);
        let ingredients = response.json();
        assert_eq!(ingredients.as_array().unwrap().len(), 1);
        assert_eq!(ingredients[0]["name"], "Salt");
        assert_eq!(ingredients[0]["measurement_unit"], "grams");
    }

    #[rstest]
    #[tokio::test]
    async fn without_filter_every_ingredient_is_listed(seeded: Fixture) {
        let response = seeded.send(Method::GET, "/api/ingredients/", None, None).await;

        assert_eq!(response.json().as_array().unwrap().len(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn missing_ingredient_is_not_found(seeded: Fixture) {
        let response = seeded.send(Method::GET, "/api/ingredients/9999/", None, None).await;

        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }
}
