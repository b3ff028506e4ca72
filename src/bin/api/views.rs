//! JSON shapes returned by the API, assembled from store rows.

use serde::Serialize;

use crate::{
    database::models::{recipe::Recipe, tag::Tag, user::User},
    store::{RecipeStore, StoreError},
};

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UserView {
    pub email: String,
    pub id: i32,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
}

impl UserView {
    pub fn build(store: &dyn RecipeStore, viewer: Option<i32>, user: User) -> Result<Self, StoreError> {
        let is_subscribed = match viewer {
            Some(viewer) => store.is_following(viewer, user.id)?,
            None => false,
        };

        Ok(Self {
            email: user.email,
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            is_subscribed,
        })
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct IngredientAmountView {
    pub id: i32,
    pub name: String,
    pub measurement_unit: String,
    pub amount: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RecipeView {
    pub id: i32,
    pub tags: Vec<Tag>,
    pub author: UserView,
    pub ingredients: Vec<IngredientAmountView>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i16,
}

impl RecipeView {
    pub fn build(store: &dyn RecipeStore, viewer: Option<i32>, recipe: Recipe) -> Result<Self, StoreError> {
        let author = store.user(recipe.author_id)?.ok_or(StoreError::NotFound)?;

        let ingredients = store
            .recipe_ingredients(recipe.id)?
            .into_iter()
            .map(|line| IngredientAmountView {
                id: line.ingredient.id,
                name: line.ingredient.name,
                measurement_unit: line.ingredient.measurement_unit,
                amount: line.amount,
            })
            .collect();

        let (is_favorited, is_in_shopping_cart) = match viewer {
            Some(viewer) => (
                store.is_favorited(viewer, recipe.id)?,
                store.is_in_cart(viewer, recipe.id)?,
            ),
            None => (false, false),
        };

        Ok(Self {
            id: recipe.id,
            tags: store.recipe_tags(recipe.id)?,
            author: UserView::build(store, viewer, author)?,
            ingredients,
            is_favorited,
            is_in_shopping_cart,
            name: recipe.name,
            image: recipe.image,
            text: recipe.text,
            cooking_time: recipe.cooking_time,
        })
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ShortRecipeView {
    pub id: i32,
    pub name: String,
    pub image: String,
    pub cooking_time: i16,
}

impl From<Recipe> for ShortRecipeView {
    fn from(recipe: Recipe) -> Self {
        Self {
            id: recipe.id,
            name: recipe.name,
            image: recipe.image,
            cooking_time: recipe.cooking_time,
        }
    }
}

/// A followed author with a preview of their recipes.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SubscriptionView {
    #[serde(flatten)]
    pub author: UserView,
    pub recipes: Vec<ShortRecipeView>,
    pub recipes_count: i64,
}

impl SubscriptionView {
    pub fn build(
        store: &dyn RecipeStore,
        viewer: i32,
        author: User,
        recipes_limit: Option<i64>,
    ) -> Result<Self, StoreError> {
        let (recipes, recipes_count) = store.recipes_by_author(author.id, recipes_limit)?;

        Ok(Self {
            author: UserView::build(store, Some(viewer), author)?,
            recipes: recipes.into_iter().map(ShortRecipeView::from).collect(),
            recipes_count,
        })
    }
}
