use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

use crate::{
    database::models::{
        ingredient::{Ingredient, NewIngredient},
        recipe::Recipe,
        tag::Tag,
        user::User,
    },
    shopping_list::CartLine,
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("entry already exists")]
    DuplicateEntry,

    #[error("not found")]
    NotFound,

    #[error("referenced row does not exist")]
    InvalidReference,

    #[error("users cannot follow themselves")]
    SelfFollow,

    #[error("query failed: {0}")]
    Query(#[source] DieselError),

    #[error("connection pool failed: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
}

/// Name of the `follows` check rejecting `user_id = author_id`, see the migration.
pub const SELF_FOLLOW_CONSTRAINT: &str = "follows_no_self_follow";

impl From<DieselError> for StoreError {
    fn from(error: DieselError) -> Self {
        match error {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => StoreError::DuplicateEntry,
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => StoreError::InvalidReference,
            DieselError::DatabaseError(DatabaseErrorKind::CheckViolation, info)
                if info.constraint_name() == Some(SELF_FOLLOW_CONSTRAINT) =>
            {
                StoreError::SelfFollow
            }
            DieselError::NotFound => StoreError::NotFound,
            other => StoreError::Query(other),
        }
    }
}

/// 1-based page of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Page {
    pub fn new(number: u32, size: u32) -> Self {
        Self {
            number: number.max(1),
            size: size.max(1),
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.number - 1) * i64::from(self.size)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeFilter {
    pub author: Option<i32>,
    /// Tag slugs; a recipe matches when it carries any of them.
    pub tags: Vec<String>,
    pub favorited_by: Option<i32>,
    pub in_cart_of: Option<i32>,
}

/// A validated recipe payload, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeDraft {
    pub name: String,
    pub text: String,
    pub image: Option<String>,
    pub cooking_time: i16,
    pub tags: Vec<i32>,
    pub ingredients: Vec<(i32, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecipeIngredient {
    pub ingredient: Ingredient,
    pub amount: f64,
}

/// Synchronous access to the recipe data.
///
/// Uniqueness of cart entries, favorites and follows is enforced here: a
/// second insert of the same pair fails with [`StoreError::DuplicateEntry`],
/// also when two inserts race.
pub trait RecipeStore: Send + Sync {
    fn user_by_token(&self, key: &str) -> Result<Option<User>, StoreError>;
    fn user(&self, id: i32) -> Result<Option<User>, StoreError>;

    fn tags(&self) -> Result<Vec<Tag>, StoreError>;
    fn tag(&self, id: i32) -> Result<Option<Tag>, StoreError>;

    fn ingredients(&self, name_prefix: Option<&str>) -> Result<Vec<Ingredient>, StoreError>;
    fn ingredient(&self, id: i32) -> Result<Option<Ingredient>, StoreError>;
    /// Drops every ingredient (and the recipe lines using them) and inserts the new set.
    fn replace_ingredients(&self, ingredients: &[NewIngredient]) -> Result<usize, StoreError>;

    /// Newest first, with the total number of matches.
    fn recipes(&self, filter: &RecipeFilter, page: Page) -> Result<(Vec<Recipe>, i64), StoreError>;
    fn recipe(&self, id: i32) -> Result<Option<Recipe>, StoreError>;
    fn recipe_tags(&self, recipe_id: i32) -> Result<Vec<Tag>, StoreError>;
    fn recipe_ingredients(&self, recipe_id: i32) -> Result<Vec<RecipeIngredient>, StoreError>;
    fn recipes_by_author(&self, author_id: i32, limit: Option<i64>) -> Result<(Vec<Recipe>, i64), StoreError>;
    fn create_recipe(&self, author_id: i32, draft: &RecipeDraft) -> Result<Recipe, StoreError>;
    fn update_recipe(&self, id: i32, draft: &RecipeDraft) -> Result<Recipe, StoreError>;
    fn delete_recipe(&self, id: i32) -> Result<(), StoreError>;

    fn add_favorite(&self, user_id: i32, recipe_id: i32) -> Result<(), StoreError>;
    fn remove_favorite(&self, user_id: i32, recipe_id: i32) -> Result<bool, StoreError>;
    fn is_favorited(&self, user_id: i32, recipe_id: i32) -> Result<bool, StoreError>;

    fn add_to_cart(&self, user_id: i32, recipe_id: i32) -> Result<(), StoreError>;
    fn remove_from_cart(&self, user_id: i32, recipe_id: i32) -> Result<bool, StoreError>;
    fn is_in_cart(&self, user_id: i32, recipe_id: i32) -> Result<bool, StoreError>;
    fn cart_lines(&self, user_id: i32) -> Result<Vec<CartLine>, StoreError>;

    fn follow(&self, user_id: i32, author_id: i32) -> Result<(), StoreError>;
    fn unfollow(&self, user_id: i32, author_id: i32) -> Result<bool, StoreError>;
    fn is_following(&self, user_id: i32, author_id: i32) -> Result<bool, StoreError>;
    fn followed_authors(&self, user_id: i32, page: Page) -> Result<(Vec<User>, i64), StoreError>;
}
