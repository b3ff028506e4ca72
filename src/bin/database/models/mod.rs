pub mod favorite;
pub mod follow;
pub mod ingredient;
pub mod ingredient_recipe;
pub mod recipe;
pub mod recipe_tag;
pub mod shopping_cart;
pub mod tag;
pub mod user;
