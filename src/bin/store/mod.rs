//! Persistence collaborators behind [`RecipeStore`].

mod database_store;
mod memory_store;
mod recipe_store;

pub use database_store::DatabaseStore;
pub use memory_store::MemoryStore;
pub use recipe_store::{Page, RecipeDraft, RecipeFilter, RecipeStore, StoreError};
