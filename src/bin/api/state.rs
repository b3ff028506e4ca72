use std::sync::Arc;

use tokio::task;

use crate::store::RecipeStore;

use super::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecipeStore>,
    pub page_size: u32,
}

impl AppState {
    pub fn new(store: Arc<dyn RecipeStore>, page_size: u32) -> Self {
        Self { store, page_size }
    }

    /// Runs synchronous store work on the blocking thread pool.
    pub async fn run<T, F>(&self, work: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn RecipeStore) -> Result<T, AppError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);

        task::spawn_blocking(move || work(store.as_ref())).await?
    }
}
