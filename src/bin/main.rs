#![warn(clippy::all)]

mod access_control;
mod api;
mod config;
mod database;
mod ingredient_file;
mod logging;
mod shopping_list;
mod store;

use std::{io, process::ExitCode, sync::Arc};

use diesel::r2d2::PoolError;
use thiserror::Error;
use tokio::runtime::Runtime;
use tracing::{error, info, trace_span, warn};

use crate::{
    api::AppState,
    config::{Config, ConfigError, StoreBackend},
    database::connection::establish_pooled_connection,
    ingredient_file::{read_ingredients, IngredientFileError},
    store::{DatabaseStore, MemoryStore, RecipeStore, StoreError},
};

#[derive(Error, Debug)]
enum StartError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("unable to create the connection pool: {0}")]
    Pool(#[from] PoolError),

    #[error("unable to seed the memory store: {0}")]
    Seed(#[from] IngredientFileError),

    #[error("unable to seed the memory store: {0}")]
    Store(#[from] StoreError),

    #[error("server failed: {0}")]
    Io(#[from] io::Error),
}

fn main() -> ExitCode {
    logging::init();

    match start() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn start() -> Result<(), StartError> {
    let span = trace_span!("starting main");
    let _guard = span.enter();

    let config = Config::load()?;
    let store = build_store(&config)?;

    let rt = Runtime::new()?;
    rt.block_on(api::serve(AppState::new(store, config.page_size), config.port))?;

    Ok(())
}

fn build_store(config: &Config) -> Result<Arc<dyn RecipeStore>, StartError> {
    info!(backend = %config.store, "Building store");

    Ok(match config.store {
        StoreBackend::Database => {
            let pool = establish_pooled_connection(config.database_url()?, config.pool_size)?;
            Arc::new(DatabaseStore::new(pool))
        }
        StoreBackend::Memory => Arc::new(seed_memory_store(config)?),
    })
}

/// A missing ingredient file leaves the store without ingredients; a malformed one aborts startup.
fn seed_memory_store(config: &Config) -> Result<MemoryStore, StartError> {
    let ingredients = match read_ingredients(&config.seed_ingredients) {
        Ok(ingredients) => ingredients,
        Err(IngredientFileError::Open { path, source }) => {
            warn!("Memory store starts without ingredients, unable to open {}: {source}", path.display());
            Vec::new()
        }
        Err(e) => return Err(e.into()),
    };

    let demo = config
        .demo_token
        .as_deref()
        .map(|token| (config.demo_user.as_str(), token));
    match demo {
        Some((username, _)) => info!(username, "Demo user gets FOODGRAM_DEMO_TOKEN"),
        None => warn!("FOODGRAM_DEMO_TOKEN not set, the memory store only serves anonymous reads"),
    }

    let store = MemoryStore::with_demo_data(&ingredients, demo)?;
    info!(ingredients = ingredients.len(), "Memory store seeded");

    Ok(store)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use rstest::rstest;

    use super::*;

    fn memory_config(seed: &str, token: Option<&str>) -> Config {
        Config::from_lookup(|key| match key {
            "FOODGRAM_STORE" => Some("memory".to_owned()),
            "FOODGRAM_SEED_INGREDIENTS" => Some(seed.to_owned()),
            "FOODGRAM_DEMO_TOKEN" => token.map(str::to_owned),
            _ => None,
        })
        .unwrap()
    }

    #[rstest]
    fn memory_store_is_seeded_from_the_bundled_file() {
        let seed = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data/ingredients.csv");
        let config = memory_config(&seed.to_string_lossy(), Some("demo-token"));

        let store = seed_memory_store(&config).unwrap();

        assert!(!store.ingredients(None).unwrap().is_empty());
        assert_eq!(store.user_by_token("demo-token").unwrap().unwrap().username, "demo");
    }

    #[rstest]
    fn missing_seed_file_starts_without_ingredients() {
        let config = memory_config("no/such/ingredients.csv", None);

        let store = seed_memory_store(&config).unwrap();

        assert!(store.ingredients(None).unwrap().is_empty());
        assert_eq!(store.tags().unwrap().len(), 3);
    }
}
