//! Replaces the ingredient table with the rows of a `name,measurement_unit` CSV file.
//!
//! Usage: `import-data [path]`, the path defaulting to `FOODGRAM_SEED_INGREDIENTS`
//! (`data/ingredients.csv`). The first row is a header and is skipped.

// Modules shared with the server binary; this one only touches the ingredient side.
#[allow(dead_code)]
mod config;
#[allow(dead_code)]
mod database;
mod ingredient_file;
mod logging;
#[allow(dead_code)]
mod shopping_list;
#[allow(dead_code)]
mod store;

use std::{env, path::PathBuf, process::ExitCode};

use diesel::r2d2::PoolError;
use thiserror::Error;
use tracing::{error, info, trace_span};

use crate::{
    config::{Config, ConfigError},
    database::connection::establish_pooled_connection,
    ingredient_file::{read_ingredients, IngredientFileError},
    store::{DatabaseStore, RecipeStore, StoreError},
};

#[derive(Error, Debug)]
enum ImportError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    File(#[from] IngredientFileError),

    #[error("unable to create the connection pool: {0}")]
    Pool(#[from] PoolError),

    #[error("unable to write ingredients: {0}")]
    Store(#[from] StoreError),
}

fn main() -> ExitCode {
    logging::init();

    match import(env::args().nth(1).map(PathBuf::from)) {
        Ok(count) => {
            info!(count, "Ingredients imported");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn import(path: Option<PathBuf>) -> Result<usize, ImportError> {
    let config = Config::load()?;
    let path = path.unwrap_or_else(|| config.seed_ingredients.clone());

    let span = trace_span!("importing ingredients", path = %path.display());
    let _guard = span.enter();

    let ingredients = read_ingredients(&path)?;
    info!(rows = ingredients.len(), "Parsed ingredient file");

    let pool = establish_pooled_connection(config.database_url()?, 1)?;

    Ok(DatabaseStore::new(pool).replace_ingredients(&ingredients)?)
}
