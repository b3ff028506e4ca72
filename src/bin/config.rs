use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
}

/// Which [`RecipeStore`](crate::store::RecipeStore) implementation backs the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Database,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "database" | "postgres" => Ok(Self::Database),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown store backend `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub pool_size: u32,
    pub store: StoreBackend,
    pub page_size: u32,
    /// Ingredient CSV for `import-data` and the memory backend.
    pub seed_ingredients: PathBuf,
    /// Memory backend only: the user owning `demo_token`, created at startup.
    pub demo_user: String,
    pub demo_token: Option<String>,
}

impl Config {
    pub const DATABASE_URL: &'static str = "DATABASE_URL";

    pub fn load() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            info!("No .env file loaded: {e}");
        }

        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let config = Self {
            port: try_load(&lookup, "FOODGRAM_PORT", 8000),
            database_url: lookup(Self::DATABASE_URL).filter(|url| !url.trim().is_empty()),
            pool_size: try_load(&lookup, "FOODGRAM_POOL_SIZE", 4),
            store: try_load(&lookup, "FOODGRAM_STORE", StoreBackend::Database),
            page_size: try_load(&lookup, "FOODGRAM_PAGE_SIZE", 6).max(1),
            seed_ingredients: PathBuf::from(try_load(
                &lookup,
                "FOODGRAM_SEED_INGREDIENTS",
                String::from("data/ingredients.csv"),
            )),
            demo_user: try_load(&lookup, "FOODGRAM_DEMO_USER", String::from("demo")),
            demo_token: lookup("FOODGRAM_DEMO_TOKEN").filter(|token| !token.trim().is_empty()),
        };

        if config.store == StoreBackend::Database {
            config.database_url()?;
        }

        Ok(config)
    }

    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing(Self::DATABASE_URL))
    }
}

fn try_load<T: FromStr + Display>(lookup: impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T::Err: Display,
{
    let Some(value) = lookup(key) else {
        info!("{key} not set, using default: {default}");
        return default;
    };

    value.trim().parse().unwrap_or_else(|e| {
        warn!("Invalid {key} value `{value}`: {e}, using default: {default}");
        default
    })
}

impl Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreBackend::Database => f.write_str("database"),
            StoreBackend::Memory => f.write_str("memory"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rstest::rstest;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[rstest]
    fn defaults_apply_when_only_database_url_is_set() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/foodgram")])).unwrap();

        assert_eq!(config.port, 8000);
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.page_size, 6);
        assert_eq!(config.store, StoreBackend::Database);
        assert_eq!(config.database_url(), Ok("postgres://localhost/foodgram"));
        assert_eq!(config.seed_ingredients, PathBuf::from("data/ingredients.csv"));
        assert_eq!(config.demo_user, "demo");
        assert_eq!(config.demo_token, None);
    }

    #[rstest]
    fn memory_seed_settings_are_read() {
        let config = Config::from_lookup(lookup(&[
            ("FOODGRAM_STORE", "memory"),
            ("FOODGRAM_SEED_INGREDIENTS", "/srv/foodgram/ingredients.csv"),
            ("FOODGRAM_DEMO_USER", "tester"),
            ("FOODGRAM_DEMO_TOKEN", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.seed_ingredients, PathBuf::from("/srv/foodgram/ingredients.csv"));
        assert_eq!(config.demo_user, "tester");
        assert_eq!(config.demo_token.as_deref(), Some("secret"));
    }

    #[rstest]
    fn blank_demo_token_is_unset() {
        let config = Config::from_lookup(lookup(&[("FOODGRAM_STORE", "memory"), ("FOODGRAM_DEMO_TOKEN", "  ")])).unwrap();

        assert_eq!(config.demo_token, None);
    }

    #[rstest]
    fn database_backend_requires_url() {
        let error = Config::from_lookup(lookup(&[])).unwrap_err();

        assert_eq!(error, ConfigError::Missing("DATABASE_URL"));
    }

    #[rstest]
    fn memory_backend_runs_without_url() {
        let config = Config::from_lookup(lookup(&[("FOODGRAM_STORE", "memory")])).unwrap();

        assert_eq!(config.store, StoreBackend::Memory);
        assert!(config.database_url().is_err());
    }

    #[rstest]
    #[case("FOODGRAM_PORT", "not-a-port")]
    #[case("FOODGRAM_PORT", "70000")]
    #[case("FOODGRAM_POOL_SIZE", "-1")]
    fn invalid_values_fall_back_to_defaults(#[case] key: &str, #[case] value: &str) {
        let config = Config::from_lookup(lookup(&[("FOODGRAM_STORE", "memory"), (key, value)])).unwrap();

        assert_eq!(config.port, 8000);
        assert_eq!(config.pool_size, 4);
    }

    #[rstest]
    fn page_size_is_never_zero() {
        let config = Config::from_lookup(lookup(&[("FOODGRAM_STORE", "memory"), ("FOODGRAM_PAGE_SIZE", "0")])).unwrap();

        assert_eq!(config.page_size, 1);
    }
}
