//! Purpose: Resolve the data directory, database path, and store options.
//! Exports: `Config`, `default_data_dir`, and the environment variable names.
//! Role: Keep CLI and library callers on one set of path rules.
//! Invariants: Default data directory remains `~/.pokedexer`.
//! Invariants: The database file is always `<data_dir>/pokedexer.db`.
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::store::StoreOptions;

/// Overrides the default data directory.
pub const DIR_ENV: &str = "POKEDEXER_DIR";
/// `tracing_subscriber::EnvFilter` directives for the binary.
pub const LOG_ENV: &str = "POKEDEXER_LOG";
pub const DEFAULT_LOG_FILTER: &str = "warn";
pub const DB_FILE_NAME: &str = "pokedexer.db";

#[derive(Clone, Debug)]
pub struct Config {
    pub data_dir: PathBuf,
    pub store_options: StoreOptions,
    /// Seed the bundled catalog into an empty database on open.
    pub seed_catalog: bool,
}

impl Config {
    /// Resolve from an explicit directory, falling back to the environment.
    pub fn resolve(dir: Option<PathBuf>) -> Self {
        Self::with_data_dir(dir.unwrap_or_else(default_data_dir))
    }

    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            store_options: StoreOptions::default(),
            seed_catalog: true,
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.store_options = self.store_options.with_grace_period(grace_period);
        self
    }

    pub fn with_seed_catalog(mut self, seed_catalog: bool) -> Self {
        self.seed_catalog = seed_catalog;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }
}

pub fn default_data_dir() -> PathBuf {
    data_dir_from(std::env::var_os(DIR_ENV), std::env::var_os("HOME"))
}

fn data_dir_from(dir_env: Option<OsString>, home: Option<OsString>) -> PathBuf {
    match dir_env.filter(|dir| !dir.is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => PathBuf::from(home.unwrap_or_default()).join(".pokedexer"),
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, DEFAULT_LOG_FILTER, data_dir_from};
    use std::ffi::OsString;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn env_dir_wins_over_home() {
        let dir = data_dir_from(
            Some(OsString::from("/srv/pokedexer")),
            Some(OsString::from("/home/ash")),
        );
        assert_eq!(dir, PathBuf::from("/srv/pokedexer"));
    }

    #[test]
    fn blank_env_dir_falls_back_to_home() {
        let dir = data_dir_from(Some(OsString::new()), Some(OsString::from("/home/ash")));
        assert_eq!(dir, PathBuf::from("/home/ash/.pokedexer"));
    }

    #[test]
    fn db_lives_inside_the_data_dir() {
        let config = Config::resolve(Some(PathBuf::from("/tmp/party")))
            .with_grace_period(Duration::from_millis(10))
            .with_seed_catalog(false);
        assert_eq!(config.db_path(), PathBuf::from("/tmp/party/pokedexer.db"));
        assert_eq!(config.store_options.grace_period, Duration::from_millis(10));
        assert!(!config.seed_catalog);
        assert_eq!(DEFAULT_LOG_FILTER, "warn");
    }
}
