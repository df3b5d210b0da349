//! Layered configuration: an optional `pollbook.{toml,json,yaml}` file, then
//! `POLLBOOK_*` environment variables.

use std::path::PathBuf;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;

pub const DEFAULT_DATABASE: &str = "pollbook.db";
pub const DEFAULT_LOG_FILTER: &str = "pollbook=info";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// Path of the SQLite file, or `:memory:`.
    #[serde(default = "default_database")]
    pub database: String,
    /// JSON catalog to install instead of the built-in seed.
    #[serde(default)]
    pub catalog: Option<PathBuf>,
    /// Used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_database() -> String {
    DEFAULT_DATABASE.to_string()
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: default_database(),
            catalog: None,
            log_filter: default_log_filter(),
        }
    }
}

impl Settings {
    /// Reads `file` (extension optional) if present, with the environment on top.
    pub fn load(file: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(file).required(false))
            .add_source(Environment::with_prefix("POLLBOOK"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
    pub fn in_memory(&self) -> bool {
        self.database == ":memory:"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let settings = Settings::load("no/such/pollbook-settings").unwrap();
        assert_eq!(settings.catalog, None);
        assert_eq!(settings.log_filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn file_values_are_read() {
        let dir = std::env::temp_dir().join(format!("pollbook-settings-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pollbook.toml");
        std::fs::write(&path, "database = \":memory:\"\ncatalog = \"surveys.json\"\n").unwrap();
        let settings = Settings::load(path.to_str().unwrap()).unwrap();
        assert!(settings.in_memory());
        assert_eq!(settings.catalog, Some(PathBuf::from("surveys.json")));
        assert_eq!(settings.log_filter, DEFAULT_LOG_FILTER);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
