//! TOML configuration for caches, write buffering, and query limits.
//!
//! ```toml
//! [cache]
//! db_cache = true
//! db_cache_size = 67108864
//! db_cache_time_ms = 10000
//! db_cache_clean_wait_ms = 50
//!
//! [storage]
//! buffer_size = 1024
//! write_attempts = 5
//!
//! [query]
//! hard_max_limit = 100000
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::query::QueryLimits;
use crate::storage::{CacheOptions, TransactionOptions, DEFAULT_CACHE_SIZE};
use crate::types::{PenumbraError, Result};

/// Parsed configuration file. Every section and key is optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PenumbraConfig {
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub query: QuerySection,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSection {
    pub db_cache: bool,
    pub db_cache_size: usize,
    pub db_cache_time_ms: u64,
    pub db_cache_clean_wait_ms: u64,
    pub shards: usize,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            db_cache: false,
            db_cache_size: DEFAULT_CACHE_SIZE,
            db_cache_time_ms: 10_000,
            db_cache_clean_wait_ms: 50,
            shards: 8,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    pub buffer_size: usize,
    pub write_attempts: usize,
    pub write_wait_ms: u64,
    pub continuous_persistence: bool,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            write_attempts: 5,
            write_wait_ms: 100,
            continuous_persistence: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuerySection {
    pub hard_max_limit: usize,
    pub vertex_hard_max_limit: usize,
}

impl Default for QuerySection {
    fn default() -> Self {
        let limits = QueryLimits::default();
        Self {
            hard_max_limit: limits.hard_max_limit,
            vertex_hard_max_limit: limits.vertex_hard_max_limit,
        }
    }
}

impl PenumbraConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: PenumbraConfig = toml::from_str(contents)
            .map_err(|err| PenumbraError::Config(format!("failed to parse config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a config file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents).map_err(|err| match err {
            PenumbraError::Config(msg) => {
                PenumbraError::Config(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|err| PenumbraError::Config(format!("failed to serialize config: {err}")))
    }

    pub fn validate(&self) -> Result<()> {
        let checks: [(bool, &str); 6] = [
            (self.cache.db_cache_size > 0, "cache.db_cache_size must be positive"),
            (self.cache.shards > 0, "cache.shards must be positive"),
            (self.storage.buffer_size > 0, "storage.buffer_size must be positive"),
            (self.storage.write_attempts > 0, "storage.write_attempts must be positive"),
            (self.query.hard_max_limit > 0, "query.hard_max_limit must be positive"),
            (
                self.query.vertex_hard_max_limit > 0,
                "query.vertex_hard_max_limit must be positive",
            ),
        ];
        match checks.iter().find(|(ok, _)| !ok) {
            Some((_, msg)) => Err(PenumbraError::Config((*msg).to_string())),
            None => Ok(()),
        }
    }

    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions::new()
            .enabled(self.cache.db_cache)
            .max_bytes(self.cache.db_cache_size)
            .cache_time(Duration::from_millis(self.cache.db_cache_time_ms))
            .clean_wait(Duration::from_millis(self.cache.db_cache_clean_wait_ms))
            .shards(self.cache.shards)
    }

    pub fn transaction_options(&self) -> TransactionOptions {
        TransactionOptions::new()
            .buffer_size(self.storage.buffer_size)
            .write_attempts(self.storage.write_attempts)
            .write_wait(Duration::from_millis(self.storage.write_wait_ms))
            .continuous_persistence(self.storage.continuous_persistence)
    }

    pub fn query_limits(&self) -> QueryLimits {
        QueryLimits {
            hard_max_limit: self.query.hard_max_limit,
            vertex_hard_max_limit: self.query.vertex_hard_max_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = PenumbraConfig::from_toml_str("").unwrap();
        assert_eq!(config, PenumbraConfig::default());
        assert!(!config.cache_options().enabled);
        assert_eq!(config.transaction_options().buffer_size, 1024);
        assert_eq!(config.query_limits().hard_max_limit, 100_000);
    }

    #[test]
    fn sections_override_defaults() {
        let config = PenumbraConfig::from_toml_str(
            r#"
            [cache]
            db_cache = true
            db_cache_time_ms = 0

            [storage]
            continuous_persistence = true
            "#,
        )
        .unwrap();
        let cache = config.cache_options();
        assert!(cache.enabled);
        assert!(cache.cache_time.is_zero());
        assert_eq!(cache.clean_wait, Duration::from_millis(50));
        assert!(config.transaction_options().continuous_persistence);
    }

    #[test]
    fn zero_buffer_size_is_rejected() {
        let err = PenumbraConfig::from_toml_str("[storage]\nbuffer_size = 0\n").unwrap_err();
        assert!(matches!(err, PenumbraError::Config(ref msg) if msg.contains("buffer_size")));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(PenumbraConfig::from_toml_str("[cache]\nsize = 3\n").is_err());
    }

    #[test]
    fn serialized_config_parses_back() {
        let mut config = PenumbraConfig::default();
        config.cache.db_cache = true;
        config.query.hard_max_limit = 42;
        let text = config.to_toml_string().unwrap();
        assert_eq!(PenumbraConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn load_reads_file_and_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert_eq!(PenumbraConfig::load(&missing).unwrap(), PenumbraConfig::default());

        let path = dir.path().join("penumbra.toml");
        fs::write(&path, "[query]\nvertex_hard_max_limit = 0\n").unwrap();
        let err = PenumbraConfig::load(&path).unwrap_err();
        assert!(matches!(err, PenumbraError::Config(ref msg) if msg.contains("penumbra.toml")));

        fs::write(&path, "[cache]\ndb_cache = true\n").unwrap();
        assert!(PenumbraConfig::load(&path).unwrap().cache.db_cache);
    }
}
