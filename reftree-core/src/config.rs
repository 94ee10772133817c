//! Store configuration
//!
//! Stored as `store-config.json` in the store directory. A missing file, or
//! a missing field, means the default.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// File name of the configuration inside a store directory
pub const CONFIG_FILE: &str = "store-config.json";

/// Tunables of a versioned store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// zstd level for persisted records; `None` stores them raw.
    pub compression_level: Option<i32>,
    /// Whether to fsync log entries, snapshots and journals.
    pub sync_writes: bool,
    /// Whether to verify record checksums on read.
    pub verify_checksums: bool,
    /// Number of reconstructed past versions kept in memory (0 disables).
    pub version_cache_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            compression_level: Some(3),
            sync_writes: true,
            verify_checksums: true,
            version_cache_capacity: 16,
        }
    }
}

impl StoreConfig {
    /// Load the config of a store directory.
    pub fn load(store_dir: &Path) -> Result<Self> {
        let config_path = store_dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&config_path)?;
        let config: StoreConfig = serde_json::from_str(&data)?;
        Ok(config)
    }

    /// Save the config into a store directory.
    pub fn save(&self, store_dir: &Path) -> Result<()> {
        fs::create_dir_all(store_dir)?;
        let config_path = store_dir.join(CONFIG_FILE);
        let tmp_path = config_path.with_extension("tmp");
        let data = serde_json::to_string_pretty(self)?;
        fs::write(&tmp_path, &data)?;
        fs::rename(&tmp_path, &config_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::TempDir;

    #[test]
    fn test_store_config_load_nonexistent() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(StoreConfig::load(tmp.path()).unwrap(), StoreConfig::default());
    }

    #[test]
    fn test_store_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let config = StoreConfig {
            compression_level: None,
            sync_writes: false,
            verify_checksums: false,
            version_cache_capacity: 2,
        };
        config.save(tmp.path()).unwrap();
        assert_eq!(StoreConfig::load(tmp.path()).unwrap(), config);
        assert!(!tmp.path().join("store-config.tmp").exists());
    }

    #[test]
    fn test_store_config_partial_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILE), r#"{ "sync_writes": false }"#).unwrap();
        let config = StoreConfig::load(tmp.path()).unwrap();
        assert!(!config.sync_writes);
        assert_eq!(config.compression_level, Some(3));
        assert_eq!(config.version_cache_capacity, 16);
    }

    #[test]
    fn test_store_config_invalid_json() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILE), "not json").unwrap();
        assert!(matches!(StoreConfig::load(tmp.path()), Err(Error::Serialization(_))));
    }
}
