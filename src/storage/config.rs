//! Store configuration
//!
//! [`StoreConfig`] is what [`Store::open`](super::Store::open) takes. The
//! file-backed part of it ([`ConfigFile`]) can be loaded from a TOML file,
//! either given explicitly or from `~/.config/jsondir/config.toml`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::logger::Logger;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Whether reads coordinate with writers on the same collection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReadLocking {
    /// Reads take no lock. A single record is still never torn (writes are
    /// atomic renames), but `read_all` may see a collection mid-update and a
    /// read racing a delete may report not found.
    None,
    /// Reads hold the collection lock in shared mode
    #[default]
    Shared,
}

impl ReadLocking {
    pub fn as_str(&self) -> &str {
        match self {
            ReadLocking::None => "none",
            ReadLocking::Shared => "shared",
        }
    }
}

/// Settings that can live in a config file
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ConfigFile {
    /// Read coordination strategy
    pub read_locking: ReadLocking,

    /// Also take advisory file locks so several processes can share a root
    pub process_lock: bool,
}

impl ConfigFile {
    /// Returns the global config directory
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "jsondir", "jsondir").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Loads configuration from an explicit path, which must exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_path_buf()).into());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;

        Self::parse(&content).with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Loads the global configuration, falling back to defaults when absent
    pub fn load_global() -> Result<Self> {
        let config_path = match Self::global_config_dir() {
            Some(dir) => dir.join("config.toml"),
            None => return Ok(Self::default()),
        };

        if !config_path.exists() {
            return Ok(Self::default());
        }

        Self::load(&config_path)
    }

    /// Parses TOML configuration text
    pub fn parse(content: &str) -> std::result::Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

/// Options passed to [`Store::open`](super::Store::open)
#[derive(Clone, Default)]
pub struct StoreConfig {
    /// Receives store log messages; `None` keeps the store silent
    pub logger: Option<Arc<dyn Logger>>,

    /// Read coordination strategy
    pub read_locking: ReadLocking,

    /// Take advisory file locks in addition to in-process locks
    pub process_lock: bool,
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_logger(mut self, logger: impl Logger + 'static) -> Self {
        self.logger = Some(Arc::new(logger));
        self
    }

    pub fn with_read_locking(mut self, read_locking: ReadLocking) -> Self {
        self.read_locking = read_locking;
        self
    }

    pub fn with_process_lock(mut self, process_lock: bool) -> Self {
        self.process_lock = process_lock;
        self
    }
}

impl From<ConfigFile> for StoreConfig {
    fn from(file: ConfigFile) -> Self {
        Self {
            logger: None,
            read_locking: file.read_locking,
            process_lock: file.process_lock,
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("logger", &self.logger.is_some())
            .field("read_locking", &self.read_locking)
            .field("process_lock", &self.process_lock)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::TracingLogger;
    use tempfile::TempDir;

    #[test]
    fn default_config() {
        let config = StoreConfig::default();

        assert!(config.logger.is_none());
        assert_eq!(config.read_locking, ReadLocking::Shared);
        assert!(!config.process_lock);
    }

    #[test]
    fn builder_sets_fields() {
        let config = StoreConfig::new()
            .with_logger(TracingLogger)
            .with_read_locking(ReadLocking::None)
            .with_process_lock(true);

        assert!(config.logger.is_some());
        assert_eq!(config.read_locking, ReadLocking::None);
        assert!(config.process_lock);
        assert!(format!("{:?}", config).contains("logger: true"));
    }

    #[test]
    fn parse_config_file() {
        let toml = r#"
read_locking = "none"
process_lock = true
"#;

        let config = ConfigFile::parse(toml).unwrap();
        assert_eq!(config.read_locking, ReadLocking::None);
        assert!(config.process_lock);
    }

    #[test]
    fn parse_empty_uses_defaults() {
        let config = ConfigFile::parse("").unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn parse_rejects_unknown_locking() {
        let result = ConfigFile::parse(r#"read_locking = "sometimes""#);
        match result {
            Err(ConfigError::Parse(message)) => assert!(message.contains("sometimes")),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn load_keeps_parse_error_in_chain() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "process_lock = \"yes\"\n").unwrap();

        let err = ConfigFile::load(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "process_lock = true\n").unwrap();

        let config = ConfigFile::load(&path).unwrap();
        assert!(config.process_lock);
        assert_eq!(config.read_locking, ReadLocking::Shared);
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.toml");
        let err = ConfigFile::load(&missing).unwrap_err();

        match err.downcast_ref::<ConfigError>() {
            Some(ConfigError::NotFound(path)) => assert_eq!(path, &missing),
            other => panic!("expected not found, got {:?}", other),
        }
    }

    #[test]
    fn config_file_converts_to_store_config() {
        let file = ConfigFile {
            read_locking: ReadLocking::None,
            process_lock: true,
        };

        let config = StoreConfig::from(file);
        assert!(config.logger.is_none());
        assert_eq!(config.read_locking, ReadLocking::None);
        assert!(config.process_lock);
    }

    #[test]
    fn read_locking_names() {
        assert_eq!(ReadLocking::None.as_str(), "none");
        assert_eq!(ReadLocking::Shared.as_str(), "shared");
    }
}
