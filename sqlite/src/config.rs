//! Connection settings for a microlite database.
//!
//! Every field has a default, so a YAML file only needs to name what it
//! changes.
//!
//! # Example YAML
//!
//! ```yaml
//! path: gallery.db
//! allow_migrations: true
//! enforce_foreign_keys: false
//! vacuum_after_migration: true
//! busy_timeout_ms: 5000
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Path that opens a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// Settings used by [`Database::open`](crate::Database::open).
///
/// # Examples
///
/// ```
/// # use microlite_sqlite::DatabaseConfig;
/// let config = DatabaseConfig::new("gallery.db").allow_migrations(true);
/// assert!(config.allow_migrations);
/// assert!(!config.is_in_memory());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file, or `:memory:`.
    pub path: PathBuf,
    /// Permit additive migrations of existing tables.
    pub allow_migrations: bool,
    /// Turn on SQLite's `foreign_keys` pragma for the connection.
    pub enforce_foreign_keys: bool,
    /// Run `VACUUM` after a migration altered existing tables.
    pub vacuum_after_migration: bool,
    /// How long to wait on a locked database before failing.
    pub busy_timeout_ms: Option<u64>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(IN_MEMORY),
            allow_migrations: false,
            enforce_foreign_keys: false,
            vacuum_after_migration: false,
            busy_timeout_ms: None,
        }
    }
}

impl DatabaseConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn allow_migrations(mut self, allow: bool) -> Self {
        self.allow_migrations = allow;
        self
    }

    pub fn enforce_foreign_keys(mut self, enforce: bool) -> Self {
        self.enforce_foreign_keys = enforce;
        self
    }

    pub fn vacuum_after_migration(mut self, vacuum: bool) -> Self {
        self.vacuum_after_migration = vacuum;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == IN_MEMORY
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::SqliteError::IoError) if the file cannot
    /// be read, or [`YamlError`](crate::SqliteError::YamlError) if parsing
    /// fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::SqliteError::IoError) if the file cannot
    /// be written, or [`YamlError`](crate::SqliteError::YamlError) if
    /// serialization fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }
}
