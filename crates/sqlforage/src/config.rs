// crates/sqlforage/src/config.rs
// ============================================================================
// Module: sqlforage Configuration
// Description: Configuration loading and validation for sqlforage.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: serde, sqlforage-core, sqlforage-sqlite, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! The file names the default store, the driver preference order, and the
//! `SQLite` engine settings. Missing or invalid configuration fails closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use sqlforage_core::NAMESPACED_DRIVER_NAME;
use sqlforage_core::StoreOptions;
use sqlforage_sqlite::SQLITE_DRIVER_NAME;
use sqlforage_sqlite::SqliteEngineConfig;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
pub const DEFAULT_CONFIG_NAME: &str = "sqlforage.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "SQLFORAGE_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Storage driver kinds selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    /// `SQLite`-backed driver.
    Sqlite,
    /// Namespaced flat key space driver.
    Namespaced,
}

impl DriverKind {
    /// Returns the driver name reported by the matching driver.
    #[must_use]
    pub const fn driver_name(self) -> &'static str {
        match self {
            Self::Sqlite => SQLITE_DRIVER_NAME,
            Self::Namespaced => NAMESPACED_DRIVER_NAME,
        }
    }
}

/// Top-level sqlforage configuration.
///
/// # Invariants
/// - `driver_order` is non-empty and free of duplicates after validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForageConfig {
    /// Default store options.
    #[serde(default)]
    pub store: StoreOptions,
    /// Driver preference order.
    #[serde(default = "default_driver_order")]
    pub driver_order: Vec<DriverKind>,
    /// `SQLite` engine configuration.
    #[serde(default)]
    pub sqlite: SqliteEngineConfig,
}

impl Default for ForageConfig {
    fn default() -> Self {
        Self {
            store: StoreOptions::default(),
            driver_order: default_driver_order(),
            sqlite: SqliteEngineConfig::default(),
        }
    }
}

impl ForageConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration and normalizes the store name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when configuration is invalid.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.store = self
            .store
            .validated()
            .map_err(|err| ConfigError::Invalid(format!("store: {err}")))?;
        validate_driver_order(&self.driver_order)?;
        validate_path_string("sqlite.directory", &self.sqlite.directory.to_string_lossy())?;
        self.sqlite.validate().map_err(|err| ConfigError::Invalid(format!("sqlite: {err}")))?;
        Ok(())
    }
}

/// Returns the default driver preference order.
fn default_driver_order() -> Vec<DriverKind> {
    vec![DriverKind::Sqlite, DriverKind::Namespaced]
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from an explicit path or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates the driver preference order.
fn validate_driver_order(order: &[DriverKind]) -> Result<(), ConfigError> {
    if order.is_empty() {
        return Err(ConfigError::Invalid("driver_order must list at least one driver".to_string()));
    }
    for (index, kind) in order.iter().enumerate() {
        if order[.. index].contains(kind) {
            return Err(ConfigError::Invalid(format!(
                "driver_order lists {} more than once",
                kind.driver_name()
            )));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
