// crates/sqlforage/src/lib.rs
// ============================================================================
// Module: sqlforage Library
// Description: Configuration loading and configured store assembly.
// Purpose: Build a ready-to-use key-value handle from a config file.
// Dependencies: serde, sqlforage-core, sqlforage-sqlite, thiserror, toml, tracing
// ============================================================================

//! ## Overview
//! `sqlforage` ties the workspace together: [`ForageConfig`] is loaded and
//! validated from TOML, and [`open_configured`] registers drivers in the
//! configured preference order and opens the configured default store.
//! Invariants:
//! - Drivers are registered exactly in `driver_order`.
//! - The namespaced driver always shares the caller's key space.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Imports
// ============================================================================

use sqlforage_core::Forage;
use sqlforage_core::ForageBuilder;
use sqlforage_core::NamespacedDriver;
use sqlforage_core::SharedKeySpace;
use sqlforage_core::StoreError;
use sqlforage_core::StoreOptions;
use sqlforage_sqlite::SqliteDriver;
use tracing::debug;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::CONFIG_ENV_VAR;
pub use config::ConfigError;
pub use config::DEFAULT_CONFIG_NAME;
pub use config::DriverKind;
pub use config::ForageConfig;

// ============================================================================
// SECTION: Assembly
// ============================================================================

/// Returns a builder with drivers registered in the configured order.
///
/// # Errors
///
/// Returns [`StoreError::Invalid`] when the `SQLite` engine configuration is
/// invalid.
pub fn configured_builder(
    config: &ForageConfig,
    space: &SharedKeySpace,
) -> Result<ForageBuilder, StoreError> {
    let mut builder = Forage::builder();
    for kind in &config.driver_order {
        builder = match kind {
            DriverKind::Sqlite => builder.driver(
                SqliteDriver::from_config(config.sqlite.clone())
                    .map_err(|err| StoreError::Invalid(err.to_string()))?,
            ),
            DriverKind::Namespaced => builder.driver(NamespacedDriver::new(space.clone())),
        };
    }
    debug!(drivers = %builder.driver_names().join(", "), "storage drivers registered");
    Ok(builder)
}

/// Opens the configured default store.
///
/// # Errors
///
/// Returns [`StoreError`] when no configured driver is supported or the
/// selected driver cannot open the store.
pub async fn open_configured(
    config: &ForageConfig,
    space: &SharedKeySpace,
) -> Result<Forage, StoreError> {
    open_store(config, space, config.store.clone()).await
}

/// Opens `options` with the configured drivers.
///
/// # Errors
///
/// Returns [`StoreError`] when no configured driver is supported or the
/// selected driver cannot open the store.
pub async fn open_store(
    config: &ForageConfig,
    space: &SharedKeySpace,
    options: StoreOptions,
) -> Result<Forage, StoreError> {
    configured_builder(config, space)?.build(options).await
}
