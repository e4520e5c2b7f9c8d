// crates/sqlforage-core/src/forage.rs
// ============================================================================
// Module: Forage Dispatcher
// Description: Driver selection by preference order and operation dispatch.
// Purpose: Give callers one key-value handle regardless of backend.
// Dependencies: async-trait, serde_json, tracing
// ============================================================================

//! ## Overview
//! [`Forage`] is the caller-facing handle. [`ForageBuilder`] collects drivers
//! in preference order; [`ForageBuilder::build`] picks the first driver whose
//! capability probe succeeds, initializes storage for the given options, and
//! binds the resulting store. Every operation afterwards dispatches to that
//! store.
//! Invariants:
//! - Drivers are probed in registration order.
//! - An open failure on a supported driver is reported, not skipped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::StoreError;
use crate::interfaces::KeyValueStore;
use crate::interfaces::StorageDriver;
use crate::key::StoreKey;
use crate::options::StoreOptions;

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builder collecting storage drivers in preference order.
///
/// # Invariants
/// - `build` fails when no registered driver is supported.
#[derive(Default)]
pub struct ForageBuilder {
    /// Drivers in preference order.
    drivers: Vec<Arc<dyn StorageDriver>>,
}

impl ForageBuilder {
    /// Appends a driver to the preference list.
    #[must_use]
    pub fn driver(mut self, driver: impl StorageDriver + 'static) -> Self {
        self.drivers.push(Arc::new(driver));
        self
    }

    /// Appends a shared driver to the preference list.
    #[must_use]
    pub fn shared_driver(mut self, driver: Arc<dyn StorageDriver>) -> Self {
        self.drivers.push(driver);
        self
    }

    /// Returns the registered driver names in preference order.
    #[must_use]
    pub fn driver_names(&self) -> Vec<&'static str> {
        self.drivers.iter().map(|driver| driver.name()).collect()
    }

    /// Selects the first supported driver and opens a store with it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] for unusable options,
    /// [`StoreError::Unsupported`] when no driver is supported, or the chosen
    /// driver's open error.
    pub async fn build(self, options: StoreOptions) -> Result<Forage, StoreError> {
        let options = options.validated()?;
        for driver in &self.drivers {
            if !driver.is_supported() {
                debug!(driver = driver.name(), "storage driver not supported; skipping");
                continue;
            }
            let store = driver.open(&options).await?;
            debug!(
                driver = driver.name(),
                database = %options.name,
                store = %options.store_name,
                "storage driver selected"
            );
            return Ok(Forage {
                driver: driver.name(),
                store,
            });
        }
        Err(StoreError::Unsupported(format!(
            "none of [{}] is supported",
            self.driver_names().join(", ")
        )))
    }
}

// ============================================================================
// SECTION: Forage
// ============================================================================

/// Key-value handle bound to the selected driver's store.
pub struct Forage {
    /// Name of the selected driver.
    driver: &'static str,
    /// Store opened by the selected driver.
    store: Box<dyn KeyValueStore>,
}

impl Forage {
    /// Returns a builder for driver selection.
    #[must_use]
    pub fn builder() -> ForageBuilder {
        ForageBuilder::default()
    }

    /// Returns the selected driver name.
    #[must_use]
    pub const fn driver(&self) -> &'static str {
        self.driver
    }

    /// Returns the options the store was opened with.
    #[must_use]
    pub fn options(&self) -> &StoreOptions {
        self.store.options()
    }

    /// Stores `value` under `key` and returns the stored value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    pub async fn set_item(
        &self,
        key: impl Into<StoreKey> + Send,
        value: Value,
    ) -> Result<Value, StoreError> {
        self.store.set_item(key.into(), value).await
    }

    /// Returns the value under `key`, or `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    pub async fn get_item(&self, key: impl Into<StoreKey> + Send) -> Result<Option<Value>, StoreError> {
        self.store.get_item(key.into()).await
    }

    /// Removes `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the removal fails.
    pub async fn remove_item(&self, key: impl Into<StoreKey> + Send) -> Result<(), StoreError> {
        self.store.remove_item(key.into()).await
    }

    /// Removes every key in the store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be cleared.
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.store.clear().await
    }

    /// Returns the key at `index` in storage order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    pub async fn key(&self, index: usize) -> Result<Option<String>, StoreError> {
        self.store.key(index).await
    }

    /// Returns every key in storage order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the keys cannot be listed.
    pub async fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.store.keys().await
    }

    /// Returns the number of keys in the store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the count fails.
    pub async fn length(&self) -> Result<usize, StoreError> {
        self.store.length().await
    }

    /// Visits entries in storage order until `visitor` returns `Some`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the entries cannot be read.
    pub async fn iterate<F>(&self, mut visitor: F) -> Result<Option<Value>, StoreError>
    where
        F: FnMut(Value, &str, usize) -> Option<Value> + Send,
    {
        self.store.iterate(&mut visitor).await
    }

    /// Destroys the whole database behind this handle.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the database cannot be destroyed.
    pub async fn drop_instance(&self) -> Result<(), StoreError> {
        self.store.drop_instance().await
    }
}
