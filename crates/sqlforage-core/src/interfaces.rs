// crates/sqlforage-core/src/interfaces.rs
// ============================================================================
// Module: Storage Interfaces
// Description: Backend-agnostic key-value store and driver traits.
// Purpose: Define the contract every storage backend implements.
// Dependencies: async-trait, serde_json
// ============================================================================

//! ## Overview
//! A [`StorageDriver`] probes whether it can run in the current environment
//! and opens a [`KeyValueStore`] bound to explicit [`StoreOptions`]. Each
//! store instance carries its own database and store names, so concurrent
//! operations against different stores never share mutable targets.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;
use crate::key::StoreKey;
use crate::options::StoreOptions;

/// Visitor passed to [`KeyValueStore::iterate`].
///
/// Receives `(value, key, iteration_number)` with 1-based iteration numbers.
/// Returning `Some` stops the iteration and makes that value the result.
pub type IterationVisitor<'a> = dyn FnMut(Value, &str, usize) -> Option<Value> + Send + 'a;

/// Key-value operations over a single store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the options this store was opened with.
    fn options(&self) -> &StoreOptions;

    /// Stores `value` under `key`, replacing any existing value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the value cannot be persisted.
    async fn set_item(&self, key: StoreKey, value: Value) -> Result<Value, StoreError>;

    /// Returns the value stored under `key`, or `None` when the key is absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails or the value is corrupt.
    async fn get_item(&self, key: StoreKey) -> Result<Option<Value>, StoreError>;

    /// Removes `key`; removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the removal fails.
    async fn remove_item(&self, key: StoreKey) -> Result<(), StoreError>;

    /// Removes every key in the store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be cleared.
    async fn clear(&self) -> Result<(), StoreError>;

    /// Returns the key at `index` in storage order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    async fn key(&self, index: usize) -> Result<Option<String>, StoreError>;

    /// Returns every key in storage order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the keys cannot be listed.
    async fn keys(&self) -> Result<Vec<String>, StoreError>;

    /// Returns the number of keys in the store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the count fails.
    async fn length(&self) -> Result<usize, StoreError>;

    /// Visits every entry in storage order until the visitor returns `Some`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the entries cannot be read or decoded.
    async fn iterate(
        &self,
        visitor: &mut IterationVisitor<'_>,
    ) -> Result<Option<Value>, StoreError>;

    /// Destroys the whole database this store lives in.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the database cannot be destroyed.
    async fn drop_instance(&self) -> Result<(), StoreError>;
}

/// Storage backend factory with a capability probe.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Returns the stable driver name.
    fn name(&self) -> &'static str;

    /// Returns true when the backend can run in the current environment.
    fn is_supported(&self) -> bool;

    /// Initializes storage for `options` and returns a bound store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the options are invalid or storage cannot
    /// be prepared.
    async fn open(&self, options: &StoreOptions) -> Result<Box<dyn KeyValueStore>, StoreError>;
}
