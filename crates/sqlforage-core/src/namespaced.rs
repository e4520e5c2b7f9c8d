// crates/sqlforage-core/src/namespaced.rs
// ============================================================================
// Module: Namespaced Key Backend
// Description: Key-value stores over a flat, shared host key space.
// Purpose: Provide a fallback driver when no SQL engine is available.
// Dependencies: async-trait, serde_json
// ============================================================================

//! ## Overview
//! [`SharedKeySpace`] models a host's flat string key-value area. The
//! namespaced driver maps every store onto it by prefixing keys with
//! `"<name>/<store_name>/"`; values are stored as JSON text.
//! Invariants:
//! - Each store only sees entries under its own prefix.
//! - Keys are reported without the prefix, in ascending key order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;
use crate::interfaces::IterationVisitor;
use crate::interfaces::KeyValueStore;
use crate::interfaces::StorageDriver;
use crate::key::StoreKey;
use crate::options::StoreOptions;

/// Driver name reported by [`NamespacedDriver`].
pub const NAMESPACED_DRIVER_NAME: &str = "namespaced";

// ============================================================================
// SECTION: Key Space
// ============================================================================

/// Flat string key space shared by every namespaced store.
#[derive(Debug, Clone, Default)]
pub struct SharedKeySpace {
    /// Raw entries keyed by full prefixed key.
    entries: Arc<RwLock<BTreeMap<String, String>>>,
}

impl SharedKeySpace {
    /// Creates an empty key space.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of raw entries across all stores.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true when no store holds any entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Returns the raw text stored under a full prefixed key.
    #[must_use]
    pub fn raw(&self, full_key: &str) -> Option<String> {
        self.read().get(full_key).cloned()
    }

    /// Acquires the read lock, recovering from poisoning.
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, String>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquires the write lock, recovering from poisoning.
    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, String>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `(unprefixed key, raw value)` pairs under `prefix`.
    fn scan(&self, prefix: &str) -> Vec<(String, String)> {
        self.read()
            .range(prefix.to_string() ..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key[prefix.len() ..].to_string(), value.clone()))
            .collect()
    }

    /// Removes every entry under `prefix`.
    fn remove_prefix(&self, prefix: &str) {
        self.write().retain(|key, _| !key.starts_with(prefix));
    }
}

// ============================================================================
// SECTION: Driver
// ============================================================================

/// Driver backed by a [`SharedKeySpace`].
#[derive(Debug, Clone, Default)]
pub struct NamespacedDriver {
    /// Key space shared by every store this driver opens.
    space: SharedKeySpace,
}

impl NamespacedDriver {
    /// Creates a driver over the given key space.
    #[must_use]
    pub const fn new(space: SharedKeySpace) -> Self {
        Self {
            space,
        }
    }
}

#[async_trait]
impl StorageDriver for NamespacedDriver {
    fn name(&self) -> &'static str {
        NAMESPACED_DRIVER_NAME
    }

    fn is_supported(&self) -> bool {
        true
    }

    async fn open(&self, options: &StoreOptions) -> Result<Box<dyn KeyValueStore>, StoreError> {
        let options = options.validated()?;
        let database_prefix = format!("{}/", options.name);
        let prefix = format!("{database_prefix}{}/", options.store_name);
        Ok(Box::new(NamespacedStore {
            options,
            database_prefix,
            prefix,
            space: self.space.clone(),
        }))
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Store view over one `<name>/<store_name>/` prefix.
struct NamespacedStore {
    /// Validated store options.
    options: StoreOptions,
    /// Prefix shared by every store of the database.
    database_prefix: String,
    /// Prefix of this store's entries.
    prefix: String,
    /// Backing key space.
    space: SharedKeySpace,
}

impl NamespacedStore {
    /// Returns the full key for a store key.
    fn full_key(&self, key: &StoreKey) -> String {
        format!("{}{}", self.prefix, key.as_str())
    }
}

#[async_trait]
impl KeyValueStore for NamespacedStore {
    fn options(&self) -> &StoreOptions {
        &self.options
    }

    async fn set_item(&self, key: StoreKey, value: Value) -> Result<Value, StoreError> {
        let text = serde_json::to_string(&value)?;
        self.space.write().insert(self.full_key(&key), text);
        Ok(value)
    }

    async fn get_item(&self, key: StoreKey) -> Result<Option<Value>, StoreError> {
        let Some(text) = self.space.raw(&self.full_key(&key)) else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    async fn remove_item(&self, key: StoreKey) -> Result<(), StoreError> {
        self.space.write().remove(&self.full_key(&key));
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.space.remove_prefix(&self.prefix);
        Ok(())
    }

    async fn key(&self, index: usize) -> Result<Option<String>, StoreError> {
        Ok(self.space.scan(&self.prefix).into_iter().nth(index).map(|(key, _)| key))
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.space.scan(&self.prefix).into_iter().map(|(key, _)| key).collect())
    }

    async fn length(&self) -> Result<usize, StoreError> {
        Ok(self.space.scan(&self.prefix).len())
    }

    async fn iterate(
        &self,
        visitor: &mut IterationVisitor<'_>,
    ) -> Result<Option<Value>, StoreError> {
        for (index, (key, text)) in self.space.scan(&self.prefix).into_iter().enumerate() {
            let value: Value = serde_json::from_str(&text)?;
            if let Some(result) = visitor(value, &key, index + 1) {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    async fn drop_instance(&self) -> Result<(), StoreError> {
        self.space.remove_prefix(&self.database_prefix);
        Ok(())
    }
}
