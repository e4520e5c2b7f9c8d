// crates/sqlforage-sqlite/src/kv.rs
// ============================================================================
// Module: SQLite Key-Value Store
// Description: KeyValueStore and StorageDriver over the lifecycle manager.
// Purpose: Map key-value operations onto parameterized statements.
// Dependencies: async-trait, serde_json, sqlforage-core
// ============================================================================

//! ## Overview
//! [`SqliteKvStore`] binds one (database, store) pair explicitly; there is no
//! shared "current store" state, so stores of different databases never
//! retarget each other. Every operation is one queued task that ensures the
//! store table and then runs parameterized SQL, so a concurrent
//! `drop_instance` lands either before or after it, never in between.
//! Values are persisted as JSON text. Rows are reported in insertion
//! (`rowid`) order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use serde_json::Number;
use serde_json::Value;
use sqlforage_core::IterationVisitor;
use sqlforage_core::KeyValueStore;
use sqlforage_core::StorageDriver;
use sqlforage_core::StoreError;
use sqlforage_core::StoreKey;
use sqlforage_core::StoreOptions;

use crate::bootstrap::quote_identifier;
use crate::bootstrap::require_store;
use crate::engine::EngineError;
use crate::engine::SqlEngine;
use crate::engine::SqlRow;
use crate::engine::SqlValue;
use crate::lifecycle::LifecycleManager;
use crate::sqlite_engine::SqliteEngine;
use crate::sqlite_engine::SqliteEngineConfig;

/// Driver name reported by [`SqliteDriver`].
pub const SQLITE_DRIVER_NAME: &str = "sqlite";

// ============================================================================
// SECTION: Statements
// ============================================================================

/// Prebuilt statements for one store table.
struct Statements {
    /// Upsert one entry.
    set: String,
    /// Read one value.
    get: String,
    /// Delete one entry.
    remove: String,
    /// Delete every entry.
    clear: String,
    /// Read the key at an offset.
    key: String,
    /// Read every key.
    keys: String,
    /// Count entries.
    length: String,
    /// Read every entry.
    iterate: String,
}

impl Statements {
    /// Builds the statements for an already quoted table identifier.
    fn for_table(table: &str) -> Self {
        Self {
            set: format!("INSERT OR REPLACE INTO {table} (key, value) VALUES (?1, ?2)"),
            get: format!("SELECT value FROM {table} WHERE key = ?1"),
            remove: format!("DELETE FROM {table} WHERE key = ?1"),
            clear: format!("DELETE FROM {table}"),
            key: format!("SELECT key FROM {table} ORDER BY rowid LIMIT 1 OFFSET ?1"),
            keys: format!("SELECT key FROM {table} ORDER BY rowid"),
            length: format!("SELECT COUNT(key) FROM {table}"),
            iterate: format!("SELECT key, value FROM {table} ORDER BY rowid"),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Key-value store backed by one table of one database.
///
/// # Invariants
/// - `options` are validated and `options.store_name` is a safe identifier.
pub struct SqliteKvStore<E: SqlEngine> {
    /// Lifecycle manager shared with every store of the driver.
    manager: LifecycleManager<E>,
    /// Validated options naming the database and store.
    options: StoreOptions,
    /// Statements for this store's table.
    statements: Statements,
}

impl<E: SqlEngine> SqliteKvStore<E> {
    /// Validates `options` and ensures the store's table exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] for unusable options, or the failure
    /// from opening the database or creating the table.
    pub async fn open(manager: LifecycleManager<E>, options: &StoreOptions) -> Result<Self, StoreError> {
        let options = options.validated()?;
        let table = quote_identifier(&options.store_name)?;
        require_store(&manager, &options.name, &options.store_name).await?;
        Ok(Self {
            manager,
            statements: Statements::for_table(&table),
            options,
        })
    }

    /// Returns the database name.
    fn database(&self) -> &str {
        &self.options.name
    }

    /// Runs one mutating statement against the store table.
    async fn write(&self, sql: &str, params: Vec<SqlValue>) -> Result<(), StoreError> {
        self.manager
            .execute_in_store(self.database(), &self.options.store_name, sql, params)
            .await
            .map(|_| ())
            .map_err(StoreError::from)
    }

    /// Runs one read statement against the store table.
    async fn read(&self, sql: &str, params: Vec<SqlValue>) -> Result<Vec<SqlRow>, StoreError> {
        self.manager
            .query_in_store(self.database(), &self.options.store_name, sql, params)
            .await
            .map_err(StoreError::from)
    }
}

#[async_trait]
impl<E: SqlEngine> KeyValueStore for SqliteKvStore<E> {
    fn options(&self) -> &StoreOptions {
        &self.options
    }

    async fn set_item(&self, key: StoreKey, value: Value) -> Result<Value, StoreError> {
        let text = serde_json::to_string(&value)?;
        self.write(&self.statements.set, vec![
            SqlValue::Text(key.into_string()),
            SqlValue::Text(text),
        ])
        .await?;
        Ok(value)
    }

    async fn get_item(&self, key: StoreKey) -> Result<Option<Value>, StoreError> {
        let rows = self.read(&self.statements.get, vec![SqlValue::Text(key.into_string())]).await?;
        rows.first().map(|row| decode_value(row.get_index(0))).transpose()
    }

    async fn remove_item(&self, key: StoreKey) -> Result<(), StoreError> {
        self.write(&self.statements.remove, vec![SqlValue::Text(key.into_string())]).await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.write(&self.statements.clear, Vec::new()).await
    }

    async fn key(&self, index: usize) -> Result<Option<String>, StoreError> {
        let offset = i64::try_from(index)
            .map_err(|_| StoreError::Invalid(format!("key index {index} out of range")))?;
        let rows = self.read(&self.statements.key, vec![SqlValue::Integer(offset)]).await?;
        rows.first().map(|row| decode_key(row.get_index(0))).transpose()
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let rows = self.read(&self.statements.keys, Vec::new()).await?;
        rows.iter().map(|row| decode_key(row.get_index(0))).collect()
    }

    async fn length(&self) -> Result<usize, StoreError> {
        let rows = self.read(&self.statements.length, Vec::new()).await?;
        match rows.first().and_then(|row| row.get_index(0)) {
            Some(SqlValue::Integer(count)) => usize::try_from(*count)
                .map_err(|_| StoreError::Backend(format!("invalid row count {count}"))),
            _ => Err(StoreError::Backend("row count query returned no count".to_string())),
        }
    }

    async fn iterate(
        &self,
        visitor: &mut IterationVisitor<'_>,
    ) -> Result<Option<Value>, StoreError> {
        let rows = self.read(&self.statements.iterate, Vec::new()).await?;
        for (index, row) in rows.iter().enumerate() {
            let key = decode_key(row.get_index(0))?;
            let value = decode_value(row.get_index(1))?;
            if let Some(result) = visitor(value, &key, index + 1) {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    async fn drop_instance(&self) -> Result<(), StoreError> {
        self.manager.drop_database(self.database()).await.map_err(StoreError::from)
    }
}

/// Decodes a stored value cell.
fn decode_value(cell: Option<&SqlValue>) -> Result<Value, StoreError> {
    match cell {
        None | Some(SqlValue::Null) => Ok(Value::Null),
        Some(SqlValue::Text(text)) => Ok(serde_json::from_str(text)?),
        Some(SqlValue::Integer(number)) => Ok(Value::from(*number)),
        Some(SqlValue::Real(number)) => Ok(Number::from_f64(*number).map_or(Value::Null, Value::Number)),
        Some(SqlValue::Blob(_)) => {
            Err(StoreError::Serialization("binary value cells are not supported".to_string()))
        }
    }
}

/// Decodes a stored key cell.
fn decode_key(cell: Option<&SqlValue>) -> Result<String, StoreError> {
    match cell {
        Some(SqlValue::Text(text)) => Ok(text.clone()),
        Some(SqlValue::Integer(number)) => Ok(number.to_string()),
        _ => Err(StoreError::Serialization("key cell is not text".to_string())),
    }
}

// ============================================================================
// SECTION: Driver
// ============================================================================

/// Storage driver opening [`SqliteKvStore`]s over one lifecycle manager.
pub struct SqliteDriver<E: SqlEngine = SqliteEngine> {
    /// Manager shared by every store the driver opens.
    manager: LifecycleManager<E>,
}

impl<E: SqlEngine> SqliteDriver<E> {
    /// Creates a driver over an existing manager.
    #[must_use]
    pub const fn new(manager: LifecycleManager<E>) -> Self {
        Self {
            manager,
        }
    }

    /// Returns the lifecycle manager.
    #[must_use]
    pub const fn manager(&self) -> &LifecycleManager<E> {
        &self.manager
    }
}

impl SqliteDriver<SqliteEngine> {
    /// Creates a driver over a fresh [`SqliteEngine`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Invalid`] when the configuration is invalid.
    pub fn from_config(config: SqliteEngineConfig) -> Result<Self, EngineError> {
        Ok(Self::new(LifecycleManager::new(SqliteEngine::new(config)?)))
    }
}

#[async_trait]
impl<E: SqlEngine> StorageDriver for SqliteDriver<E> {
    fn name(&self) -> &'static str {
        SQLITE_DRIVER_NAME
    }

    fn is_supported(&self) -> bool {
        self.manager.engine().is_available()
    }

    async fn open(&self, options: &StoreOptions) -> Result<Box<dyn KeyValueStore>, StoreError> {
        let store = SqliteKvStore::open(self.manager.clone(), options).await?;
        Ok(Box::new(store))
    }
}
