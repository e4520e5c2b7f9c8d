// crates/sqlforage-sqlite/src/bootstrap.rs
// ============================================================================
// Module: Store Bootstrapper
// Description: Idempotent creation of per-store key-value tables.
// Purpose: Guarantee a store's table exists before any statement touches it.
// Dependencies: none
// ============================================================================

//! ## Overview
//! A store is a table named after its sanitized store name inside the
//! database file. Existence is checked against `sqlite_master` every time;
//! creation uses `CREATE TABLE IF NOT EXISTS`, so concurrent ensures for one
//! store cannot race into a duplicate-table failure and an external drop is
//! picked up on the next check. Store-scoped statements run the check in
//! the same queued task as the statement itself.

use crate::engine::SqlEngine;
use crate::error::LifecycleError;
use crate::lifecycle::LifecycleManager;

/// Prefix reserved for engine-internal tables.
const RESERVED_PREFIX: &str = "sqlite_";

/// Returns `store` as a double-quoted SQL identifier.
///
/// # Errors
///
/// Returns [`LifecycleError::InvalidName`] unless `store` is a non-empty run
/// of ASCII letters, digits, and underscores outside the reserved namespace.
pub fn quote_identifier(store: &str) -> Result<String, LifecycleError> {
    if store.is_empty() {
        return Err(LifecycleError::InvalidName("store name must not be empty".to_string()));
    }
    if !store.bytes().all(|byte| byte.is_ascii_alphanumeric() || byte == b'_') {
        return Err(LifecycleError::InvalidName(format!(
            "store name {store} contains characters outside [A-Za-z0-9_]"
        )));
    }
    if store.len() >= RESERVED_PREFIX.len()
        && store[.. RESERVED_PREFIX.len()].eq_ignore_ascii_case(RESERVED_PREFIX)
    {
        return Err(LifecycleError::InvalidName(format!("store name {store} is reserved")));
    }
    Ok(format!("\"{store}\""))
}

/// Existence check against the engine catalog, bound to the table name.
pub(crate) const TABLE_EXISTS_SQL: &str =
    "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1";

/// Returns the idempotent creation statement for an already quoted table.
pub(crate) fn create_table_sql(table: &str) -> String {
    format!("CREATE TABLE IF NOT EXISTS {table} (key TEXT PRIMARY KEY NOT NULL, value TEXT)")
}

/// Ensures the table backing `store` exists in `database`.
///
/// The check and the creation run as one queued task. Returns `Ok(true)`
/// when the table exists afterwards and `Ok(false)` when creation was
/// attempted and failed.
///
/// # Errors
///
/// Returns [`LifecycleError::InvalidName`] for an unusable store name, or the
/// existence check's own error.
pub async fn ensure_store<E: SqlEngine>(
    manager: &LifecycleManager<E>,
    database: &str,
    store: &str,
) -> Result<bool, LifecycleError> {
    manager.ensure_table(database, store).await
}

/// Ensures the table backing `store` exists, failing when it cannot be created.
///
/// # Errors
///
/// Returns [`LifecycleError::TableCreation`] when creation fails, plus every
/// error [`ensure_store`] returns.
pub async fn require_store<E: SqlEngine>(
    manager: &LifecycleManager<E>,
    database: &str,
    store: &str,
) -> Result<(), LifecycleError> {
    if ensure_store(manager, database, store).await? {
        return Ok(());
    }
    Err(LifecycleError::TableCreation {
        store: store.to_string(),
        message: format!("could not create table in {database}"),
    })
}
