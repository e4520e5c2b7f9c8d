// crates/sqlforage-core/src/options.rs
// ============================================================================
// Module: Store Options
// Description: Database/store naming options and identifier sanitization.
// Purpose: Ensure names reaching a backend are safe file stems and identifiers.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! [`StoreOptions`] names a logical store: the database it lives in and the
//! store (table) inside that database. Options are passed explicitly into
//! every driver; there is no process-wide "current store".
//! Invariants:
//! - Database names are safe file stems (no separators, no `.`/`..`).
//! - Store names contain only ASCII word characters after sanitization.

use serde::Deserialize;
use serde::Serialize;

use crate::error::StoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default database name.
pub const DEFAULT_DATABASE_NAME: &str = "localforage";
/// Default store name.
pub const DEFAULT_STORE_NAME: &str = "keyvaluepairs";
/// Maximum length of a database or store name in bytes.
pub const MAX_NAME_LENGTH: usize = 255;
/// Prefix reserved by `SQLite` for internal tables.
const RESERVED_STORE_PREFIX: &str = "sqlite_";

// ============================================================================
// SECTION: Options
// ============================================================================

/// Naming options for a key-value store.
///
/// # Invariants
/// - Values returned by [`StoreOptions::validated`] satisfy the module rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Database name.
    pub name: String,
    /// Store (table) name inside the database.
    pub store_name: String,
    /// Free-form description, informational only.
    pub description: String,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            name: DEFAULT_DATABASE_NAME.to_string(),
            store_name: DEFAULT_STORE_NAME.to_string(),
            description: String::new(),
        }
    }
}

impl StoreOptions {
    /// Creates options for the given database and store names.
    #[must_use]
    pub fn new(name: impl Into<String>, store_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store_name: store_name.into(),
            description: String::new(),
        }
    }

    /// Returns a copy with a validated database name and sanitized store name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when either name cannot be made safe.
    pub fn validated(&self) -> Result<Self, StoreError> {
        validate_database_name(&self.name)?;
        Ok(Self {
            name: self.name.clone(),
            store_name: sanitize_store_name(&self.store_name)?,
            description: self.description.clone(),
        })
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates that a database name is usable as a file stem.
///
/// # Errors
///
/// Returns [`StoreError::Invalid`] when the name is empty, too long, a dot
/// segment, or contains a path separator or NUL byte.
pub fn validate_database_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() {
        return Err(StoreError::Invalid("database name must not be empty".to_string()));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(StoreError::Invalid(format!(
            "database name exceeds {MAX_NAME_LENGTH} bytes"
        )));
    }
    if name == "." || name == ".." {
        return Err(StoreError::Invalid("database name must not be a dot segment".to_string()));
    }
    if name.chars().any(|ch| matches!(ch, '/' | '\\' | '\0')) {
        return Err(StoreError::Invalid(
            "database name must not contain path separators or NUL".to_string(),
        ));
    }
    Ok(())
}

/// Sanitizes a store name into a safe SQL identifier.
///
/// Every character outside `[A-Za-z0-9_]` is replaced with `_`.
///
/// # Errors
///
/// Returns [`StoreError::Invalid`] when the name is empty, too long, or
/// collides with the engine's reserved table prefix.
pub fn sanitize_store_name(raw: &str) -> Result<String, StoreError> {
    if raw.is_empty() {
        return Err(StoreError::Invalid("store name must not be empty".to_string()));
    }
    let sanitized: String = raw
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '_' { ch } else { '_' })
        .collect();
    if sanitized.len() > MAX_NAME_LENGTH {
        return Err(StoreError::Invalid(format!("store name exceeds {MAX_NAME_LENGTH} bytes")));
    }
    if sanitized.to_ascii_lowercase().starts_with(RESERVED_STORE_PREFIX) {
        return Err(StoreError::Invalid(format!(
            "store name must not start with {RESERVED_STORE_PREFIX}"
        )));
    }
    Ok(sanitized)
}
