// crates/sqlforage-core/src/error.rs
// ============================================================================
// Module: Store Errors
// Description: Caller-facing error taxonomy for key-value operations.
// Purpose: Give every backend one stable error surface.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! [`StoreError`] is what callers of [`crate::KeyValueStore`] and
//! [`crate::Forage`] observe. Backends convert their internal errors into it
//! at the crate boundary. Absence of a key is never an error.

use thiserror::Error;

/// Key-value store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - Messages never embed stored values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Caller supplied an invalid name, key, or option.
    #[error("store invalid input: {0}")]
    Invalid(String),
    /// No configured driver is supported in this environment.
    #[error("no supported storage driver: {0}")]
    Unsupported(String),
    /// The backing storage could not be reached or opened.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A value could not be serialized or a stored value could not be decoded.
    #[error("store serialization error: {0}")]
    Serialization(String),
    /// The backend failed while executing the operation.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}
