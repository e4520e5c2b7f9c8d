// crates/sqlforage-sqlite/src/error.rs
// ============================================================================
// Module: Lifecycle Errors
// Description: Failure taxonomy of the connection lifecycle layer.
// Purpose: Classify open/transaction/execution failures for callers.
// Dependencies: sqlforage-core, thiserror
// ============================================================================

//! ## Overview
//! [`LifecycleError`] is what queued operations settle with. Close failures
//! are part of the taxonomy but are only ever logged: the operation that
//! triggered the close has already produced its result.

use sqlforage_core::StoreError;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Connection lifecycle errors.
///
/// # Invariants
/// - Messages never embed bound parameter values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// Native connection could not be opened.
    #[error("sqlite open error for {database}: {message}")]
    Open {
        /// Database name.
        database: String,
        /// Engine failure message.
        message: String,
    },
    /// Native connection could not be closed.
    #[error("sqlite close error for {database}: {message}")]
    Close {
        /// Database name.
        database: String,
        /// Engine failure message.
        message: String,
    },
    /// Transaction control statement failed.
    #[error("sqlite transaction {operation} failed: {message}")]
    Transaction {
        /// Control step (`begin`, `commit`).
        operation: &'static str,
        /// Engine failure message.
        message: String,
    },
    /// Statement failed or reported no result; the transaction was rolled back.
    #[error("sqlite execution error: {0}")]
    Execution(String),
    /// Read statement failed.
    #[error("sqlite query error: {0}")]
    Query(String),
    /// Backing table for a store could not be created.
    #[error("sqlite table creation error for {store}: {message}")]
    TableCreation {
        /// Store (table) name.
        store: String,
        /// Failure message.
        message: String,
    },
    /// Database could not be destroyed.
    #[error("sqlite drop error for {database}: {message}")]
    Drop {
        /// Database name.
        database: String,
        /// Engine failure message.
        message: String,
    },
    /// Database or store name is not a safe identifier.
    #[error("sqlite invalid name: {0}")]
    InvalidName(String),
    /// Queued task could not be scheduled or never settled.
    #[error("sqlite task queue error: {0}")]
    Queue(String),
}

impl From<LifecycleError> for StoreError {
    fn from(error: LifecycleError) -> Self {
        match error {
            LifecycleError::InvalidName(message) => Self::Invalid(message),
            error @ (LifecycleError::Open {
                ..
            }
            | LifecycleError::Queue(_)) => Self::Unavailable(error.to_string()),
            other => Self::Backend(other.to_string()),
        }
    }
}
