// crates/sqlforage-sqlite/src/engine.rs
// ============================================================================
// Module: SQL Engine Interface
// Description: Asynchronous seam over the native embedded SQL engine.
// Purpose: Let the lifecycle layer drive any engine through one contract.
// Dependencies: async-trait, rusqlite, thiserror
// ============================================================================

//! ## Overview
//! [`SqlEngine`] is the native engine as seen by the lifecycle layer. Every
//! method is an independent suspension point: connection open and close,
//! transaction begin/commit/rollback, statement execution, and queries.
//! Connection handles are owned by the connection registry; the engine only
//! ever receives them back by reference, except for `close`, which consumes
//! the handle.

use std::sync::Arc;

use async_trait::async_trait;
pub use rusqlite::types::Value as SqlValue;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Native engine failures.
///
/// # Invariants
/// - Messages describe the failure without embedding bound parameter values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Filesystem or worker failure around the engine.
    #[error("engine io error: {0}")]
    Io(String),
    /// Engine rejected the operation.
    #[error("engine db error: {0}")]
    Db(String),
    /// Engine was handed an unusable name or path.
    #[error("engine invalid input: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Rows
// ============================================================================

/// One row returned by [`SqlEngine::select`].
///
/// # Invariants
/// - `values.len()` equals the number of columns.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlRow {
    /// Column names shared by every row of a result set.
    columns: Arc<[String]>,
    /// Cell values in column order.
    values: Vec<SqlValue>,
}

impl SqlRow {
    /// Builds a row from shared column names and cell values.
    #[must_use]
    pub const fn new(columns: Arc<[String]>, values: Vec<SqlValue>) -> Self {
        Self {
            columns,
            values,
        }
    }

    /// Returns the cell for `column`, if present.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        let index = self.columns.iter().position(|name| name == column)?;
        self.values.get(index)
    }

    /// Returns the cell at `index`, if present.
    #[must_use]
    pub fn get_index(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Returns the column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

// ============================================================================
// SECTION: Engine Trait
// ============================================================================

/// Native embedded SQL engine.
#[async_trait]
pub trait SqlEngine: Send + Sync + 'static {
    /// Handle to an open native connection.
    type Connection: Clone + Send + Sync + 'static;

    /// Returns true when the engine can run in the current environment.
    fn is_available(&self) -> bool {
        true
    }

    /// Opens a native connection to `database`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the connection cannot be opened.
    async fn open(&self, database: &str) -> Result<Self::Connection, EngineError>;

    /// Closes a native connection.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the engine refuses to close the handle.
    async fn close(&self, connection: Self::Connection) -> Result<(), EngineError>;

    /// Begins a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the transaction cannot begin.
    async fn begin(&self, connection: &Self::Connection) -> Result<(), EngineError>;

    /// Commits the open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the commit fails.
    async fn commit(&self, connection: &Self::Connection) -> Result<(), EngineError>;

    /// Rolls back the open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the rollback fails.
    async fn rollback(&self, connection: &Self::Connection) -> Result<(), EngineError>;

    /// Executes a mutating statement.
    ///
    /// Returns `Some(rows_affected)` on success; `None` when the engine
    /// completed without reporting a result.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the statement fails.
    async fn execute(
        &self,
        connection: &Self::Connection,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Option<usize>, EngineError>;

    /// Runs a read statement and returns every row.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the query fails.
    async fn select(
        &self,
        connection: &Self::Connection,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<SqlRow>, EngineError>;

    /// Deletes the persisted database; deleting a missing database succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the database cannot be removed.
    async fn destroy(&self, database: &str) -> Result<(), EngineError>;
}
