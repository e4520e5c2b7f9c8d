// crates/sqlforage-sqlite/tests/common/mod.rs
// ============================================================================
// Module: Common Test Utilities
// Description: Shared engine wrapper and builders for sqlforage-sqlite tests.
// Purpose: Count native opens/closes and inject engine failures.
// Dependencies: sqlforage-sqlite, tempfile
// ============================================================================

//! ## Overview
//! [`CountingEngine`] wraps a real [`SqliteEngine`] rooted in a temporary
//! directory. It counts native opens and closes and can be told to fail
//! opens, statements, reads, commits, or closes, to report a statement as
//! having produced no result, or to panic when a transaction begins.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    dead_code,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use sqlforage_sqlite::EngineError;
use sqlforage_sqlite::LifecycleManager;
use sqlforage_sqlite::SqlEngine;
use sqlforage_sqlite::SqlRow;
use sqlforage_sqlite::SqlValue;
use sqlforage_sqlite::SqliteConnection;
use sqlforage_sqlite::SqliteEngine;
use sqlforage_sqlite::SqliteEngineConfig;
use tempfile::TempDir;

// ============================================================================
// SECTION: Faults
// ============================================================================

/// Failure switches consulted by [`CountingEngine`].
#[derive(Debug, Default)]
pub struct Faults {
    /// Fail every open.
    pub open: AtomicBool,
    /// Run the statement, then report an error.
    pub execute: AtomicBool,
    /// Run the statement, then report no result.
    pub falsy: AtomicBool,
    /// Fail every read.
    pub select: AtomicBool,
    /// Panic on every begin.
    pub panic_begin: AtomicBool,
    /// Fail every commit without committing.
    pub commit: AtomicBool,
    /// Fail every close.
    pub close: AtomicBool,
}

impl Faults {
    /// Flips one switch.
    pub fn set(flag: &AtomicBool, enabled: bool) {
        flag.store(enabled, Ordering::SeqCst);
    }

    fn on(flag: &AtomicBool) -> bool {
        flag.load(Ordering::SeqCst)
    }
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Engine wrapper counting native opens and closes.
pub struct CountingEngine {
    inner: SqliteEngine,
    opens: AtomicUsize,
    closes: AtomicUsize,
    pub faults: Faults,
}

impl CountingEngine {
    /// Creates a wrapper rooted at `dir`.
    pub fn new(dir: &TempDir) -> Self {
        Self {
            inner: SqliteEngine::new(SqliteEngineConfig::in_directory(dir.path())).unwrap(),
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            faults: Faults::default(),
        }
    }

    /// Returns the number of successful native opens.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Returns the number of native close attempts.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SqlEngine for CountingEngine {
    type Connection = SqliteConnection;

    async fn open(&self, database: &str) -> Result<SqliteConnection, EngineError> {
        if Faults::on(&self.faults.open) {
            return Err(EngineError::Io("injected open failure".to_string()));
        }
        let connection = self.inner.open(database).await?;
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(connection)
    }

    async fn close(&self, connection: SqliteConnection) -> Result<(), EngineError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        let result = self.inner.close(connection).await;
        if Faults::on(&self.faults.close) {
            return Err(EngineError::Db("injected close failure".to_string()));
        }
        result
    }

    async fn begin(&self, connection: &SqliteConnection) -> Result<(), EngineError> {
        if Faults::on(&self.faults.panic_begin) {
            panic!("injected begin panic");
        }
        self.inner.begin(connection).await
    }

    async fn commit(&self, connection: &SqliteConnection) -> Result<(), EngineError> {
        if Faults::on(&self.faults.commit) {
            return Err(EngineError::Db("injected commit failure".to_string()));
        }
        self.inner.commit(connection).await
    }

    async fn rollback(&self, connection: &SqliteConnection) -> Result<(), EngineError> {
        self.inner.rollback(connection).await
    }

    async fn execute(
        &self,
        connection: &SqliteConnection,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Option<usize>, EngineError> {
        let result = self.inner.execute(connection, sql, params).await?;
        if Faults::on(&self.faults.execute) {
            return Err(EngineError::Db("injected statement failure".to_string()));
        }
        if Faults::on(&self.faults.falsy) {
            return Ok(None);
        }
        Ok(result)
    }

    async fn select(
        &self,
        connection: &SqliteConnection,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<SqlRow>, EngineError> {
        if Faults::on(&self.faults.select) {
            return Err(EngineError::Db("injected read failure".to_string()));
        }
        self.inner.select(connection, sql, params).await
    }

    async fn destroy(&self, database: &str) -> Result<(), EngineError> {
        self.inner.destroy(database).await
    }
}

// ============================================================================
// SECTION: Builders
// ============================================================================

/// Returns a manager over a fresh counting engine and its scratch directory.
pub fn counting_manager() -> (LifecycleManager<CountingEngine>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let manager = LifecycleManager::new(CountingEngine::new(&dir));
    (manager, dir)
}

/// Creates a two-column scratch table in `database`.
pub async fn create_scratch_table(manager: &LifecycleManager<CountingEngine>, database: &str) {
    manager
        .execute(database, "CREATE TABLE IF NOT EXISTS t (k TEXT PRIMARY KEY, v TEXT)", Vec::new())
        .await
        .unwrap();
}

/// Returns the number of rows in the scratch table.
pub async fn scratch_rows(manager: &LifecycleManager<CountingEngine>, database: &str) -> i64 {
    let rows = manager.query(database, "SELECT COUNT(*) AS n FROM t", Vec::new()).await.unwrap();
    match rows[0].get("n") {
        Some(SqlValue::Integer(count)) => *count,
        other => panic!("unexpected count cell: {other:?}"),
    }
}
