// crates/sqlforage-sqlite/src/sqlite_engine.rs
// ============================================================================
// Module: SQLite Engine
// Description: SqlEngine implementation over rusqlite.
// Purpose: Run native SQLite calls off the async scheduler.
// Dependencies: rusqlite, serde, tokio
// ============================================================================

//! ## Overview
//! [`SqliteEngine`] maps each database name to `<directory>/<name>.db` and
//! runs every blocking `SQLite` call on the blocking thread pool, so awaiting
//! an engine call never stalls an async worker. Transactions are driven with
//! explicit `BEGIN`/`COMMIT`/`ROLLBACK` statements because the lifecycle
//! layer issues them as separate suspension points.
//! Security posture: database names are validated as file stems before any
//! path is built.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::params_from_iter;
use serde::Deserialize;
use serde::Serialize;
use sqlforage_core::validate_database_name;

use crate::engine::EngineError;
use crate::engine::SqlEngine;
use crate::engine::SqlRow;
use crate::engine::SqlValue;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default directory holding database files.
const DEFAULT_DIRECTORY: &str = "localForage";
/// Database file extension.
const DATABASE_EXTENSION: &str = "db";
/// Sidecar suffixes `SQLite` may leave next to a database file.
const SIDECAR_SUFFIXES: [&str; 3] = ["-wal", "-shm", "-journal"];
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteJournalMode {
    /// WAL journal mode.
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
}

impl SqliteJournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` engine.
///
/// # Invariants
/// - `directory` must not point at an existing regular file.
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteEngineConfig {
    /// Directory holding one `<name>.db` file per database.
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for SqliteEngineConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteJournalMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl SqliteEngineConfig {
    /// Returns a default configuration rooted at `directory`.
    #[must_use]
    pub fn in_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Invalid`] when the directory path is unusable or
    /// the busy timeout is zero.
    pub fn validate(&self) -> Result<(), EngineError> {
        validate_directory(&self.directory)?;
        if self.busy_timeout_ms == 0 {
            return Err(EngineError::Invalid(
                "busy_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Returns the default database directory.
fn default_directory() -> PathBuf {
    PathBuf::from(DEFAULT_DIRECTORY)
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// `SQLite` engine backed by `rusqlite`.
#[derive(Debug, Clone)]
pub struct SqliteEngine {
    /// Engine configuration.
    config: SqliteEngineConfig,
}

/// Open `SQLite` connection handle.
///
/// # Invariants
/// - Clones share one native connection; `close` succeeds only on the last clone.
#[derive(Debug, Clone)]
pub struct SqliteConnection {
    /// Database name the connection was opened for.
    database: Arc<str>,
    /// Native connection guarded for blocking-pool access.
    inner: Arc<Mutex<Connection>>,
}

impl SqliteConnection {
    /// Returns the database name the connection was opened for.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }
}

impl SqliteEngine {
    /// Creates an engine from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Invalid`] when the configuration is invalid.
    pub fn new(config: SqliteEngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            config,
        })
    }

    /// Returns the engine configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteEngineConfig {
        &self.config
    }

    /// Returns the file path backing `database`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Invalid`] when the name is not a safe file stem.
    pub fn database_path(&self, database: &str) -> Result<PathBuf, EngineError> {
        validate_database_name(database).map_err(|err| EngineError::Invalid(err.to_string()))?;
        Ok(self.config.directory.join(format!("{database}.{DATABASE_EXTENSION}")))
    }
}

#[async_trait]
impl SqlEngine for SqliteEngine {
    type Connection = SqliteConnection;

    fn is_available(&self) -> bool {
        Connection::open_in_memory().is_ok()
    }

    async fn open(&self, database: &str) -> Result<SqliteConnection, EngineError> {
        let path = self.database_path(database)?;
        let config = self.config.clone();
        let connection = tokio::task::spawn_blocking(move || {
            ensure_parent_dir(&path)?;
            open_connection(&path, &config)
        })
        .await
        .map_err(|err| EngineError::Io(format!("sqlite open worker failed: {err}")))??;
        Ok(SqliteConnection {
            database: Arc::from(database),
            inner: Arc::new(Mutex::new(connection)),
        })
    }

    async fn close(&self, connection: SqliteConnection) -> Result<(), EngineError> {
        let SqliteConnection {
            database,
            inner,
        } = connection;
        let mutex = Arc::try_unwrap(inner).map_err(|_| {
            EngineError::Io(format!("sqlite connection for {database} is still shared"))
        })?;
        let native = mutex
            .into_inner()
            .map_err(|_| EngineError::Io("sqlite connection mutex poisoned".to_string()))?;
        tokio::task::spawn_blocking(move || {
            native.close().map_err(|(_, err)| EngineError::Db(err.to_string()))
        })
        .await
        .map_err(|err| EngineError::Io(format!("sqlite close worker failed: {err}")))?
    }

    async fn begin(&self, connection: &SqliteConnection) -> Result<(), EngineError> {
        run_batch(connection, "BEGIN IMMEDIATE").await
    }

    async fn commit(&self, connection: &SqliteConnection) -> Result<(), EngineError> {
        run_batch(connection, "COMMIT").await
    }

    async fn rollback(&self, connection: &SqliteConnection) -> Result<(), EngineError> {
        run_batch(connection, "ROLLBACK").await
    }

    async fn execute(
        &self,
        connection: &SqliteConnection,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Option<usize>, EngineError> {
        let sql = sql.to_string();
        let params = params.to_vec();
        run_blocking(connection, move |native| {
            native.execute(&sql, params_from_iter(params.iter())).map(Some).map_err(db_error)
        })
        .await
    }

    async fn select(
        &self,
        connection: &SqliteConnection,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<SqlRow>, EngineError> {
        let sql = sql.to_string();
        let params = params.to_vec();
        run_blocking(connection, move |native| {
            let mut stmt = native.prepare(&sql).map_err(db_error)?;
            let columns: Arc<[String]> =
                stmt.column_names().into_iter().map(str::to_string).collect();
            let width = columns.len();
            let mut rows = stmt.query(params_from_iter(params.iter())).map_err(db_error)?;
            let mut results = Vec::new();
            while let Some(row) = rows.next().map_err(db_error)? {
                let mut values = Vec::with_capacity(width);
                for index in 0 .. width {
                    values.push(row.get::<_, SqlValue>(index).map_err(db_error)?);
                }
                results.push(SqlRow::new(Arc::clone(&columns), values));
            }
            Ok(results)
        })
        .await
    }

    async fn destroy(&self, database: &str) -> Result<(), EngineError> {
        let path = self.database_path(database)?;
        tokio::task::spawn_blocking(move || {
            remove_if_present(&path)?;
            for suffix in SIDECAR_SUFFIXES {
                let mut sidecar = path.clone().into_os_string();
                sidecar.push(suffix);
                remove_if_present(Path::new(&sidecar))?;
            }
            Ok(())
        })
        .await
        .map_err(|err| EngineError::Io(format!("sqlite destroy worker failed: {err}")))?
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Runs `operation` against the native connection on the blocking pool.
async fn run_blocking<T, F>(connection: &SqliteConnection, operation: F) -> Result<T, EngineError>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T, EngineError> + Send + 'static,
{
    let inner = Arc::clone(&connection.inner);
    tokio::task::spawn_blocking(move || {
        let guard = inner
            .lock()
            .map_err(|_| EngineError::Io("sqlite connection mutex poisoned".to_string()))?;
        operation(&guard)
    })
    .await
    .map_err(|err| EngineError::Io(format!("sqlite worker failed: {err}")))?
}

/// Runs a parameterless control statement.
async fn run_batch(connection: &SqliteConnection, sql: &'static str) -> Result<(), EngineError> {
    run_blocking(connection, move |native| native.execute_batch(sql).map_err(db_error)).await
}

/// Maps a `rusqlite` error into an engine error.
#[allow(clippy::needless_pass_by_value, reason = "Used directly as a map_err adapter.")]
fn db_error(err: rusqlite::Error) -> EngineError {
    EngineError::Db(err.to_string())
}

/// Ensures the parent directory for a database file exists.
fn ensure_parent_dir(path: &Path) -> Result<(), EngineError> {
    let Some(parent) = path.parent() else {
        return Err(EngineError::Io("database path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| EngineError::Io(err.to_string()))
}

/// Validates the database directory for safety limits.
fn validate_directory(path: &Path) -> Result<(), EngineError> {
    if path.as_os_str().is_empty() {
        return Err(EngineError::Invalid("database directory must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(EngineError::Invalid("database directory exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(EngineError::Invalid(
                "database directory contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && !path.is_dir() {
        return Err(EngineError::Invalid(
            "database directory must be a directory, not a file".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection and applies configured pragmas.
fn open_connection(path: &Path, config: &SqliteEngineConfig) -> Result<Connection, EngineError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(path, flags).map_err(db_error)?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(connection: &Connection, config: &SqliteEngineConfig) -> Result<(), EngineError> {
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db_error)?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms)).map_err(db_error)?;
    Ok(())
}

/// Removes a file, treating a missing file as success.
fn remove_if_present(path: &Path) -> Result<(), EngineError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(EngineError::Io(err.to_string())),
    }
}
