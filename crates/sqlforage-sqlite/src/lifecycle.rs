// crates/sqlforage-sqlite/src/lifecycle.rs
// ============================================================================
// Module: Lifecycle Manager
// Description: Open, transact, and close around every queued statement.
// Purpose: Give callers transactional execute and read-only query calls.
// Dependencies: tokio, tracing
// ============================================================================

//! ## Overview
//! [`LifecycleManager`] funnels every statement through the per-database
//! task queue. A mutating statement runs as
//! `acquire -> BEGIN -> execute -> COMMIT | ROLLBACK -> release`; a read runs
//! as `acquire -> select -> release`. The engine work between acquire and
//! release runs in its own spawned task, so release also runs when an engine
//! call panics.
//! Store-scoped variants ([`LifecycleManager::execute_in_store`],
//! [`LifecycleManager::query_in_store`]) check the store table and run the
//! statement as a single queued task, so no other task for the database can
//! run between the check and the statement.
//! [`ConnectionHold`] keeps a database's connection open across several
//! statements issued by one higher-level operation.
//! Invariants:
//! - Statements against one database run one at a time, in submission order.
//! - A statement that fails or reports no result is rolled back.
//! - A failed open consumes no token and attempts no transaction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;

use tracing::debug;
use tracing::warn;

use crate::bootstrap::TABLE_EXISTS_SQL;
use crate::bootstrap::create_table_sql;
use crate::bootstrap::quote_identifier;
use crate::engine::SqlEngine;
use crate::engine::SqlRow;
use crate::engine::SqlValue;
use crate::error::LifecycleError;
use crate::queue::Pending;
use crate::queue::TaskQueue;
use crate::registry::ConnectionRegistry;
use crate::stats::LifecycleEvent;
use crate::stats::LifecycleStats;
use crate::stats::LifecycleStatsSnapshot;

// ============================================================================
// SECTION: Manager
// ============================================================================

/// Shared state behind every manager clone and hold.
struct ManagerInner<E: SqlEngine> {
    /// Native engine.
    engine: Arc<E>,
    /// Connection registry.
    registry: ConnectionRegistry<E>,
    /// Per-database task queue.
    queue: TaskQueue,
    /// Shared lifecycle counters.
    stats: Arc<LifecycleStats>,
}

/// Connection lifecycle manager over a [`SqlEngine`].
///
/// # Invariants
/// - Clones share one registry and one queue.
pub struct LifecycleManager<E: SqlEngine> {
    /// Shared manager state.
    inner: Arc<ManagerInner<E>>,
}

impl<E: SqlEngine> Clone for LifecycleManager<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: SqlEngine> LifecycleManager<E> {
    /// Creates a manager with an empty registry and queue.
    #[must_use]
    pub fn new(engine: E) -> Self {
        let engine = Arc::new(engine);
        let stats = Arc::new(LifecycleStats::default());
        Self {
            inner: Arc::new(ManagerInner {
                registry: ConnectionRegistry::new(Arc::clone(&engine), Arc::clone(&stats)),
                queue: TaskQueue::new(Arc::clone(&stats)),
                engine,
                stats,
            }),
        }
    }

    /// Returns the native engine.
    #[must_use]
    pub fn engine(&self) -> &E {
        &self.inner.engine
    }

    /// Runs a mutating statement inside its own transaction.
    ///
    /// Returns the number of affected rows once the transaction committed.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Open`] when the connection cannot be opened,
    /// [`LifecycleError::Transaction`] when begin or commit fails, or
    /// [`LifecycleError::Execution`] when the statement fails, reports no
    /// result, or panics. Every failure after `BEGIN` is rolled back first.
    pub async fn execute(
        &self,
        database: &str,
        sql: impl Into<String> + Send,
        params: Vec<SqlValue>,
    ) -> Result<usize, LifecycleError> {
        let task =
            Arc::clone(&self.inner).run_execute(database.to_string(), None, sql.into(), params);
        self.schedule_claimed(database, task)?.wait().await
    }

    /// Ensures the table backing `store` and runs a mutating statement, as
    /// one queued task.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidName`] for an unusable store name,
    /// [`LifecycleError::TableCreation`] when the table cannot be created, or
    /// any error [`LifecycleManager::execute`] returns.
    pub async fn execute_in_store(
        &self,
        database: &str,
        store: &str,
        sql: impl Into<String> + Send,
        params: Vec<SqlValue>,
    ) -> Result<usize, LifecycleError> {
        quote_identifier(store)?;
        let task = Arc::clone(&self.inner).run_execute(
            database.to_string(),
            Some(store.to_string()),
            sql.into(),
            params,
        );
        self.schedule_claimed(database, task)?.wait().await
    }

    /// Runs a read statement and returns its rows.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Open`] when the connection cannot be opened
    /// or [`LifecycleError::Query`] when the read fails.
    pub async fn query(
        &self,
        database: &str,
        sql: impl Into<String> + Send,
        params: Vec<SqlValue>,
    ) -> Result<Vec<SqlRow>, LifecycleError> {
        let task = Arc::clone(&self.inner).run_query(database.to_string(), None, sql.into(), params);
        self.schedule_claimed(database, task)?.wait().await
    }

    /// Ensures the table backing `store` and runs a read statement, as one
    /// queued task.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidName`] for an unusable store name,
    /// [`LifecycleError::TableCreation`] when the table cannot be created, or
    /// any error [`LifecycleManager::query`] returns.
    pub async fn query_in_store(
        &self,
        database: &str,
        store: &str,
        sql: impl Into<String> + Send,
        params: Vec<SqlValue>,
    ) -> Result<Vec<SqlRow>, LifecycleError> {
        quote_identifier(store)?;
        let task = Arc::clone(&self.inner).run_query(
            database.to_string(),
            Some(store.to_string()),
            sql.into(),
            params,
        );
        self.schedule_claimed(database, task)?.wait().await
    }

    /// Checks for the table backing `store` and creates it when absent.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidName`] for an unusable store name, or
    /// the existence check's own error.
    pub(crate) async fn ensure_table(
        &self,
        database: &str,
        store: &str,
    ) -> Result<bool, LifecycleError> {
        quote_identifier(store)?;
        let task = Arc::clone(&self.inner).run_ensure(database.to_string(), store.to_string());
        self.schedule_claimed(database, task)?.wait().await
    }

    /// Closes and destroys `database` behind every statement already queued.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Drop`] when the engine cannot destroy it.
    pub async fn drop_database(&self, database: &str) -> Result<(), LifecycleError> {
        let inner = Arc::clone(&self.inner);
        let target = database.to_string();
        self.inner
            .queue
            .schedule(database, async move { inner.registry.drop_database(&target).await })?
            .wait()
            .await
    }

    /// Runs an arbitrary task in `database`'s queue, after every task queued
    /// before it.
    ///
    /// # Errors
    ///
    /// Returns the task's error, or [`LifecycleError::Queue`] when the task
    /// could not be scheduled or never settled.
    pub async fn enqueue<T, F>(&self, database: &str, task: F) -> Result<T, LifecycleError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, LifecycleError>> + Send + 'static,
    {
        self.inner.queue.schedule(database, task)?.wait().await
    }

    /// Keeps `database`'s connection open until the hold is released.
    #[must_use]
    pub fn hold(&self, database: &str) -> ConnectionHold<E> {
        self.inner.registry.claim(database);
        ConnectionHold {
            database: database.to_string(),
            inner: Some(Arc::clone(&self.inner)),
        }
    }

    /// Returns true when `database` currently has an open connection.
    #[must_use]
    pub fn is_open(&self, database: &str) -> bool {
        self.inner.registry.is_open(database)
    }

    /// Returns a snapshot of lifecycle counters.
    #[must_use]
    pub fn stats(&self) -> LifecycleStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Claims `database` and queues `task`, undoing the claim if scheduling fails.
    fn schedule_claimed<T, F>(&self, database: &str, task: F) -> Result<Pending<T>, LifecycleError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, LifecycleError>> + Send + 'static,
    {
        self.inner.registry.claim(database);
        self.inner.queue.schedule(database, task).inspect_err(|_| {
            self.inner.registry.unclaim_now(database);
        })
    }
}

impl<E: SqlEngine> ManagerInner<E> {
    /// Queued body of [`LifecycleManager::execute`] and
    /// [`LifecycleManager::execute_in_store`].
    async fn run_execute(
        self: Arc<Self>,
        database: String,
        store: Option<String>,
        sql: String,
        params: Vec<SqlValue>,
    ) -> Result<usize, LifecycleError> {
        let target = database.clone();
        self.with_token(database, move |inner, connection| async move {
            if let Some(store) = store {
                inner.require_table(&connection, &target, &store).await?;
            }
            inner.transact(&connection, &sql, &params).await
        })
        .await
    }

    /// Queued body of [`LifecycleManager::query`] and
    /// [`LifecycleManager::query_in_store`].
    async fn run_query(
        self: Arc<Self>,
        database: String,
        store: Option<String>,
        sql: String,
        params: Vec<SqlValue>,
    ) -> Result<Vec<SqlRow>, LifecycleError> {
        let target = database.clone();
        self.with_token(database, move |inner, connection| async move {
            if let Some(store) = store {
                inner.require_table(&connection, &target, &store).await?;
            }
            inner.select(&connection, &sql, &params).await
        })
        .await
    }

    /// Queued body of [`LifecycleManager::ensure_table`].
    async fn run_ensure(
        self: Arc<Self>,
        database: String,
        store: String,
    ) -> Result<bool, LifecycleError> {
        let target = database.clone();
        self.with_token(database, move |inner, connection| async move {
            inner.ensure_table_on(&connection, &target, &store).await
        })
        .await
    }

    /// Acquires a token, runs `work` in its own task, and always releases.
    ///
    /// A panic inside `work` is rolled back (when a transaction is open) and
    /// reported as [`LifecycleError::Execution`].
    async fn with_token<T, W, Fut>(
        self: Arc<Self>,
        database: String,
        work: W,
    ) -> Result<T, LifecycleError>
    where
        T: Send + 'static,
        W: FnOnce(Arc<Self>, E::Connection) -> Fut,
        Fut: Future<Output = Result<T, LifecycleError>> + Send + 'static,
    {
        let token = self.registry.acquire(&database).await?;
        let outcome = tokio::spawn(work(Arc::clone(&self), token.connection().clone())).await;
        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                warn!(database = %database, error = %err, "sqlite statement panicked");
                match self.engine.rollback(token.connection()).await {
                    Ok(()) => self.stats.record(LifecycleEvent::RolledBack),
                    Err(rollback) => {
                        debug!(database = %database, error = %rollback, "no transaction to roll back");
                    }
                }
                Err(LifecycleError::Execution(format!("statement for {database} panicked")))
            }
        };
        self.registry.release(token).await;
        result
    }

    /// Runs a read statement, recording the outcome.
    async fn select(
        &self,
        connection: &E::Connection,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<SqlRow>, LifecycleError> {
        let result = self
            .engine
            .select(connection, sql, params)
            .await
            .map_err(|err| LifecycleError::Query(err.to_string()));
        self.stats.record(if result.is_ok() {
            LifecycleEvent::Queried
        } else {
            LifecycleEvent::QueryFailed
        });
        result
    }

    /// Checks for `store`'s table and creates it when absent.
    ///
    /// Returns `Ok(false)` only when creation was attempted and failed.
    async fn ensure_table_on(
        &self,
        connection: &E::Connection,
        database: &str,
        store: &str,
    ) -> Result<bool, LifecycleError> {
        let table = quote_identifier(store)?;
        let rows =
            self.select(connection, TABLE_EXISTS_SQL, &[SqlValue::Text(store.to_string())]).await?;
        if !rows.is_empty() {
            return Ok(true);
        }
        match self.transact(connection, &create_table_sql(&table), &[]).await {
            Ok(_) => {
                debug!(database, store, "store table created");
                Ok(true)
            }
            Err(err) => {
                warn!(database, store, error = %err, "store table creation failed");
                Ok(false)
            }
        }
    }

    /// Ensures `store`'s table, failing when it cannot be created.
    async fn require_table(
        &self,
        connection: &E::Connection,
        database: &str,
        store: &str,
    ) -> Result<(), LifecycleError> {
        if self.ensure_table_on(connection, database, store).await? {
            return Ok(());
        }
        Err(LifecycleError::TableCreation {
            store: store.to_string(),
            message: format!("could not create table in {database}"),
        })
    }

    /// Runs one statement between `BEGIN` and `COMMIT`, rolling back on failure.
    async fn transact(
        &self,
        connection: &E::Connection,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<usize, LifecycleError> {
        self.engine.begin(connection).await.map_err(|err| LifecycleError::Transaction {
            operation: "begin",
            message: err.to_string(),
        })?;
        let outcome = match self.engine.execute(connection, sql, params).await {
            Ok(Some(rows)) => self.engine.commit(connection).await.map(|()| rows).map_err(|err| {
                LifecycleError::Transaction {
                    operation: "commit",
                    message: err.to_string(),
                }
            }),
            Ok(None) => {
                Err(LifecycleError::Execution("statement completed without a result".to_string()))
            }
            Err(err) => Err(LifecycleError::Execution(err.to_string())),
        };
        match outcome {
            Ok(rows) => {
                self.stats.record(LifecycleEvent::Committed);
                Ok(rows)
            }
            Err(error) => {
                if let Err(rollback) = self.engine.rollback(connection).await {
                    warn!(error = %rollback, "sqlite rollback failed");
                }
                self.stats.record(LifecycleEvent::RolledBack);
                Err(error)
            }
        }
    }
}

// ============================================================================
// SECTION: Holds
// ============================================================================

/// Claim that keeps a database's connection open across statements.
///
/// # Invariants
/// - Released exactly once, explicitly or on drop.
pub struct ConnectionHold<E: SqlEngine> {
    /// Held database name.
    database: String,
    /// Manager state; `None` once released.
    inner: Option<Arc<ManagerInner<E>>>,
}

impl<E: SqlEngine> ConnectionHold<E> {
    /// Returns the held database name.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Releases the hold behind every statement already queued, closing the
    /// connection when nothing else needs it.
    pub async fn release(mut self) {
        let Some(inner) = self.inner.take() else {
            return;
        };
        let database = std::mem::take(&mut self.database);
        let task_inner = Arc::clone(&inner);
        let target = database.clone();
        let scheduled = inner.queue.schedule(&database, async move {
            task_inner.registry.unclaim(&target).await;
            Ok::<(), LifecycleError>(())
        });
        match scheduled {
            Ok(pending) => {
                if let Err(err) = pending.wait().await {
                    warn!(database = %database, error = %err, "connection hold release failed");
                }
            }
            Err(_) => inner.registry.unclaim_now(&database),
        }
    }
}

impl<E: SqlEngine> Drop for ConnectionHold<E> {
    fn drop(&mut self) {
        let Some(inner) = self.inner.take() else {
            return;
        };
        let database = std::mem::take(&mut self.database);
        let task_inner = Arc::clone(&inner);
        let target = database.clone();
        let submitted = inner.queue.submit(
            &database,
            Box::pin(async move { task_inner.registry.unclaim(&target).await }),
        );
        if submitted.is_err() {
            inner.registry.unclaim_now(&database);
        }
    }
}
