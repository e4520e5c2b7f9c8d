// crates/sqlforage-sqlite/src/registry.rs
// ============================================================================
// Module: Connection Registry
// Description: Per-database connection state and reference counting.
// Purpose: Open connections lazily and close them when the last user leaves.
// Dependencies: tracing
// ============================================================================

//! ## Overview
//! The registry owns every native connection. Each database entry counts
//! `claims` (statements submitted but not yet running, plus explicit holds)
//! and `tokens` (statements currently running). The connection opens when a
//! claim is converted into the first token and closes once both counts reach
//! zero. Callers only ever see opaque [`ConnectionToken`]s.
//! Invariants:
//! - A database entry holds at most one open connection.
//! - A connection is open only while `claims + tokens > 0`, or while a drop
//!   is tearing it down.
//! - Entries for never-seen names start at zero.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use tracing::debug;
use tracing::warn;

use crate::engine::SqlEngine;
use crate::error::LifecycleError;
use crate::stats::LifecycleEvent;
use crate::stats::LifecycleStats;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Bookkeeping for one database name.
struct DatabaseEntry<C> {
    /// Open native connection, if any.
    connection: Option<C>,
    /// Outstanding claims not yet converted into tokens.
    claims: usize,
    /// Tokens currently held by running statements.
    tokens: usize,
}

impl<C> Default for DatabaseEntry<C> {
    fn default() -> Self {
        Self {
            connection: None,
            claims: 0,
            tokens: 0,
        }
    }
}

impl<C> DatabaseEntry<C> {
    /// Returns true when nothing depends on the entry anymore.
    const fn is_idle(&self) -> bool {
        self.claims == 0 && self.tokens == 0
    }
}

/// Opaque claim on an open connection held by a running statement.
///
/// # Invariants
/// - Must be handed back through [`ConnectionRegistry::release`].
pub(crate) struct ConnectionToken<C> {
    /// Database the token belongs to.
    database: String,
    /// Shared handle to the open connection.
    connection: C,
}

impl<C> ConnectionToken<C> {
    /// Returns the connection the token grants access to.
    pub(crate) const fn connection(&self) -> &C {
        &self.connection
    }
}

/// Registry of open connections keyed by database name.
pub(crate) struct ConnectionRegistry<E: SqlEngine> {
    /// Native engine used to open and close connections.
    engine: Arc<E>,
    /// Entries keyed by database name.
    entries: Mutex<HashMap<String, DatabaseEntry<E::Connection>>>,
    /// Shared lifecycle counters.
    stats: Arc<LifecycleStats>,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

impl<E: SqlEngine> ConnectionRegistry<E> {
    /// Creates an empty registry.
    pub(crate) fn new(engine: Arc<E>, stats: Arc<LifecycleStats>) -> Self {
        Self {
            engine,
            entries: Mutex::new(HashMap::new()),
            stats,
        }
    }

    /// Registers intent to use `database` without opening anything yet.
    pub(crate) fn claim(&self, database: &str) {
        let mut entries = self.lock();
        let entry = entries.entry(database.to_string()).or_default();
        entry.claims += 1;
    }

    /// Converts one claim into a token, opening the connection if needed.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Open`] when the native open fails; the claim
    /// is consumed and no token is issued.
    pub(crate) async fn acquire(
        &self,
        database: &str,
    ) -> Result<ConnectionToken<E::Connection>, LifecycleError> {
        let existing = {
            let mut entries = self.lock();
            let entry = entries.entry(database.to_string()).or_default();
            entry.claims = entry.claims.saturating_sub(1);
            entry.connection.clone()
        };
        let connection = match existing {
            Some(connection) => connection,
            None => match self.engine.open(database).await {
                Ok(connection) => {
                    self.stats.record(LifecycleEvent::Opened);
                    debug!(database, "sqlite connection opened");
                    connection
                }
                Err(err) => {
                    self.evict_if_unused(database);
                    return Err(LifecycleError::Open {
                        database: database.to_string(),
                        message: err.to_string(),
                    });
                }
            },
        };
        {
            let mut entries = self.lock();
            let entry = entries.entry(database.to_string()).or_default();
            if entry.connection.is_none() {
                entry.connection = Some(connection.clone());
            }
            entry.tokens += 1;
        }
        Ok(ConnectionToken {
            database: database.to_string(),
            connection,
        })
    }

    /// Hands a token back, closing the connection when nothing else needs it.
    pub(crate) async fn release(&self, token: ConnectionToken<E::Connection>) {
        let ConnectionToken {
            database,
            connection,
        } = token;
        drop(connection);
        let idle = {
            let mut entries = self.lock();
            if let Some(entry) = entries.get_mut(&database) {
                entry.tokens = entry.tokens.saturating_sub(1);
            }
            take_if_idle(&mut entries, &database)
        };
        if let Some(connection) = idle {
            self.close_connection(&database, connection).await;
        }
    }

    /// Drops a claim that will never be converted into a token.
    pub(crate) async fn unclaim(&self, database: &str) {
        let idle = {
            let mut entries = self.lock();
            if let Some(entry) = entries.get_mut(database) {
                entry.claims = entry.claims.saturating_sub(1);
            }
            take_if_idle(&mut entries, database)
        };
        if let Some(connection) = idle {
            self.close_connection(database, connection).await;
        }
    }

    /// Drops a claim outside of any runtime.
    ///
    /// An idle connection found here cannot be closed asynchronously, so its
    /// handle is dropped instead and counted as a close failure.
    pub(crate) fn unclaim_now(&self, database: &str) {
        let idle = {
            let mut entries = self.lock();
            if let Some(entry) = entries.get_mut(database) {
                entry.claims = entry.claims.saturating_sub(1);
            }
            take_if_idle(&mut entries, database)
        };
        if idle.is_some() {
            self.stats.record(LifecycleEvent::CloseFailed);
            warn!(database, "sqlite connection released without a runtime; handle dropped");
        }
    }

    /// Closes and forgets `database`, then destroys its persisted data.
    ///
    /// Outstanding claims keep the entry alive without a connection; their
    /// statements reopen a fresh database.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Drop`] when the engine cannot destroy the
    /// database.
    pub(crate) async fn drop_database(&self, database: &str) -> Result<(), LifecycleError> {
        let connection = {
            let mut entries = self.lock();
            let connection = entries.get_mut(database).and_then(|entry| entry.connection.take());
            if entries.get(database).is_some_and(DatabaseEntry::is_idle) {
                entries.remove(database);
            }
            connection
        };
        if let Some(connection) = connection {
            self.close_connection(database, connection).await;
        }
        self.engine.destroy(database).await.map_err(|err| LifecycleError::Drop {
            database: database.to_string(),
            message: err.to_string(),
        })?;
        debug!(database, "sqlite database destroyed");
        Ok(())
    }

    /// Returns true when `database` currently has an open connection.
    pub(crate) fn is_open(&self, database: &str) -> bool {
        self.lock().get(database).is_some_and(|entry| entry.connection.is_some())
    }

    /// Closes a connection, logging failures instead of returning them.
    async fn close_connection(&self, database: &str, connection: E::Connection) {
        match self.engine.close(connection).await {
            Ok(()) => {
                self.stats.record(LifecycleEvent::Closed);
                debug!(database, "sqlite connection closed");
            }
            Err(err) => {
                self.stats.record(LifecycleEvent::CloseFailed);
                let error = LifecycleError::Close {
                    database: database.to_string(),
                    message: err.to_string(),
                };
                warn!(database, error = %error, "sqlite connection close failed");
            }
        }
    }

    /// Removes an entry that has neither users nor a connection.
    fn evict_if_unused(&self, database: &str) {
        let mut entries = self.lock();
        if entries.get(database).is_some_and(|entry| entry.is_idle() && entry.connection.is_none())
        {
            entries.remove(database);
        }
    }

    /// Acquires the entry map, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, DatabaseEntry<E::Connection>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes an idle entry and returns its connection for closing.
fn take_if_idle<C>(entries: &mut HashMap<String, DatabaseEntry<C>>, database: &str) -> Option<C> {
    if !entries.get(database).is_some_and(DatabaseEntry::is_idle) {
        return None;
    }
    entries.remove(database).and_then(|entry| entry.connection)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
