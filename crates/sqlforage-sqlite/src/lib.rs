// crates/sqlforage-sqlite/src/lib.rs
// ============================================================================
// Module: sqlforage SQLite Library
// Description: Connection lifecycle layer and SQLite key-value driver.
// Purpose: Serialize statements per database over lazily opened connections.
// Dependencies: async-trait, rusqlite, serde, serde_json, sqlforage-core,
//               thiserror, tokio, tracing
// ============================================================================

//! ## Overview
//! This crate implements key-value storage over an embedded SQL engine.
//! The [`LifecycleManager`] opens a database's connection on first use, runs
//! every statement through a per-database FIFO queue, wraps mutations in
//! explicit transactions with rollback on failure, and closes the
//! connection once nothing depends on it. [`SqliteDriver`] exposes that
//! layer as a [`sqlforage_core::StorageDriver`].
//! Invariants:
//! - Native connections are owned by the registry; callers never see them.
//! - Every queued statement settles, successfully or with an error.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod bootstrap;
pub mod engine;
pub mod error;
pub mod kv;
pub mod lifecycle;
mod queue;
mod registry;
pub mod sqlite_engine;
mod stats;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use bootstrap::ensure_store;
pub use bootstrap::quote_identifier;
pub use bootstrap::require_store;
pub use engine::EngineError;
pub use engine::SqlEngine;
pub use engine::SqlRow;
pub use engine::SqlValue;
pub use error::LifecycleError;
pub use kv::SQLITE_DRIVER_NAME;
pub use kv::SqliteDriver;
pub use kv::SqliteKvStore;
pub use lifecycle::ConnectionHold;
pub use lifecycle::LifecycleManager;
pub use sqlite_engine::SqliteConnection;
pub use sqlite_engine::SqliteEngine;
pub use sqlite_engine::SqliteEngineConfig;
pub use sqlite_engine::SqliteJournalMode;
pub use sqlite_engine::SqliteSyncMode;
pub use stats::LifecycleStatsSnapshot;
