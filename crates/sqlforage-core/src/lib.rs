// crates/sqlforage-core/src/lib.rs
// ============================================================================
// Module: sqlforage Core Library
// Description: Storage-neutral key-value contracts and driver selection.
// Purpose: Define the surface every storage backend implements.
// Dependencies: async-trait, serde, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! `sqlforage-core` defines the key-value persistence surface shared by every
//! backend: [`KeyValueStore`] for per-store CRUD, [`StorageDriver`] for
//! capability probing and store initialization, and [`Forage`], which selects
//! the first supported driver from a preference list and dispatches to it.
//! The crate also ships [`NamespacedDriver`], a flat namespaced-key backend
//! used when no SQL engine is available.
//! Invariants:
//! - Keys are normalized to strings before reaching any backend.
//! - A missing key reads back as `None`; a stored JSON `null` reads back as
//!   `Some(Value::Null)`.
//! - Store names reaching a backend are sanitized identifiers.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod error;
pub mod forage;
pub mod interfaces;
pub mod key;
pub mod namespaced;
pub mod options;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use error::StoreError;
pub use forage::Forage;
pub use forage::ForageBuilder;
pub use interfaces::IterationVisitor;
pub use interfaces::KeyValueStore;
pub use interfaces::StorageDriver;
pub use key::StoreKey;
pub use namespaced::NAMESPACED_DRIVER_NAME;
pub use namespaced::NamespacedDriver;
pub use namespaced::SharedKeySpace;
pub use options::DEFAULT_DATABASE_NAME;
pub use options::DEFAULT_STORE_NAME;
pub use options::MAX_NAME_LENGTH;
pub use options::StoreOptions;
pub use options::sanitize_store_name;
pub use options::validate_database_name;
