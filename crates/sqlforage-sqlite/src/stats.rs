// crates/sqlforage-sqlite/src/stats.rs
// ============================================================================
// Module: Lifecycle Stats
// Description: Counters for connection, transaction, and queue activity.
// Purpose: Let callers and tests observe open/close and commit/rollback counts.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Counters are updated by the registry, queue, and lifecycle manager and
//! read through [`LifecycleStatsSnapshot`].

use std::sync::Mutex;
use std::sync::PoisonError;

use serde::Deserialize;
use serde::Serialize;

/// Snapshot of lifecycle counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleStatsSnapshot {
    /// Native connections opened.
    pub connections_opened: u64,
    /// Native connections closed successfully.
    pub connections_closed: u64,
    /// Close attempts that failed and were logged.
    pub close_failures: u64,
    /// Transactions committed.
    pub committed: u64,
    /// Transactions rolled back.
    pub rolled_back: u64,
    /// Read queries that succeeded.
    pub queries: u64,
    /// Read queries that failed.
    pub query_failures: u64,
    /// Tasks accepted by the task queue.
    pub tasks_enqueued: u64,
    /// Tasks that settled (success, failure, or panic).
    pub tasks_completed: u64,
}

/// Counter event recorded by lifecycle components.
#[derive(Debug, Clone, Copy)]
pub(crate) enum LifecycleEvent {
    /// Connection opened.
    Opened,
    /// Connection closed.
    Closed,
    /// Connection close failed.
    CloseFailed,
    /// Transaction committed.
    Committed,
    /// Transaction rolled back.
    RolledBack,
    /// Query succeeded.
    Queried,
    /// Query failed.
    QueryFailed,
    /// Task enqueued.
    Enqueued,
    /// Task settled.
    Completed,
}

/// Shared mutable counters.
#[derive(Debug, Default)]
pub(crate) struct LifecycleStats {
    /// Current counter values.
    counters: Mutex<LifecycleStatsSnapshot>,
}

impl LifecycleStats {
    /// Records one event.
    pub(crate) fn record(&self, event: LifecycleEvent) {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = match event {
            LifecycleEvent::Opened => &mut counters.connections_opened,
            LifecycleEvent::Closed => &mut counters.connections_closed,
            LifecycleEvent::CloseFailed => &mut counters.close_failures,
            LifecycleEvent::Committed => &mut counters.committed,
            LifecycleEvent::RolledBack => &mut counters.rolled_back,
            LifecycleEvent::Queried => &mut counters.queries,
            LifecycleEvent::QueryFailed => &mut counters.query_failures,
            LifecycleEvent::Enqueued => &mut counters.tasks_enqueued,
            LifecycleEvent::Completed => &mut counters.tasks_completed,
        };
        *slot = slot.saturating_add(1);
    }

    /// Returns the current counter values.
    pub(crate) fn snapshot(&self) -> LifecycleStatsSnapshot {
        *self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
