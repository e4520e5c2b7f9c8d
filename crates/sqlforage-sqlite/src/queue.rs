// crates/sqlforage-sqlite/src/queue.rs
// ============================================================================
// Module: Task Queue
// Description: Per-database FIFO serializer for engine operations.
// Purpose: Run operations against one database strictly one at a time.
// Dependencies: tokio, tracing
// ============================================================================

//! ## Overview
//! Each database name gets its own lane: an unbounded channel drained by a
//! single worker task. The worker runs one queued task to completion before
//! dequeuing the next, so tasks execute in submission order and never
//! overlap. Each task runs inside its own spawned task so that a panic only
//! settles that task's caller with an error and the lane moves on.
//! Lanes for different databases run independently. A lane whose channel
//! is empty retires itself, so idle database names hold no worker task and
//! no map entry.
//! Invariants:
//! - Tasks on one lane run one at a time, in enqueue order.
//! - Senders are used and lanes retire only under the `lanes` lock, so a
//!   task is never sent to a lane that has already decided to exit.
//! - Every accepted task settles its [`Pending`] handle exactly once.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Instant;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::error::LifecycleError;
use crate::stats::LifecycleEvent;
use crate::stats::LifecycleStats;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Type-erased queued work.
pub(crate) type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Work item travelling through a lane.
struct QueuedTask {
    /// Submission sequence number (monotonic across lanes).
    sequence: u64,
    /// Submission time.
    enqueued_at: Instant,
    /// Work to run.
    job: Job,
}

/// Handle to the result of a queued task.
///
/// # Invariants
/// - Resolves exactly once; a task that panicked or was dropped resolves
///   with [`LifecycleError::Queue`].
pub(crate) struct Pending<T> {
    /// Database the task was queued against.
    database: String,
    /// Receives the task outcome.
    receiver: oneshot::Receiver<Result<T, LifecycleError>>,
}

impl<T> Pending<T> {
    /// Waits for the queued task to settle.
    ///
    /// # Errors
    ///
    /// Returns the task's own error, or [`LifecycleError::Queue`] when the
    /// task never settled.
    pub(crate) async fn wait(self) -> Result<T, LifecycleError> {
        let Self {
            database,
            receiver,
        } = self;
        receiver.await.map_err(|_| {
            LifecycleError::Queue(format!("queued task for {database} aborted before settling"))
        })?
    }
}

/// Lane senders keyed by database name.
type Lanes = Arc<Mutex<HashMap<String, UnboundedSender<QueuedTask>>>>;

/// Per-database FIFO task queue.
pub(crate) struct TaskQueue {
    /// Senders of the lanes currently running.
    lanes: Lanes,
    /// Next submission sequence number.
    sequence: AtomicU64,
    /// Shared lifecycle counters.
    stats: Arc<LifecycleStats>,
}

// ============================================================================
// SECTION: Queue
// ============================================================================

impl TaskQueue {
    /// Creates a queue with no lanes.
    pub(crate) fn new(stats: Arc<LifecycleStats>) -> Self {
        Self {
            lanes: Arc::new(Mutex::new(HashMap::new())),
            sequence: AtomicU64::new(1),
            stats,
        }
    }

    /// Queues `task` behind every task already queued for `database`.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Queue`] when no runtime is available.
    pub(crate) fn schedule<T, F>(&self, database: &str, task: F) -> Result<Pending<T>, LifecycleError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, LifecycleError>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        self.submit(
            database,
            Box::pin(async move {
                let _ = sender.send(task.await);
            }),
        )?;
        Ok(Pending {
            database: database.to_string(),
            receiver,
        })
    }

    /// Queues a job whose outcome nobody waits for.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Queue`] when no runtime is available.
    pub(crate) fn submit(&self, database: &str, job: Job) -> Result<(), LifecycleError> {
        let handle = Handle::try_current()
            .map_err(|_| LifecycleError::Queue("no async runtime available".to_string()))?;
        let mut task = QueuedTask {
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            enqueued_at: Instant::now(),
            job,
        };
        let mut lanes = lock_lanes(&self.lanes);
        if let Some(sender) = lanes.get(database) {
            match sender.send(task) {
                Ok(()) => {
                    self.stats.record(LifecycleEvent::Enqueued);
                    return Ok(());
                }
                Err(mpsc::error::SendError(returned)) => task = returned,
            }
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        sender
            .send(task)
            .map_err(|_| LifecycleError::Queue(format!("lane for {database} closed")))?;
        handle.spawn(run_lane(
            database.to_string(),
            receiver,
            Arc::clone(&self.lanes),
            handle.clone(),
            Arc::clone(&self.stats),
        ));
        debug!(database, "task queue lane started");
        lanes.insert(database.to_string(), sender);
        self.stats.record(LifecycleEvent::Enqueued);
        Ok(())
    }
}

/// Drains one lane, running each task to completion before the next, and
/// retires the lane once its channel is empty.
async fn run_lane(
    database: String,
    mut receiver: UnboundedReceiver<QueuedTask>,
    lanes: Lanes,
    handle: Handle,
    stats: Arc<LifecycleStats>,
) {
    loop {
        let task = {
            let mut lanes = lock_lanes(&lanes);
            if let Ok(task) = receiver.try_recv() {
                task
            } else {
                lanes.remove(&database);
                debug!(database = %database, "task queue lane retired");
                return;
            }
        };
        let QueuedTask {
            sequence,
            enqueued_at,
            job,
        } = task;
        let waited_us = u64::try_from(enqueued_at.elapsed().as_micros()).unwrap_or(u64::MAX);
        trace!(database = %database, sequence, waited_us, "running queued task");
        if let Err(err) = handle.spawn(job).await {
            warn!(database = %database, sequence, error = %err, "queued task panicked");
        }
        stats.record(LifecycleEvent::Completed);
    }
}

/// Acquires the lane map, recovering from poisoning.
fn lock_lanes(lanes: &Lanes) -> MutexGuard<'_, HashMap<String, UnboundedSender<QueuedTask>>> {
    lanes.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
impl TaskQueue {
    /// Returns the number of running lanes.
    fn lane_count(&self) -> usize {
        lock_lanes(&self.lanes).len()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        reason = "Test-only assertions are permitted."
    )]

    use std::sync::Arc;

    use super::TaskQueue;
    use crate::error::LifecycleError;
    use crate::stats::LifecycleStats;

    #[test]
    fn scheduling_without_runtime_fails() {
        let queue = TaskQueue::new(Arc::new(LifecycleStats::default()));
        let result = queue.schedule("db1", async { Ok::<_, LifecycleError>(()) });
        assert!(matches!(result, Err(LifecycleError::Queue(_))));
    }

    #[tokio::test]
    async fn panicking_task_settles_with_queue_error() {
        let stats = Arc::new(LifecycleStats::default());
        let queue = TaskQueue::new(Arc::clone(&stats));
        let failing = queue
            .schedule("db1", async {
                let explode = true;
                if explode {
                    panic!("boom");
                }
                Ok::<u8, LifecycleError>(0)
            })
            .unwrap();
        let next = queue.schedule("db1", async { Ok::<u8, LifecycleError>(7) }).unwrap();
        assert!(matches!(failing.wait().await, Err(LifecycleError::Queue(_))));
        assert_eq!(next.wait().await.unwrap(), 7);
        assert_eq!(stats.snapshot().tasks_enqueued, 2);
    }

    #[tokio::test]
    async fn finished_lanes_are_retired() {
        let queue = TaskQueue::new(Arc::new(LifecycleStats::default()));
        let mut pending = Vec::new();
        for index in 0 .. 200 {
            let database = format!("db{index}");
            pending.push(queue.schedule(&database, async { Ok::<(), LifecycleError>(()) }).unwrap());
        }
        assert_eq!(queue.lane_count(), 200);
        for task in pending {
            task.wait().await.unwrap();
        }
        for _ in 0 .. 100 {
            if queue.lane_count() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(queue.lane_count(), 0);

        let reopened = queue.schedule("db0", async { Ok::<u8, LifecycleError>(3) }).unwrap();
        assert_eq!(reopened.wait().await.unwrap(), 3);
    }
}
