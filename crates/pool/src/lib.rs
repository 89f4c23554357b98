// SPDX-License-Identifier: MIT
//! Dynamic, one-shot-worker thread pool.
//!
//! This is a Rust realization of `thread_pool_dynamic.c`: `dispatch` spawns
//! a fresh `std::thread` per task rather than drawing from a fixed set of
//! workers, and a finished worker migrates itself from a live-worker deque
//! into a cleanup deque (both guarded by the same lock) so that some later
//! caller — the next `dispatch`, or [`Pool::shutdown`] — can `join` it
//! without blocking the worker on its own exit.
//!
//! One-shot spawning is the right tradeoff here because connection rate is
//! bounded by how fast clients show up, not by the cost of a `clone(2)`;
//! see the module-level contract for the ordering obligations this buys.

#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use aesd_queue::{Deque, NodeHandle, QueueError};
use parking_lot::Mutex;
use thiserror::Error;

/// Errors produced by pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("pool bookkeeping error: {0}")]
    Queue(#[from] QueueError),
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("pool is shutting down, refusing new work")]
    ShuttingDown,
}

/// Holds the `JoinHandle` for a dispatched worker once it exists.
///
/// The handle is pushed into the live-worker deque *before* the thread is
/// spawned (so the node's handle can be captured by the closure for
/// self-removal later), and filled in immediately after `thread::spawn`
/// returns — both steps happen while the caller of `dispatch` still holds
/// the pool lock, so a worker racing to finish before the slot is filled
/// would simply block on that same lock first.
struct WorkerSlot {
    handle: Mutex<Option<JoinHandle<()>>>,
}

struct PoolState {
    live: Deque<Arc<WorkerSlot>>,
    cleanup: Deque<Arc<WorkerSlot>>,
    kill: bool,
}

/// A dynamic thread pool: one OS thread per dispatched task.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<Mutex<PoolState>>,
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

impl Pool {
    /// Creates an empty pool with no live or finished workers.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(PoolState {
                live: Deque::new(),
                cleanup: Deque::new(),
                kill: false,
            })),
        }
    }

    /// Number of workers currently executing (not yet finished).
    pub fn live_count(&self) -> usize {
        self.inner.lock().live.len()
    }

    /// Opportunistically joins and drains everything currently sitting in
    /// the cleanup deque, under the pool lock. This is the same drain
    /// [`Pool::dispatch`] runs after spawning a new worker, exposed here
    /// so a long-lived caller with no reason to dispatch anything new —
    /// the timestamp ticker — can still reap finished workers on its own
    /// cadence instead of letting them pile up until the next dispatch or
    /// shutdown.
    pub fn reap(&self) {
        let mut state = self.inner.lock();
        drain_locked(&mut state.cleanup);
    }

    /// Spawns a worker thread to run `f`, tracking it in the live-worker
    /// deque until it finishes, at which point it migrates itself into the
    /// cleanup deque. Before returning, opportunistically joins (and
    /// removes) anything already sitting in the cleanup deque.
    pub fn dispatch<F>(&self, f: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.inner.lock();
        if state.kill {
            return Err(PoolError::ShuttingDown);
        }

        let slot = Arc::new(WorkerSlot { handle: Mutex::new(None) });
        let self_handle = state.live.push_back(Arc::clone(&slot))?;

        let inner = Arc::clone(&self.inner);
        let join_handle = thread::Builder::new()
            .spawn(move || {
                let _guard = SelfCleanupGuard { inner, self_handle };
                f();
            })
            .map_err(PoolError::Spawn)?;

        *slot.handle.lock() = Some(join_handle);

        // Safe to join while still holding the lock: every entry in
        // `cleanup` was placed there by a worker that already acquired and
        // released this same lock to migrate itself, so it will never try
        // to lock it again before actually exiting.
        drain_locked(&mut state.cleanup);

        Ok(())
    }

    /// Sets the kill flag, then joins every worker still in the live
    /// deque followed by every worker already in the cleanup deque,
    /// tearing the pool down. Workers observe the kill flag on their next
    /// finish and skip self-migration once it is set, so after this call
    /// both deques are empty.
    ///
    /// Must only be called once no further `dispatch` calls will occur
    /// (the acceptor loop that drives dispatch has already stopped).
    pub fn shutdown(&self) {
        {
            let mut state = self.inner.lock();
            state.kill = true;
        }

        // Joins happen with the lock released: a live worker may still be
        // mid-task and will try to acquire the lock itself once it
        // finishes (to observe the now-set kill flag), so holding the lock
        // across its join here would deadlock.
        drain_unlocked(&self.inner, Deques::Live);
        drain_unlocked(&self.inner, Deques::Cleanup);
    }
}

enum Deques {
    Live,
    Cleanup,
}

fn drain_unlocked(inner: &Arc<Mutex<PoolState>>, which: Deques) {
    loop {
        let slot = {
            let mut state = inner.lock();
            let deque = match which {
                Deques::Live => &mut state.live,
                Deques::Cleanup => &mut state.cleanup,
            };
            match deque.pop_front() {
                Ok(slot) => slot,
                Err(_) => break,
            }
        };
        join_slot(&slot);
    }
}

/// Joins and pops every worker in `cleanup`. Caller already holds the pool
/// lock; see [`Pool::dispatch`] for why that is safe here.
fn drain_locked(cleanup: &mut Deque<Arc<WorkerSlot>>) {
    while let Ok(slot) = cleanup.pop_front() {
        join_slot(&slot);
    }
}

fn join_slot(slot: &Arc<WorkerSlot>) {
    let handle = slot.handle.lock().take();
    match handle {
        Some(handle) => {
            if handle.join().is_err() {
                tracing::warn!("pool worker thread panicked");
            }
        }
        None => tracing::error!("pool worker slot was joined before its thread handle was set"),
    }
}

/// Drop guard run at the end of every dispatched task, on normal return or
/// panic-unwind alike — the Rust analogue of the original's
/// `pthread_cleanup_push(free, task)` scope.
struct SelfCleanupGuard {
    inner: Arc<Mutex<PoolState>>,
    self_handle: NodeHandle,
}

impl Drop for SelfCleanupGuard {
    fn drop(&mut self) {
        let mut state = self.inner.lock();
        if state.kill {
            // Destroyer owns this worker's entry now; do not touch either deque.
            return;
        }
        match state.live.delete(self.self_handle) {
            Ok(slot) => {
                if let Err(e) = state.cleanup.push_back(slot) {
                    tracing::error!("worker failed to enqueue for cleanup: {e}");
                }
            }
            Err(e) => tracing::error!("worker failed to remove itself from live queue: {e}"),
        }
    }
}
