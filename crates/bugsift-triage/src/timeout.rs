//! Deadline wrapper for slow collaborator calls.
//!
//! Work runs on a helper thread; the caller waits at most its limit. A
//! helper that misses its deadline cannot be cancelled, so it is detached
//! and counted as stalled until it finally returns. Once `max_stalled`
//! helpers are stuck, new calls are refused instead of spawning more.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use tracing::warn;

/// Why a deadline-bound call produced no value.
#[derive(Debug, thiserror::Error)]
pub enum DeadlineError {
    #[error("timed out after {} ms", .0.as_millis())]
    Expired(Duration),

    #[error("{0} earlier calls are still running past their deadline")]
    Saturated(usize),

    #[error("cannot start helper thread: {0}")]
    Spawn(#[from] std::io::Error),
}

enum Slot<T> {
    Waiting,
    Done(T),
    Abandoned,
}

struct Handoff<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

/// Runs work under a deadline and bounds the helpers left behind.
#[derive(Debug)]
pub struct Deadlines {
    stalled: Arc<AtomicUsize>,
    max_stalled: usize,
}

impl Deadlines {
    #[must_use]
    pub fn new(max_stalled: usize) -> Self {
        Self {
            stalled: Arc::new(AtomicUsize::new(0)),
            max_stalled,
        }
    }

    /// Helpers currently running past their deadline.
    #[must_use]
    pub fn stalled(&self) -> usize {
        self.stalled.load(Ordering::SeqCst)
    }

    /// Run `work` and wait at most `limit` for its result. A zero `limit`
    /// disables the deadline and runs `work` inline.
    ///
    /// # Errors
    ///
    /// [`DeadlineError::Expired`] when the limit passes first; the helper is
    /// detached and its late result dropped. [`DeadlineError::Saturated`]
    /// when too many earlier helpers are still stuck, in which case `work`
    /// never runs.
    pub fn run<T, F>(&self, limit: Duration, work: F) -> Result<T, DeadlineError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        if limit.is_zero() {
            return Ok(work());
        }
        let stalled = self.stalled();
        if stalled >= self.max_stalled {
            warn!(stalled, "refusing call: too many helpers stuck past their deadline");
            return Err(DeadlineError::Saturated(stalled));
        }

        let handoff = Arc::new(Handoff {
            slot: Mutex::new(Slot::Waiting),
            ready: Condvar::new(),
        });
        let worker_side = Arc::clone(&handoff);
        let counter = Arc::clone(&self.stalled);
        std::thread::Builder::new()
            .name("bugsift-deadline".into())
            .spawn(move || {
                let value = work();
                let mut slot = worker_side
                    .slot
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                if matches!(*slot, Slot::Abandoned) {
                    counter.fetch_sub(1, Ordering::SeqCst);
                } else {
                    *slot = Slot::Done(value);
                    worker_side.ready.notify_one();
                }
            })?;

        let slot = handoff.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut slot, _) = handoff
            .ready
            .wait_timeout_while(slot, limit, |s| matches!(s, Slot::Waiting))
            .unwrap_or_else(PoisonError::into_inner);
        let outcome = std::mem::replace(&mut *slot, Slot::Abandoned);
        // Count the detach before the worker can observe `Abandoned`.
        let stalled = match outcome {
            Slot::Done(value) => return Ok(value),
            Slot::Waiting | Slot::Abandoned => self.stalled.fetch_add(1, Ordering::SeqCst) + 1,
        };
        drop(slot);
        warn!(
            limit_ms = limit.as_millis(),
            stalled, "deadline passed; helper thread detached"
        );
        Err(DeadlineError::Expired(limit))
    }
}
