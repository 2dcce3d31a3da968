//! Strictly increasing creation timestamps.

use std::sync::atomic::{AtomicI64, Ordering};

use bugsift_core::now_us;

/// Hands out wall-clock microseconds, bumped by one whenever the wall clock
/// has not advanced past the previous value. Creation order is therefore
/// total even for reports accepted within the same microsecond.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    /// Start after `floor`, typically the newest persisted timestamp.
    #[must_use]
    pub const fn starting_after(floor: i64) -> Self {
        Self {
            last: AtomicI64::new(floor),
        }
    }

    pub fn next(&self) -> i64 {
        let wall = now_us();
        let mut previous = self.last.load(Ordering::SeqCst);
        loop {
            let candidate = wall.max(previous.saturating_add(1));
            match self.last.compare_exchange_weak(
                previous,
                candidate,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return candidate,
                Err(actual) => previous = actual,
            }
        }
    }
}
