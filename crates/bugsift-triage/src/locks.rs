//! Per-root critical sections.
//!
//! Decisions that can change a duplicate chain's recurring count are
//! serialised on the chain's root id. Unrelated roots proceed in parallel.
//! Keys are dropped from the held set on release, so the structure never
//! grows past the number of roots currently being decided.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, PoisonError};

#[derive(Debug, Default)]
pub struct RootLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

/// Holds the lock on one root until dropped.
#[derive(Debug)]
pub struct RootGuard<'a> {
    locks: &'a RootLocks,
    key: String,
}

impl RootGuard<'_> {
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl RootLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `key` is free, then hold it.
    pub fn lock(&self, key: &str) -> RootGuard<'_> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while held.contains(key) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        held.insert(key.to_string());
        RootGuard {
            locks: self,
            key: key.to_string(),
        }
    }

    /// Number of roots currently held.
    #[must_use]
    pub fn held(&self) -> usize {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Drop for RootGuard<'_> {
    fn drop(&mut self) {
        let mut held = self
            .locks
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        held.remove(&self.key);
        drop(held);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn same_key_is_exclusive() {
        let locks = RootLocks::new();
        let inside = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let _guard = locks.lock("bug-root");
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(2));
                    inside.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(locks.held(), 0);
    }

    #[test]
    fn different_keys_do_not_block() {
        let locks = RootLocks::new();
        let a = locks.lock("bug-a");
        let b = locks.lock("bug-b");
        assert_eq!(locks.held(), 2);
        assert_eq!(a.key(), "bug-a");
        drop(a);
        drop(b);
        assert_eq!(locks.held(), 0);
    }
}
