//! Tracked values
//!
//! `Tracked<T>` is the observable container the stores keep entities in.
//! Every write bumps a revision counter, so readers can tell whether a value
//! changed since they last looked. Access goes through closures; no guard
//! escapes, so nothing holds the lock across an `.await`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::snapshot::Snapshot;

/// Shared, revisioned value.
#[derive(Debug)]
pub struct Tracked<T> {
    inner: Arc<RwLock<T>>,
    revision: Arc<AtomicU64>,
}

impl<T> Clone for Tracked<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            revision: Arc::clone(&self.revision),
        }
    }
}

impl<T> Tracked<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(value)),
            revision: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Run `f` against the current value.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Run `f` with write access and bump the revision.
    pub fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let out = f(&mut guard);
        self.revision.fetch_add(1, Ordering::AcqRel);
        out
    }

    /// Number of writes seen so far.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Whether two handles point at the same slot.
    pub fn same_slot(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone> Tracked<T> {
    /// Clone of the current value.
    pub fn get(&self) -> T {
        self.read(T::clone)
    }

    pub fn snapshot(&self) -> Snapshot<T> {
        self.read(Snapshot::capture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_bumps_revision() {
        let tracked = Tracked::new(vec![1, 2]);
        assert_eq!(tracked.revision(), 0);

        tracked.write(|v| v.push(3));
        assert_eq!(tracked.revision(), 1);
        assert_eq!(tracked.get(), vec![1, 2, 3]);

        // Reads leave the revision alone
        let len = tracked.read(|v| v.len());
        assert_eq!(len, 3);
        assert_eq!(tracked.revision(), 1);
    }

    #[test]
    fn test_clones_share_the_slot() {
        let a = Tracked::new(String::from("Evening"));
        let b = a.clone();
        b.write(|s| s.push_str(" Lights"));

        assert_eq!(a.get(), "Evening Lights");
        assert!(a.same_slot(&b));
        assert!(!a.same_slot(&Tracked::new(String::new())));
    }
}
