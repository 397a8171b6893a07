//! Scoped acquisition of a [`TrackedLock`].
//!
//! Per (lock, unit) pair a guard moves through
//! `Free -> (DuplicateRejected | Acquiring -> Held) -> Released`.
//! A guard that never acquired never releases.

use std::fmt;

use lockgraph_types::{CallSite, UnitId};
use parking_lot::MutexGuard;

use crate::lock::TrackedLock;

/// Holds a [`TrackedLock`] until dropped.
///
/// Not `Send`: the duplicate check and the release bookkeeping are keyed on
/// the unit that created the guard.
pub struct ScopedLockGuard<'a, T> {
    lock: &'a TrackedLock<T>,
    guard: Option<MutexGuard<'a, T>>,
    site: CallSite,
    unit: UnitId,
}

impl<'a, T> ScopedLockGuard<'a, T> {
    pub(crate) fn new(lock: &'a TrackedLock<T>, site: CallSite) -> Self {
        let unit = UnitId::current();
        let tracker = lock.tracker();

        // The wrapped mutex is not reentrant; locking it again from this
        // unit would block forever.
        if tracker.has_lock(lock.id(), unit) {
            tracker.record_duplicate(lock.id(), lock.name(), site, unit);
            return Self {
                lock,
                guard: None,
                site,
                unit,
            };
        }

        // Bookkeeping precedes the physical acquisition: the edge is on
        // record before this unit starts waiting for the mutex.
        tracker.record_acquisition(lock.id(), lock.name(), site, unit);
        let guard = lock.inner.lock();

        Self {
            lock,
            guard: Some(guard),
            site,
            unit,
        }
    }

    /// False if the lock was already held by this unit when the guard was
    /// created.
    pub fn is_acquired(&self) -> bool {
        self.guard.is_some()
    }

    pub fn site(&self) -> CallSite {
        self.site
    }

    pub fn lock(&self) -> &'a TrackedLock<T> {
        self.lock
    }

    pub fn get(&self) -> Option<&T> {
        self.guard.as_deref()
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.guard.as_deref_mut()
    }
}

impl<T> Drop for ScopedLockGuard<'_, T> {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        // Physical unlock first, so the tracker never shows a lock as free
        // while the mutex is still held.
        drop(guard);
        self.lock.tracker().record_release(self.lock.id(), self.unit);
    }
}

impl<T> fmt::Debug for ScopedLockGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedLockGuard")
            .field("lock", &self.lock.name())
            .field("acquired", &self.is_acquired())
            .field("site", &self.site)
            .finish()
    }
}
