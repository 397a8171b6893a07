use std::fmt;
use std::sync::Arc;

use lockgraph_types::{CallSite, LockId};

use crate::guard::ScopedLockGuard;
use crate::tracker::LockOrderTracker;

/// A `parking_lot::Mutex` whose acquisitions are reported to a
/// [`LockOrderTracker`].
///
/// The identity is issued at construction and never reused, so moving the
/// lock or dropping it and allocating another at the same address cannot
/// confuse the tracker.
pub struct TrackedLock<T> {
    id: LockId,
    name: String,
    tracker: Arc<LockOrderTracker>,
    pub(crate) inner: parking_lot::Mutex<T>,
}

impl<T> TrackedLock<T> {
    /// Tracked by the process-wide [`LockOrderTracker::global`].
    pub fn new(name: impl Into<String>, value: T) -> Self {
        Self::with_tracker(name, value, LockOrderTracker::global())
    }

    pub fn with_tracker(
        name: impl Into<String>,
        value: T,
        tracker: Arc<LockOrderTracker>,
    ) -> Self {
        Self {
            id: LockId::next(),
            name: name.into(),
            tracker,
            inner: parking_lot::Mutex::new(value),
        }
    }

    pub fn id(&self) -> LockId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tracker(&self) -> &Arc<LockOrderTracker> {
        &self.tracker
    }

    /// Acquires the lock, attributing the acquisition to the caller's
    /// source location.
    #[track_caller]
    pub fn lock(&self) -> ScopedLockGuard<'_, T> {
        ScopedLockGuard::new(self, CallSite::caller())
    }

    /// Mutable access without locking; the borrow checker already rules out
    /// other users.
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T: Default> Default for TrackedLock<T> {
    fn default() -> Self {
        Self::new(std::any::type_name::<T>(), T::default())
    }
}

impl<T> fmt::Debug for TrackedLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedLock")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("locked", &self.inner.is_locked())
            .finish()
    }
}
