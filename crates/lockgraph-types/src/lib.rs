//! Value types shared by the lock-order tracker and the heartbeat watchdog.

use facet::Facet;
use std::cell::Cell;
use std::error::Error;
use std::fmt;
use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    ZeroId(&'static str),
    Exhausted(&'static str),
}

impl fmt::Display for IdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroId(field) => write!(f, "{field} must be non-zero"),
            Self::Exhausted(field) => write!(f, "{field} counter exhausted"),
        }
    }
}

impl Error for IdError {}

macro_rules! define_u64_id {
    (
        $(#[$meta:meta])*
        $name:ident,
        field = $field:literal
    ) => {
        #[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[facet(transparent)]
        $(#[$meta])*
        pub struct $name(u64);

        impl $name {
            pub fn new(raw: u64) -> Result<Self, IdError> {
                if raw == 0 {
                    return Err(IdError::ZeroId($field));
                }
                Ok(Self(raw))
            }

            /// Issues the next id from this type's process-wide counter.
            ///
            /// Ids are never handed out twice within a process, so an id stays
            /// unambiguous after the thing it named is gone.
            pub fn try_next() -> Result<Self, IdError> {
                static NEXT_COUNTER: AtomicU64 = AtomicU64::new(1);
                NEXT_COUNTER
                    .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1))
                    .map(Self)
                    .map_err(|_| IdError::Exhausted($field))
            }

            pub fn next() -> Self {
                Self::try_next().expect(concat!("invariant violated: ", $field, " counter exhausted"))
            }

            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_u64_id!(
    /// Identity of one tracked lock, issued when the lock is constructed.
    LockId,
    field = "lock_id"
);
define_u64_id!(
    /// Identity of an execution unit (an OS thread).
    UnitId,
    field = "unit_id"
);

impl UnitId {
    /// Id of the calling thread, assigned on first use and stable for the
    /// thread's lifetime.
    pub fn current() -> Self {
        thread_local! {
            static CURRENT_UNIT: Cell<Option<UnitId>> = const { Cell::new(None) };
        }
        CURRENT_UNIT.with(|cell| match cell.get() {
            Some(id) => id,
            None => {
                let id = UnitId::next();
                cell.set(Some(id));
                id
            }
        })
    }
}

/// Source location of a lock acquisition, as `{path}:{line}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallSite {
    location: &'static Location<'static>,
}

impl CallSite {
    #[track_caller]
    pub fn caller() -> Self {
        Self {
            location: Location::caller(),
        }
    }

    pub fn file(self) -> &'static str {
        self.location.file()
    }

    pub fn line(self) -> u32 {
        self.location.line()
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.location.file(), self.location.line())
    }
}

/// "`from` was held when `to` was acquired", with display data denormalized
/// at insertion time.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub from: LockId,
    pub to: LockId,
    pub from_name: String,
    pub to_name: String,
    /// Where `from` was acquired.
    pub from_site: String,
    /// Where `to` was acquired while `from` was held.
    pub to_site: String,
    /// Unit that first observed this ordering.
    pub unit: UnitId,
}

/// A closed chain of lock ids; the first and last entries are the same lock.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct CyclePath {
    pub locks: Vec<LockId>,
}

impl CyclePath {
    pub fn new(locks: Vec<LockId>) -> Self {
        Self { locks }
    }

    /// Consecutive `(from, to)` pairs along the path.
    pub fn hops(&self) -> impl Iterator<Item = (LockId, LockId)> + '_ {
        self.locks.windows(2).map(|pair| (pair[0], pair[1]))
    }

    /// Number of distinct locks in the loop.
    pub fn len(&self) -> usize {
        self.locks.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if `other` is the same loop entered at a different lock.
    pub fn is_rotation_of(&self, other: &[LockId]) -> bool {
        let ours = &self.locks[..self.len()];
        let theirs = match other.split_last() {
            Some((last, rest)) if rest.first() == Some(last) => rest,
            _ => other,
        };
        if ours.len() != theirs.len() {
            return false;
        }
        if ours.is_empty() {
            return true;
        }
        (0..ours.len()).any(|shift| {
            ours.iter()
                .cycle()
                .skip(shift)
                .take(ours.len())
                .eq(theirs.iter())
        })
    }
}

/// Point-in-time counters for a tracker.
#[derive(Facet, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    /// Distinct ordered pairs recorded.
    pub dependencies: u64,
    /// Locks the tracker has seen acquired at least once.
    pub tracked_locks: u64,
    /// Units currently holding at least one tracked lock.
    pub held_units: u64,
    /// Acquisitions whose cycle check found a cycle.
    pub cycles_detected: u64,
    /// Guards that found their lock already held by the same unit.
    pub duplicate_rejections: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_id_rejects_zero() {
        let err = LockId::new(0).expect_err("zero must fail");
        assert!(matches!(err, IdError::ZeroId("lock_id")));
        assert_eq!(LockId::new(42).expect("valid id").get(), 42);
    }

    #[test]
    fn next_ids_are_distinct_and_non_zero() {
        let a = LockId::next();
        let b = LockId::next();
        assert_ne!(a, b);
        assert_ne!(a.get(), 0);
        assert_ne!(b.get(), 0);
    }

    #[test]
    fn unit_id_is_stable_per_thread_and_distinct_across_threads() {
        let here = UnitId::current();
        assert_eq!(here, UnitId::current());
        let there = std::thread::spawn(UnitId::current)
            .join()
            .expect("thread should not panic");
        assert_ne!(here, there);
    }

    #[test]
    fn call_site_points_at_caller() {
        let site = CallSite::caller();
        assert_eq!(site.line(), line!() - 1);
        assert!(site.to_string().ends_with(&format!(":{}", site.line())));
        assert!(site.file().ends_with("lib.rs"));
    }

    #[test]
    fn cycle_path_rotation() {
        let ids: Vec<LockId> = (1..=3)
            .map(|n| LockId::new(n).expect("valid id"))
            .collect();
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        let path = CyclePath::new(vec![b, c, a, b]);
        assert_eq!(path.len(), 3);
        assert!(path.is_rotation_of(&[a, b, c, a]));
        assert!(path.is_rotation_of(&[c, a, b]));
        assert!(!path.is_rotation_of(&[a, c, b, a]));
        assert_eq!(path.hops().count(), 3);
    }
}
