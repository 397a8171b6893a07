//! Lock-order inversion detection.
//!
//! Replace a plain mutex with a [`TrackedLock`] and every acquisition made
//! through [`TrackedLock::lock`] is reported to a [`LockOrderTracker`]. The
//! tracker keeps, per execution unit, the stack of locks currently held, and
//! records a dependency edge "held -> acquiring" for each of them. If the
//! edge set ever contains a cycle, some interleaving of the units involved
//! can deadlock, and the cycle is logged with the names and call sites of
//! every edge in it.
//!
//! This does not observe actual blocking. An ordering is flagged even if the
//! units that produced it never ran concurrently. Everything it reports is
//! advisory: the acquisition that completes a cycle still goes ahead.
//!
//! ## Reentrancy
//! The wrapped mutex is not reentrant. A guard created for a lock its own
//! unit already holds logs a warning and degrades to a no-op guard that
//! neither acquires nor releases.
//!
//! ## Trackers
//! [`LockOrderTracker::global`] is the process-wide default used by
//! [`TrackedLock::new`]. Tests and embedders that need isolation construct
//! their own tracker and pass it to [`TrackedLock::with_tracker`].

mod config;
mod graph;
mod guard;
mod lock;
mod report;
mod tracker;

pub use config::{ConfigError, CycleCheck, ENV_CYCLE_CHECK, ENV_REPORT_CYCLES, TrackerConfig};
pub use graph::LockDependencyGraph;
pub use guard::ScopedLockGuard;
pub use lock::TrackedLock;
pub use report::{CYCLE_REPORT_HEADER, CycleHop, CycleReport};
pub use tracker::{AcquireVerdict, LockOrderTracker};

pub use lockgraph_types::{
    CallSite, CyclePath, DependencyEdge, IdError, LockId, TrackerStats, UnitId,
};
