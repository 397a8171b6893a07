//! Process-wide lock-order bookkeeping.
//!
//! One mutex serializes every operation on the edge set and the per-unit
//! held stacks, so all lock-order bookkeeping in the process is ordered by
//! that mutex. Edges therefore reflect the order in which units reached the
//! tracker, not a happens-before relation between units.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use lockgraph_types::{CallSite, DependencyEdge, LockId, TrackerStats, UnitId};
use parking_lot::Mutex;

use crate::config::{CycleCheck, TrackerConfig};
use crate::graph::LockDependencyGraph;
use crate::report::CycleReport;

const UNKNOWN_LOCK_NAME: &str = "unknown";

/// Result of recording an acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireVerdict {
    Safe,
    /// The edge set contains a cycle after this acquisition.
    Cycle(CycleReport),
}

impl AcquireVerdict {
    pub fn is_safe(&self) -> bool {
        matches!(self, Self::Safe)
    }

    pub fn cycle(&self) -> Option<&CycleReport> {
        match self {
            Self::Safe => None,
            Self::Cycle(report) => Some(report),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct HeldLock {
    id: LockId,
    site: CallSite,
}

#[derive(Default)]
struct TrackerState {
    graph: LockDependencyGraph,
    /// Present only while non-empty. Last entry is the most recent acquisition.
    held: HashMap<UnitId, Vec<HeldLock>>,
    names: HashMap<LockId, String>,
    cycles_detected: u64,
    duplicate_rejections: u64,
}

pub struct LockOrderTracker {
    config: TrackerConfig,
    state: Mutex<TrackerState>,
}

impl Default for LockOrderTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl std::fmt::Debug for LockOrderTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockOrderTracker")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl LockOrderTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// The process-wide default tracker, configured from the environment on
    /// first use and alive for the rest of the process.
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<LockOrderTracker>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| {
                let config = TrackerConfig::from_env().unwrap_or_else(|err| {
                    tracing::warn!(%err, "ignoring lockgraph environment configuration");
                    TrackerConfig::default()
                });
                Arc::new(Self::new(config))
            })
            .clone()
    }

    pub fn config(&self) -> TrackerConfig {
        self.config
    }

    /// Records that `unit` is acquiring `lock`.
    ///
    /// Every lock currently on `unit`'s stack gains an edge to `lock`, then
    /// `lock` is pushed. The cycle check runs over the edge set as it stands
    /// after this call; a cycle completed by another unit's acquisition that
    /// has not reached the tracker yet is seen by a later call.
    pub fn record_acquisition(
        &self,
        lock: LockId,
        name: &str,
        site: CallSite,
        unit: UnitId,
    ) -> AcquireVerdict {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if !state.names.contains_key(&lock) {
            state.names.insert(lock, name.to_owned());
        }

        let stack = state.held.entry(unit).or_default();
        let mut inserted = Vec::new();
        for held in stack.iter() {
            if state.graph.contains(held.id, lock) {
                continue;
            }
            let from_name = state
                .names
                .get(&held.id)
                .map(String::as_str)
                .unwrap_or(UNKNOWN_LOCK_NAME);
            state.graph.insert(DependencyEdge {
                from: held.id,
                to: lock,
                from_name: from_name.to_owned(),
                to_name: name.to_owned(),
                from_site: held.site.to_string(),
                to_site: site.to_string(),
                unit,
            });
            inserted.push((held.id, lock));
        }
        stack.push(HeldLock { id: lock, site });

        let cycle = match self.config.cycle_check {
            CycleCheck::FullGraph => state.graph.find_cycle(),
            CycleCheck::NewEdges => inserted
                .iter()
                .find_map(|&(from, to)| state.graph.cycle_through(from, to)),
            CycleCheck::Off => None,
        };
        let Some(path) = cycle else {
            return AcquireVerdict::Safe;
        };

        state.cycles_detected += 1;
        let report = CycleReport::resolve(path, &state.graph);
        drop(guard);

        if self.config.report_cycles {
            report.emit();
        }
        AcquireVerdict::Cycle(report)
    }

    /// Removes the most recent occurrence of `lock` from `unit`'s stack,
    /// dropping the unit's entry once nothing is left on it.
    pub fn record_release(&self, lock: LockId, unit: UnitId) {
        let mut state = self.state.lock();
        let Some(stack) = state.held.get_mut(&unit) else {
            return;
        };
        if let Some(pos) = stack.iter().rposition(|held| held.id == lock) {
            stack.remove(pos);
        }
        if stack.is_empty() {
            state.held.remove(&unit);
        }
    }

    /// Whether `unit` itself currently holds `lock`. Other units are not
    /// consulted.
    pub fn has_lock(&self, lock: LockId, unit: UnitId) -> bool {
        self.state
            .lock()
            .held
            .get(&unit)
            .is_some_and(|stack| stack.iter().any(|held| held.id == lock))
    }

    /// Logs and counts a guard that found its lock already held by its own
    /// unit.
    pub fn record_duplicate(&self, lock: LockId, name: &str, site: CallSite, unit: UnitId) {
        self.state.lock().duplicate_rejections += 1;
        tracing::warn!(
            target: "lockgraph::duplicate",
            %lock,
            %unit,
            lock_name = name,
            "duplicate lock attempt ignored on {site}"
        );
    }

    /// Locks held by `unit`, oldest acquisition first.
    pub fn held_by(&self, unit: UnitId) -> Vec<LockId> {
        self.state
            .lock()
            .held
            .get(&unit)
            .map(|stack| stack.iter().map(|held| held.id).collect())
            .unwrap_or_default()
    }

    /// Recorded edges in insertion order.
    pub fn edges(&self) -> Vec<DependencyEdge> {
        self.state.lock().graph.edges().to_vec()
    }

    /// Runs the full-graph search now, regardless of the configured mode.
    /// Does not count towards `cycles_detected` and does not log.
    pub fn find_cycle(&self) -> Option<CycleReport> {
        let state = self.state.lock();
        state
            .graph
            .find_cycle()
            .map(|path| CycleReport::resolve(path, &state.graph))
    }

    pub fn stats(&self) -> TrackerStats {
        let state = self.state.lock();
        TrackerStats {
            dependencies: state.graph.len() as u64,
            tracked_locks: state.names.len() as u64,
            held_units: state.held.len() as u64,
            cycles_detected: state.cycles_detected,
            duplicate_rejections: state.duplicate_rejections,
        }
    }

    pub fn print_statistics(&self) {
        let stats = self.stats();
        tracing::info!(
            target: "lockgraph::stats",
            tracked_locks = stats.tracked_locks,
            cycles_detected = stats.cycles_detected,
            duplicate_rejections = stats.duplicate_rejections,
            "Total Dependencies : {}",
            stats.dependencies
        );
    }

    /// Forgets every edge, name, held stack and counter.
    ///
    /// Guards alive across a reset release into an empty stack, which is a
    /// no-op.
    pub fn reset(&self) {
        *self.state.lock() = TrackerState::default();
    }
}
