//! The deduplicated "held while acquiring" edge set and cycle search over it.
//!
//! Edges are kept in insertion order; adjacency lists and the root order
//! used by the full search follow that order too, so for a given sequence of
//! insertions the reported cycle is deterministic.
//!
//! The full search is an O(V+E) walk over every tracked lock in the process.
//! It runs on every acquisition in [`CycleCheck::FullGraph`] mode, which makes
//! it the hot-path cost under heavy lock churn.
//!
//! [`CycleCheck::FullGraph`]: crate::CycleCheck::FullGraph

use std::collections::{HashMap, HashSet};

use lockgraph_types::{CyclePath, DependencyEdge, LockId};

#[derive(Debug, Default)]
pub struct LockDependencyGraph {
    edges: Vec<DependencyEdge>,
    index: HashMap<(LockId, LockId), usize>,
    adjacency: HashMap<LockId, Vec<LockId>>,
    roots: Vec<LockId>,
}

impl LockDependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `edge` unless its ordered pair is already present.
    ///
    /// Returns `true` if the edge set grew.
    pub fn insert(&mut self, edge: DependencyEdge) -> bool {
        let key = (edge.from, edge.to);
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key, self.edges.len());
        match self.adjacency.get_mut(&edge.from) {
            Some(targets) => targets.push(edge.to),
            None => {
                self.adjacency.insert(edge.from, vec![edge.to]);
                self.roots.push(edge.from);
            }
        }
        self.edges.push(edge);
        true
    }

    pub fn contains(&self, from: LockId, to: LockId) -> bool {
        self.index.contains_key(&(from, to))
    }

    pub fn edge(&self, from: LockId, to: LockId) -> Option<&DependencyEdge> {
        self.index.get(&(from, to)).map(|&slot| &self.edges[slot])
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn clear(&mut self) {
        self.edges.clear();
        self.index.clear();
        self.adjacency.clear();
        self.roots.clear();
    }

    fn successors(&self, node: LockId) -> &[LockId] {
        self.adjacency.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Depth-first search over the whole edge set for one cycle.
    ///
    /// The visited set is shared across roots: a lock fully explored from an
    /// earlier root is never re-entered. When several disjoint cycles exist,
    /// only the first one reachable in root order is guaranteed to be found.
    ///
    /// The returned path starts at the lock the closing edge points to, so it
    /// contains only the loop itself.
    pub fn find_cycle(&self) -> Option<CyclePath> {
        let mut visited: HashSet<LockId> = HashSet::new();
        let mut on_path: HashSet<LockId> = HashSet::new();
        let mut path: Vec<LockId> = Vec::new();
        let mut cursors: Vec<usize> = Vec::new();

        for &root in &self.roots {
            if !visited.insert(root) {
                continue;
            }
            on_path.insert(root);
            path.push(root);
            cursors.push(0);

            while let (Some(&node), Some(cursor)) = (path.last(), cursors.last_mut()) {
                let Some(&next) = self.successors(node).get(*cursor) else {
                    on_path.remove(&node);
                    path.pop();
                    cursors.pop();
                    continue;
                };
                *cursor += 1;

                if on_path.contains(&next) {
                    let start = path.iter().position(|&id| id == next).unwrap_or(0);
                    let mut locks = path[start..].to_vec();
                    locks.push(next);
                    return Some(CyclePath::new(locks));
                }
                if visited.insert(next) {
                    on_path.insert(next);
                    path.push(next);
                    cursors.push(0);
                }
            }
        }
        None
    }

    /// Checks whether the edge `from -> to` closes a cycle, by searching for
    /// a path from `to` back to `from`.
    ///
    /// The result is `[from, to, .., from]`.
    pub fn cycle_through(&self, from: LockId, to: LockId) -> Option<CyclePath> {
        let mut locks = vec![from];
        locks.extend(self.path_between(to, from)?);
        Some(CyclePath::new(locks))
    }

    /// A path `[start, .., goal]` following edges forward, if one exists.
    pub fn path_between(&self, start: LockId, goal: LockId) -> Option<Vec<LockId>> {
        if start == goal {
            return Some(vec![start]);
        }
        let mut parent: HashMap<LockId, LockId> = HashMap::new();
        let mut seen: HashSet<LockId> = HashSet::from([start]);
        let mut work = vec![start];

        while let Some(node) = work.pop() {
            for &next in self.successors(node) {
                if !seen.insert(next) {
                    continue;
                }
                parent.insert(next, node);
                if next == goal {
                    let mut route = vec![goal];
                    let mut cur = goal;
                    while let Some(&prev) = parent.get(&cur) {
                        route.push(prev);
                        cur = prev;
                    }
                    route.reverse();
                    return Some(route);
                }
                work.push(next);
            }
        }
        None
    }
}
