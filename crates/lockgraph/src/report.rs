//! Rendering of a detected cycle back into lock names and call sites.

use std::fmt;

use lockgraph_types::{CyclePath, DependencyEdge, LockId};

use crate::graph::LockDependencyGraph;

pub const CYCLE_REPORT_HEADER: &str = "[DEADLOCK DETECTED] lock-order cycle, cycle path:";

/// One step of a cycle, resolved against the recorded edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleHop {
    Known(DependencyEdge),
    /// The path names an ordered pair with no recorded edge.
    Unknown { from: LockId, to: LockId },
}

impl fmt::Display for CycleHop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(edge) => write!(
                f,
                "  {} ({}) -> {} ({})",
                edge.from_name, edge.from_site, edge.to_name, edge.to_site
            ),
            Self::Unknown { from, to } => write!(f, "  Unknown dependency from {from} to {to}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    path: CyclePath,
    hops: Vec<CycleHop>,
}

impl CycleReport {
    pub(crate) fn resolve(path: CyclePath, graph: &LockDependencyGraph) -> Self {
        let hops = path
            .hops()
            .map(|(from, to)| match graph.edge(from, to) {
                Some(edge) => CycleHop::Known(edge.clone()),
                None => CycleHop::Unknown { from, to },
            })
            .collect();
        Self { path, hops }
    }

    pub fn path(&self) -> &CyclePath {
        &self.path
    }

    pub fn hops(&self) -> &[CycleHop] {
        &self.hops
    }

    /// Names of the locks in the loop, in path order, without the closing
    /// repeat. Unresolved locks are skipped.
    pub fn lock_names(&self) -> Vec<&str> {
        self.hops
            .iter()
            .filter_map(|hop| match hop {
                CycleHop::Known(edge) => Some(edge.from_name.as_str()),
                CycleHop::Unknown { .. } => None,
            })
            .collect()
    }

    /// Single-line form: `a (site) -> b (site) -> a (site)`.
    pub fn chain(&self) -> String {
        let mut out = String::new();
        for (i, hop) in self.hops.iter().enumerate() {
            match hop {
                CycleHop::Known(edge) => {
                    if i == 0 {
                        out.push_str(&format!("{} ({})", edge.from_name, edge.from_site));
                    }
                    out.push_str(&format!(" -> {} ({})", edge.to_name, edge.to_site));
                }
                CycleHop::Unknown { from, to } => {
                    if i == 0 {
                        out.push_str(&format!("#{from}"));
                    }
                    out.push_str(&format!(" -> #{to}"));
                }
            }
        }
        out
    }

    pub(crate) fn emit(&self) {
        tracing::warn!(
            target: "lockgraph::cycle",
            locks = self.path.len(),
            "{}",
            self
        );
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{CYCLE_REPORT_HEADER}")?;
        for hop in &self.hops {
            write!(f, "\n{hop}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockgraph_types::UnitId;

    fn id(counter: u64) -> LockId {
        LockId::new(counter).expect("valid id")
    }

    fn edge(from: LockId, from_name: &str, to: LockId, to_name: &str) -> DependencyEdge {
        DependencyEdge {
            from,
            to,
            from_name: from_name.to_owned(),
            to_name: to_name.to_owned(),
            from_site: format!("src/{from_name}.rs:10"),
            to_site: format!("src/{to_name}.rs:20"),
            unit: UnitId::new(1).expect("valid id"),
        }
    }

    #[test]
    fn renders_header_then_one_line_per_edge() {
        let (x, y) = (id(1), id(2));
        let mut graph = LockDependencyGraph::new();
        graph.insert(edge(x, "X", y, "Y"));
        graph.insert(edge(y, "Y", x, "X"));
        let report = CycleReport::resolve(CyclePath::new(vec![x, y, x]), &graph);

        let text = report.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CYCLE_REPORT_HEADER);
        assert_eq!(lines[1], "  X (src/X.rs:10) -> Y (src/Y.rs:20)");
        assert_eq!(lines[2], "  Y (src/Y.rs:10) -> X (src/X.rs:20)");
        assert_eq!(report.lock_names(), vec!["X", "Y"]);
        assert_eq!(
            report.chain(),
            "X (src/X.rs:10) -> Y (src/Y.rs:20) -> X (src/X.rs:20)"
        );
    }

    #[test]
    fn missing_edge_degrades_to_placeholder() {
        let (x, y) = (id(1), id(2));
        let mut graph = LockDependencyGraph::new();
        graph.insert(edge(x, "X", y, "Y"));
        let report = CycleReport::resolve(CyclePath::new(vec![x, y, x]), &graph);

        assert!(matches!(report.hops()[1], CycleHop::Unknown { from, to } if from == y && to == x));
        let text = report.to_string();
        assert_eq!(
            text.lines().last(),
            Some(format!("  Unknown dependency from {y} to {x}").as_str())
        );
    }
}
