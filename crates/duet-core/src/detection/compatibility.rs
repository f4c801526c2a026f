//! Component dependency-graph compatibility.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::artifact::DesignSpec;
use crate::conflict::{Conflict, ConflictKind, Severity};
use crate::detection::{ConflictCheck, DetectionInput};
use crate::roles::AgentRole;

/// Checks the design's component graph: duplicate names, undeclared and
/// self dependencies, and dependency cycles. All findings belong to the
/// design role.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComponentCompatibility;

fn incompatible(severity: Severity, affected: &str, description: String) -> Conflict {
    Conflict::new(
        ConflictKind::IncompatibleComponents,
        severity,
        AgentRole::Design,
        affected,
        description,
    )
}

/// Components on or between dependency cycles, sorted.
///
/// Kahn's algorithm removes every node reachable from a source; the same
/// pass over reversed edges removes nodes that only hang off a cycle.
fn cyclic_components(design: &DesignSpec) -> BTreeSet<String> {
    let names: BTreeSet<&str> = design.component_names();
    let mut edges: BTreeSet<(&str, &str)> = BTreeSet::new();
    for c in &design.components {
        for dep in &c.depends_on {
            if dep != &c.name && names.contains(dep.as_str()) {
                edges.insert((dep.as_str(), c.name.as_str()));
            }
        }
    }

    let mut remaining: BTreeSet<&str> = names.clone();
    for reversed in [false, true] {
        let mut indegree: BTreeMap<&str, usize> = remaining.iter().map(|n| (*n, 0)).collect();
        let mut out: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for &(from, to) in &edges {
            let (from, to) = if reversed { (to, from) } else { (from, to) };
            if !remaining.contains(from) || !remaining.contains(to) {
                continue;
            }
            out.entry(from).or_default().push(to);
            if let Some(d) = indegree.get_mut(to) {
                *d += 1;
            }
        }

        let mut queue: VecDeque<&str> = indegree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| *n)
            .collect();
        while let Some(node) = queue.pop_front() {
            remaining.remove(node);
            for &next in out.get(node).into_iter().flatten() {
                if let Some(d) = indegree.get_mut(next) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(next);
                    }
                }
            }
        }
    }

    remaining.into_iter().map(String::from).collect()
}

impl ConflictCheck for ComponentCompatibility {
    fn name(&self) -> &'static str {
        "component-compatibility"
    }

    fn run(&self, input: &DetectionInput<'_>) -> Vec<Conflict> {
        let Some(design) = input.design else {
            return Vec::new();
        };
        let mut out = Vec::new();

        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for c in &design.components {
            *counts.entry(c.name.as_str()).or_default() += 1;
        }
        for (name, n) in counts.iter().filter(|(_, n)| **n > 1) {
            out.push(incompatible(
                Severity::High,
                name,
                format!("component name {name} is declared {n} times"),
            ));
        }

        for c in &design.components {
            for dep in &c.depends_on {
                if dep == &c.name {
                    out.push(incompatible(
                        Severity::Warning,
                        &c.name,
                        format!("component {} depends on itself", c.name),
                    ));
                } else if !counts.contains_key(dep.as_str()) {
                    out.push(incompatible(
                        Severity::High,
                        &c.name,
                        format!("component {} depends on undeclared component {dep}", c.name),
                    ));
                }
            }
        }

        let cycle = cyclic_components(design);
        if !cycle.is_empty() {
            let members: Vec<&str> = cycle.iter().map(String::as_str).collect();
            let members = members.join(", ");
            out.push(incompatible(
                Severity::High,
                &members,
                format!("dependency cycle among {members}"),
            ));
        }

        out.sort();
        out.dedup();
        out
    }
}
