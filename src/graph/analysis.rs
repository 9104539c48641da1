//! Package Graph Analysis
//!
//! Strongly connected unit groups (cycles anywhere in the package, reachable
//! from the roots or not) and summary statistics.

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::package::{natural_id_cmp, DataObjectPackage};

// =============================================================================
// Unit Graph
// =============================================================================

/// Parent to child edges between units, ignoring dangling child ids
struct UnitGraph {
    graph: DiGraph<String, ()>,
}

impl UnitGraph {
    fn build(pkg: &DataObjectPackage) -> Self {
        let mut graph = DiGraph::new();
        let mut indices = HashMap::new();
        for id in pkg.sorted_unit_ids() {
            let index = graph.add_node(id.clone());
            indices.insert(id, index);
        }
        for unit in pkg.units() {
            let Some(&from) = indices.get(unit.id()) else {
                continue;
            };
            for child in unit.children().iter() {
                if let Some(&to) = indices.get(child) {
                    graph.add_edge(from, to, ());
                }
            }
        }
        Self { graph }
    }

    fn has_self_loop(&self, index: NodeIndex) -> bool {
        self.graph
            .edges_directed(index, Direction::Outgoing)
            .any(|e| e.target() == index)
    }
}

// =============================================================================
// Cycle Groups
// =============================================================================

/// Sets of units that reach each other through child links. Each group is
/// sorted in natural id order and groups are ordered by their first member.
pub fn cycle_groups(pkg: &DataObjectPackage) -> Vec<Vec<String>> {
    let units = UnitGraph::build(pkg);
    let mut groups: Vec<Vec<String>> = kosaraju_scc(&units.graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || units.has_self_loop(scc[0]))
        .map(|scc| {
            let mut members: Vec<String> = scc
                .iter()
                .filter_map(|index| units.graph.node_weight(*index).cloned())
                .collect();
            members.sort_by(|a, b| natural_id_cmp(a, b));
            members
        })
        .collect();
    groups.sort_by(|a, b| natural_id_cmp(&a[0], &b[0]));
    groups
}

// =============================================================================
// Statistics
// =============================================================================

/// Summary of a package, as reported by `seda-tool stats`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageStatistics {
    pub unit_count: usize,
    pub group_count: usize,
    pub binary_count: usize,
    pub physical_count: usize,
    pub root_count: usize,
    /// Units not reachable from any root
    pub unreachable_unit_count: usize,
    /// Deepest level reached from the roots, roots being level 1
    pub max_depth: usize,
    /// Sum of the declared binary sizes
    pub total_size: i64,
    pub ungrouped_binary_count: usize,
    pub ungrouped_physical_count: usize,
    pub cycle_group_count: usize,
}

/// Compute package statistics. Units are levelled breadth-first from the
/// roots, so cycles do not prevent the computation.
pub fn statistics(pkg: &DataObjectPackage) -> PackageStatistics {
    let mut levels: HashMap<&str, usize> = HashMap::new();
    let mut queue: VecDeque<(&str, usize)> = pkg.roots().iter().map(|id| (id.as_str(), 1)).collect();
    while let Some((id, level)) = queue.pop_front() {
        if levels.contains_key(id) {
            continue;
        }
        let Some(unit) = pkg.get_unit(id) else {
            continue;
        };
        levels.insert(unit.id(), level);
        for child in unit.children().iter() {
            queue.push_back((child, level + 1));
        }
    }

    let reachable: HashSet<&str> = levels.keys().copied().collect();

    PackageStatistics {
        unit_count: pkg.unit_count(),
        group_count: pkg.group_count(),
        binary_count: pkg.binary_count(),
        physical_count: pkg.physical_count(),
        root_count: pkg.roots().len(),
        unreachable_unit_count: pkg.units().filter(|u| !reachable.contains(u.id())).count(),
        max_depth: levels.values().copied().max().unwrap_or(0),
        total_size: pkg.binaries().filter_map(|b| b.size).sum(),
        ungrouped_binary_count: pkg.binaries().filter(|b| b.group().is_none()).count(),
        ungrouped_physical_count: pkg.physicals().filter(|p| p.group().is_none()).count(),
        cycle_group_count: cycle_groups(pkg).len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::BinaryDataObject;

    #[test]
    fn test_cycle_groups_include_unreachable_cycles() {
        let mut pkg = DataObjectPackage::new();
        let root = pkg.create_unit();
        let a = pkg.create_unit();
        let b = pkg.create_unit();
        let selfish = pkg.create_unit();
        pkg.add_root(&root).unwrap();
        pkg.add_child(&a, &b).unwrap();
        pkg.add_child(&b, &a).unwrap();
        pkg.add_child(&selfish, &selfish).unwrap();

        assert_eq!(cycle_groups(&pkg), vec![vec![a, b], vec![selfish]]);
    }

    #[test]
    fn test_statistics() {
        let mut pkg = DataObjectPackage::new();
        let root = pkg.create_unit();
        let child = pkg.create_unit();
        pkg.create_unit();
        pkg.add_root(&root).unwrap();
        pkg.add_child(&root, &child).unwrap();
        let mut binary = BinaryDataObject::new();
        binary.size = Some(1500);
        pkg.add_binary(binary).unwrap();
        let group = pkg.create_group();
        let grouped = BinaryDataObject {
            size: Some(500),
            ..BinaryDataObject::new()
        };
        let grouped = pkg.add_binary(grouped).unwrap();
        pkg.add_binary_to_group(&group, &grouped).unwrap();

        let stats = statistics(&pkg);
        assert_eq!(stats.unit_count, 3);
        assert_eq!(stats.root_count, 1);
        assert_eq!(stats.unreachable_unit_count, 1);
        assert_eq!(stats.max_depth, 2);
        assert_eq!(stats.total_size, 2000);
        assert_eq!(stats.ungrouped_binary_count, 1);
        assert_eq!(stats.cycle_group_count, 0);
    }
}
