//! Import-cycle detection over the module graph
//!
//! # Algorithm
//!
//! 1. Tarjan's SCC (petgraph) marks the nodes that can lie on a cycle: members
//!    of a component with more than one node, or nodes with a self-edge.
//! 2. Depth-first traversal over those nodes in name order, following imports
//!    in declared order. An edge to a node on the active path emits the
//!    sub-path from that node to the current one and is not followed further.
//!    Fully explored nodes are not re-entered.
//! 3. Cycles are deduplicated by their sorted node-name set.

use super::ModuleGraph;
use petgraph::algo::tarjan_scc;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// An import cycle, as the ordered module names without repeating the start
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cycle {
    pub modules: Vec<String>,
}

impl Cycle {
    /// Module whose declaration site anchors the report
    pub fn anchor(&self) -> &str {
        self.modules.first().map(|s| s.as_str()).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Sorted node set used for deduplication
    fn key(&self) -> Vec<String> {
        let mut key = self.modules.clone();
        key.sort();
        key
    }
}

impl std::fmt::Display for Cycle {
    /// `A -> B -> C -> A`
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for module in &self.modules {
            write!(f, "{} -> ", module)?;
        }
        f.write_str(self.anchor())
    }
}

/// Find the elementary import cycles of a module graph
pub fn find_cycles(graph: &ModuleGraph) -> Vec<Cycle> {
    let cyclic = cyclic_nodes(graph);
    if cyclic.is_empty() {
        return Vec::new();
    }

    let mut search = CycleSearch {
        graph,
        cyclic,
        visited: HashSet::new(),
        path: Vec::new(),
        on_path: HashMap::new(),
        seen: HashSet::new(),
        cycles: Vec::new(),
    };

    for node in graph.nodes() {
        let name = node.name.as_str();
        if search.cyclic.contains(name) && !search.visited.contains(name) {
            search.visit(name);
        }
    }

    debug!("Found {} module import cycles", search.cycles.len());
    search.cycles
}

/// Nodes that belong to a non-trivial SCC or import themselves
fn cyclic_nodes(graph: &ModuleGraph) -> HashSet<&str> {
    let pg = graph.petgraph();
    let mut cyclic = HashSet::new();
    for scc in tarjan_scc(pg) {
        let self_loop = scc.len() == 1 && pg.contains_edge(scc[0], scc[0]);
        if scc.len() > 1 || self_loop {
            cyclic.extend(scc.into_iter().map(|idx| pg[idx].as_str()));
        }
    }
    cyclic
}

struct CycleSearch<'g> {
    graph: &'g ModuleGraph,
    cyclic: HashSet<&'g str>,
    visited: HashSet<&'g str>,
    path: Vec<&'g str>,
    on_path: HashMap<&'g str, usize>,
    seen: HashSet<Vec<String>>,
    cycles: Vec<Cycle>,
}

impl<'g> CycleSearch<'g> {
    fn visit(&mut self, node: &'g str) {
        self.visited.insert(node);
        self.on_path.insert(node, self.path.len());
        self.path.push(node);

        let graph = self.graph;
        for next in graph.successors(node) {
            if !self.cyclic.contains(next) {
                continue;
            }
            if let Some(&start) = self.on_path.get(next) {
                self.emit(start);
            } else if !self.visited.contains(next) {
                self.visit(next);
            }
        }

        self.path.pop();
        self.on_path.remove(node);
    }

    fn emit(&mut self, start: usize) {
        let cycle = Cycle {
            modules: self.path[start..].iter().map(|s| s.to_string()).collect(),
        };
        if self.seen.insert(cycle.key()) {
            self.cycles.push(cycle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ModuleNode;

    fn graph(edges: &[(&str, &[&str])]) -> ModuleGraph {
        ModuleGraph::from_nodes(
            edges
                .iter()
                .enumerate()
                .map(|(i, (name, imports))| {
                    ModuleNode::new(name, &format!("src/{}.ts", name), i as u32 + 1, imports)
                })
                .collect(),
        )
    }

    fn node_set(cycle: &Cycle) -> Vec<&str> {
        let mut names: Vec<&str> = cycle.modules.iter().map(|s| s.as_str()).collect();
        names.sort();
        names
    }

    #[test]
    fn test_three_node_cycle() {
        let g = graph(&[("A", &["B"]), ("B", &["C"]), ("C", &["A"])]);
        let cycles = find_cycles(&g);
        assert_eq!(cycles.len(), 1);
        assert_eq!(node_set(&cycles[0]), vec!["A", "B", "C"]);
        assert_eq!(cycles[0].modules, vec!["A", "B", "C"]);
        assert_eq!(cycles[0].anchor(), "A");
        assert_eq!(cycles[0].to_string(), "A -> B -> C -> A");
    }

    #[test]
    fn test_acyclic_and_diamond() {
        let chain = graph(&[("A", &["B"]), ("B", &["C"]), ("C", &[])]);
        assert!(find_cycles(&chain).is_empty());

        let diamond = graph(&[("A", &["B", "C"]), ("B", &["D"]), ("C", &["D"]), ("D", &[])]);
        assert!(find_cycles(&diamond).is_empty());
    }

    #[test]
    fn test_self_import() {
        let g = graph(&[("A", &["A"]), ("B", &["A"])]);
        let cycles = find_cycles(&g);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].modules, vec!["A"]);
    }

    #[test]
    fn test_two_disjoint_cycles() {
        let g = graph(&[
            ("A", &["B"]),
            ("B", &["A"]),
            ("C", &["D", "A"]),
            ("D", &["C"]),
        ]);
        let cycles = find_cycles(&g);
        assert_eq!(cycles.len(), 2);
        assert_eq!(node_set(&cycles[0]), vec!["A", "B"]);
        assert_eq!(node_set(&cycles[1]), vec!["C", "D"]);
    }

    #[test]
    fn test_dangling_imports_ignored() {
        let g = graph(&[("A", &["Missing", "B"]), ("B", &["A"])]);
        let cycles = find_cycles(&g);
        assert_eq!(cycles.len(), 1);
        assert_eq!(node_set(&cycles[0]), vec!["A", "B"]);
    }

    #[test]
    fn test_same_cycle_from_two_entries_reported_once() {
        let g = graph(&[("A", &["B"]), ("B", &["C"]), ("C", &["B"]), ("D", &["C"])]);
        let cycles = find_cycles(&g);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].modules, vec!["B", "C"]);
    }
}
