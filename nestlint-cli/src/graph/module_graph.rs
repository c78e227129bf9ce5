//! Directed graph of `@Module` declarations
//!
//! Nodes are keyed by the declared class name. When two files declare a
//! module with the same name, the first one in (relative path, line) order
//! keeps the name and every later one is recorded as a [`ModuleCollision`].

use crate::parsers::{DeclKind, SourceSet};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// One `@Module` class declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleNode {
    pub name: String,
    /// Root-relative path of the declaring file
    pub file_path: String,
    pub line: u32,
    pub column: u32,
    pub providers: Vec<String>,
    pub imports: Vec<String>,
    pub controllers: Vec<String>,
    pub exports: Vec<String>,
}

impl ModuleNode {
    /// Node with only a name and an import list, for building graphs by hand
    pub fn new(name: &str, file_path: &str, line: u32, imports: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            file_path: file_path.to_string(),
            line,
            column: 1,
            providers: Vec::new(),
            imports: imports.iter().map(|s| s.to_string()).collect(),
            controllers: Vec::new(),
            exports: Vec::new(),
        }
    }
}

/// An import naming a module that is not in the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingImport {
    pub from: String,
    pub target: String,
}

/// A later declaration that reused an existing module name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleCollision {
    pub name: String,
    pub file_path: String,
    pub line: u32,
    pub column: u32,
    /// Declaration that kept the name
    pub first_file_path: String,
    pub first_line: u32,
}

#[derive(Debug, Default)]
pub struct ModuleGraph {
    nodes: BTreeMap<String, ModuleNode>,
    graph: DiGraph<String, ()>,
    indices: HashMap<String, NodeIndex>,
    dangling: Vec<DanglingImport>,
    collisions: Vec<ModuleCollision>,
}

impl ModuleGraph {
    /// Build the graph from every classified module in the source set
    pub fn build(sources: &SourceSet) -> Self {
        let mut declared = Vec::new();
        for unit in sources.units() {
            for class in unit.facts.classes_of(DeclKind::Module) {
                let metadata = class.module.clone().unwrap_or_default();
                declared.push(ModuleNode {
                    name: class.name.clone(),
                    file_path: unit.relative_path.clone(),
                    line: class.line,
                    column: class.column,
                    providers: metadata.providers,
                    imports: metadata.imports,
                    controllers: metadata.controllers,
                    exports: metadata.exports,
                });
            }
        }
        Self::from_nodes(declared)
    }

    /// Build from nodes given in declaration order; first name wins
    pub fn from_nodes(declared: Vec<ModuleNode>) -> Self {
        let mut nodes: BTreeMap<String, ModuleNode> = BTreeMap::new();
        let mut collisions = Vec::new();

        for node in declared {
            if let Some(first) = nodes.get(&node.name) {
                collisions.push(ModuleCollision {
                    name: node.name.clone(),
                    file_path: node.file_path.clone(),
                    line: node.line,
                    column: node.column,
                    first_file_path: first.file_path.clone(),
                    first_line: first.line,
                });
                continue;
            }
            nodes.insert(node.name.clone(), node);
        }

        let mut graph = DiGraph::new();
        let mut indices = HashMap::with_capacity(nodes.len());
        for name in nodes.keys() {
            indices.insert(name.clone(), graph.add_node(name.clone()));
        }

        let mut dangling = Vec::new();
        for node in nodes.values() {
            let from = indices[&node.name];
            for target in &node.imports {
                match indices.get(target) {
                    Some(&to) => {
                        graph.update_edge(from, to, ());
                    }
                    None => dangling.push(DanglingImport {
                        from: node.name.clone(),
                        target: target.clone(),
                    }),
                }
            }
        }

        debug!(
            "Module graph: {} modules, {} edges, {} dangling, {} collisions",
            nodes.len(),
            graph.edge_count(),
            dangling.len(),
            collisions.len()
        );

        Self {
            nodes,
            graph,
            indices,
            dangling,
            collisions,
        }
    }

    pub fn node(&self, name: &str) -> Option<&ModuleNode> {
        self.nodes.get(name)
    }

    /// Nodes in name order
    pub fn nodes(&self) -> impl Iterator<Item = &ModuleNode> {
        self.nodes.values()
    }

    /// Import targets present in the graph, in declared order
    pub fn successors<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.nodes
            .get(name)
            .map(|n| n.imports.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter(move |target| self.nodes.contains_key(target.as_str()))
            .map(|t| t.as_str())
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        match (self.indices.get(from), self.indices.get(to)) {
            (Some(&a), Some(&b)) => self.graph.contains_edge(a, b),
            _ => false,
        }
    }

    pub fn petgraph(&self) -> &DiGraph<String, ()> {
        &self.graph
    }

    pub fn dangling(&self) -> &[DanglingImport] {
        &self.dangling
    }

    pub fn collisions(&self) -> &[ModuleCollision] {
        &self.collisions
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edges_and_dangling_imports() {
        let graph = ModuleGraph::from_nodes(vec![
            ModuleNode::new("AppModule", "src/app.module.ts", 3, &["UsersModule", "ConfigModule"]),
            ModuleNode::new("UsersModule", "src/users/users.module.ts", 5, &[]),
        ]);

        assert_eq!(graph.len(), 2);
        assert!(graph.has_edge("AppModule", "UsersModule"));
        assert!(!graph.has_edge("UsersModule", "AppModule"));
        assert_eq!(
            graph.dangling(),
            &[DanglingImport {
                from: "AppModule".to_string(),
                target: "ConfigModule".to_string(),
            }]
        );
        let succ: Vec<&str> = graph.successors("AppModule").collect();
        assert_eq!(succ, vec!["UsersModule"]);
    }

    #[test]
    fn test_name_collision_first_wins() {
        let graph = ModuleGraph::from_nodes(vec![
            ModuleNode::new("SharedModule", "src/a/shared.module.ts", 4, &[]),
            ModuleNode::new("SharedModule", "src/b/shared.module.ts", 9, &["Other"]),
        ]);

        assert_eq!(graph.len(), 1);
        assert_eq!(graph.node("SharedModule").unwrap().file_path, "src/a/shared.module.ts");
        assert!(graph.dangling().is_empty());

        let collision = &graph.collisions()[0];
        assert_eq!(collision.file_path, "src/b/shared.module.ts");
        assert_eq!(collision.line, 9);
        assert_eq!(collision.first_line, 4);
    }

    #[test]
    fn test_build_from_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.module.ts");
        std::fs::write(
            &path,
            "@Module({ imports: [UsersModule], providers: [AppService] })\nexport class AppModule {}\n\n@Module({})\nexport class UsersModule {}\n",
        )
        .unwrap();

        let sources = SourceSet::ingest(dir.path(), &[path]).unwrap();
        let graph = ModuleGraph::build(&sources);
        assert_eq!(graph.len(), 2);
        let app = graph.node("AppModule").unwrap();
        assert_eq!(app.providers, vec!["AppService"]);
        assert_eq!(app.file_path, "app.module.ts");
        assert_eq!(app.line, 2);
        assert!(graph.has_edge("AppModule", "UsersModule"));
    }
}
