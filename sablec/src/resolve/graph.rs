//! Import dependency graph.
//!
//! Resolution records one edge per parent/child import pair, in the order
//! the imports are discovered. The graph is what tooling uses to list
//! dependencies, render them with Graphviz, or persist them between runs.

use std::collections::{HashSet, VecDeque};
use std::fmt::{self, Write as _};
use std::fs;
use std::io;
use std::path::Path;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::chain::ChainedImport;

/// Errors that can occur while persisting a graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for GraphError {
    fn from(e: serde_json::Error) -> Self {
        GraphError::Serialization(e.to_string())
    }
}

/// A graph node: the root expression or a chained import.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImportNode {
    Root,
    Import(ChainedImport),
}

impl fmt::Display for ImportNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportNode::Root => f.write_str("<root>"),
            ImportNode::Import(import) => write!(f, "{}", import),
        }
    }
}

/// `from` imports `to`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub from: ImportNode,
    pub to: ImportNode,
}

#[derive(Serialize, Deserialize)]
struct GraphFile {
    edges: Vec<Edge>,
}

/// Ordered, duplicate-free set of import edges.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportGraph {
    edges: IndexSet<Edge>,
}

impl ImportGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `from` imports `to`. Returns `false` if already present.
    pub fn add_edge(&mut self, from: ImportNode, to: ImportNode) -> bool {
        self.edges.insert(Edge { from, to })
    }

    /// Edges in discovery order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.iter()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn contains(&self, from: &ImportNode, to: &ImportNode) -> bool {
        self.edges.contains(&Edge {
            from: from.clone(),
            to: to.clone(),
        })
    }

    /// Drop edges recorded after the first `len`.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.edges.truncate(len);
    }

    /// Every node, in order of first appearance.
    pub fn nodes(&self) -> Vec<&ImportNode> {
        let mut seen = IndexSet::new();
        for edge in &self.edges {
            seen.insert(&edge.from);
            seen.insert(&edge.to);
        }
        seen.into_iter().collect()
    }

    /// Direct imports of `node`, in discovery order.
    pub fn dependencies_of<'a>(&'a self, node: &'a ImportNode) -> impl Iterator<Item = &'a ImportNode> + 'a {
        self.edges.iter().filter(move |e| &e.from == node).map(|e| &e.to)
    }

    /// Nodes that import `node` directly.
    pub fn dependents_of<'a>(&'a self, node: &'a ImportNode) -> impl Iterator<Item = &'a ImportNode> + 'a {
        self.edges.iter().filter(move |e| &e.to == node).map(|e| &e.from)
    }

    /// Check if `from` depends on `to` (directly or transitively).
    pub fn depends_on(&self, from: &ImportNode, to: &ImportNode) -> bool {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(from);

        while let Some(current) = queue.pop_front() {
            if current == to {
                return true;
            }
            if visited.insert(current) {
                queue.extend(self.dependencies_of(current));
            }
        }

        false
    }

    /// Graphviz rendering.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph imports {\n");
        for edge in &self.edges {
            let _ = writeln!(out, "    {} -> {};", dot_id(&edge.from), dot_id(&edge.to));
        }
        out.push_str("}\n");
        out
    }

    pub fn to_json(&self) -> Result<String, GraphError> {
        let file = GraphFile {
            edges: self.edges.iter().cloned().collect(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        let file: GraphFile = serde_json::from_str(json)?;
        Ok(Self {
            edges: file.edges.into_iter().collect(),
        })
    }

    /// Save the graph to a file.
    pub fn save(&self, path: &Path) -> Result<(), GraphError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Load a graph from a file.
    pub fn load(path: &Path) -> Result<Self, GraphError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

fn dot_id(node: &ImportNode) -> String {
    let label = node.to_string();
    format!("\"{}\"", label.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::chain::ImportLocation;
    use crate::syntax::ImportMode;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn node(path: &str) -> ImportNode {
        ImportNode::Import(ChainedImport::new(
            ImportLocation::Local(PathBuf::from(path)),
            ImportMode::Code,
        ))
    }

    fn sample() -> ImportGraph {
        let mut graph = ImportGraph::new();
        graph.add_edge(ImportNode::Root, node("/p/a.sable"));
        graph.add_edge(node("/p/a.sable"), node("/p/b.sable"));
        graph.add_edge(ImportNode::Root, node("/p/c.sable"));
        graph
    }

    #[test]
    fn test_edges_keep_discovery_order() {
        let mut graph = sample();
        assert!(!graph.add_edge(ImportNode::Root, node("/p/a.sable")));
        let targets: Vec<_> = graph.edges().map(|e| e.to.to_string()).collect();
        assert_eq!(targets, vec!["/p/a.sable", "/p/b.sable", "/p/c.sable"]);
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn test_dependencies_and_dependents() {
        let graph = sample();
        let root_deps: Vec<_> = graph.dependencies_of(&ImportNode::Root).cloned().collect();
        assert_eq!(root_deps, vec![node("/p/a.sable"), node("/p/c.sable")]);

        let b = node("/p/b.sable");
        let dependents: Vec<_> = graph.dependents_of(&b).cloned().collect();
        assert_eq!(dependents, vec![node("/p/a.sable")]);
    }

    #[test]
    fn test_depends_on_transitive() {
        let graph = sample();
        assert!(graph.depends_on(&ImportNode::Root, &node("/p/b.sable")));
        assert!(!graph.depends_on(&node("/p/c.sable"), &node("/p/b.sable")));
    }

    #[test]
    fn test_nodes_in_first_appearance_order() {
        let graph = sample();
        let nodes: Vec<String> = graph.nodes().into_iter().map(ToString::to_string).collect();
        assert_eq!(nodes, vec!["<root>", "/p/a.sable", "/p/b.sable", "/p/c.sable"]);
    }

    #[test]
    fn test_truncate() {
        let mut graph = sample();
        graph.truncate(1);
        assert_eq!(graph.len(), 1);
        assert!(graph.contains(&ImportNode::Root, &node("/p/a.sable")));
    }

    #[test]
    fn test_dot_output() {
        let mut graph = ImportGraph::new();
        graph.add_edge(ImportNode::Root, node("/p/a \"quoted\".sable"));
        assert_eq!(
            graph.to_dot(),
            "digraph imports {\n    \"<root>\" -> \"/p/a \\\"quoted\\\".sable\";\n}\n"
        );
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("graph.json");
        let graph = sample();
        graph.save(&path).unwrap();
        assert_eq!(ImportGraph::load(&path).unwrap(), graph);
    }
}
