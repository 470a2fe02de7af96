//! Dependency graph
//!
//! Nodes are created when the graph is constructed from declared inputs
//! and are never removed within a pass. Edges run from a dependency to its
//! dependent; production graphs must be acyclic.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

/// Graph construction error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Two nodes declared the same name.
    #[error("duplicate node '{0}'")]
    DuplicateNode(String),

    /// A node depends on a name that is not in the graph.
    #[error("node '{node}' depends on unknown node '{dependency}'")]
    UnknownDependency {
        /// The declaring node.
        node: String,
        /// The missing dependency.
        dependency: String,
    },

    /// The declared dependencies contain a cycle.
    #[error("dependency cycle: {}", path.join(" -> "))]
    Cycle {
        /// One node sequence that closes the cycle.
        path: Vec<String>,
    },
}

/// One library to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildNode {
    /// Node identity; also names the produced artifact.
    pub name: String,
    /// Source location the external tool runs in.
    pub source: PathBuf,
    /// Names of nodes this one depends on.
    pub deps: Vec<String>,
}

/// The declared dependency graph for one build pass.
#[derive(Debug, Clone, Default)]
pub struct BuildGraph {
    nodes: Vec<BuildNode>,
    index: HashMap<String, usize>,
}

impl BuildGraph {
    /// Empty graph.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node.
    ///
    /// # Errors
    /// Returns [`GraphError::DuplicateNode`] when the name is taken.
    pub fn add_node(&mut self, node: BuildNode) -> Result<(), GraphError> {
        if self.index.contains_key(&node.name) {
            return Err(GraphError::DuplicateNode(node.name));
        }
        self.index.insert(node.name.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    /// Check referential integrity and acyclicity.
    ///
    /// # Errors
    /// [`GraphError::UnknownDependency`] or [`GraphError::Cycle`].
    pub fn validate(&self) -> Result<(), GraphError> {
        for node in &self.nodes {
            for dep in &node.deps {
                if !self.index.contains_key(dep) {
                    return Err(GraphError::UnknownDependency {
                        node: node.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
        self.check_cycles()
    }

    /// Look up a node by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&BuildNode> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    /// Nodes in declaration order.
    #[must_use]
    pub fn nodes(&self) -> &[BuildNode] {
        &self.nodes
    }

    /// Node names in declaration order.
    #[must_use]
    pub fn node_names(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.name.clone()).collect()
    }

    /// All `(dependency, dependent)` edges.
    #[must_use]
    pub fn edges(&self) -> Vec<(String, String)> {
        let mut edges = Vec::new();
        for node in &self.nodes {
            for dep in &node.deps {
                edges.push((dep.clone(), node.name.clone()));
            }
        }
        edges
    }

    /// Number of unresolved dependencies per node.
    #[must_use]
    pub fn in_degrees(&self) -> BTreeMap<String, usize> {
        self.nodes
            .iter()
            .map(|n| (n.name.clone(), n.deps.len()))
            .collect()
    }

    /// Map from a node to the nodes depending on it.
    #[must_use]
    pub fn dependents(&self) -> BTreeMap<String, Vec<String>> {
        let mut map: BTreeMap<String, Vec<String>> = self
            .nodes
            .iter()
            .map(|n| (n.name.clone(), Vec::new()))
            .collect();
        for node in &self.nodes {
            for dep in &node.deps {
                if let Some(list) = map.get_mut(dep) {
                    list.push(node.name.clone());
                }
            }
        }
        map
    }

    /// Number of nodes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn check_cycles(&self) -> Result<(), GraphError> {
        let mut visiting = HashSet::new();
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for node in &self.nodes {
            self.dfs(&node.name, &mut visiting, &mut visited, &mut stack)?;
        }
        Ok(())
    }

    fn dfs(
        &self,
        name: &str,
        visiting: &mut HashSet<String>,
        visited: &mut HashSet<String>,
        stack: &mut Vec<String>,
    ) -> Result<(), GraphError> {
        if visited.contains(name) {
            return Ok(());
        }
        if visiting.contains(name) {
            let start = stack.iter().position(|n| n == name).unwrap_or(0);
            let mut path: Vec<String> = stack[start..].to_vec();
            path.push(name.to_string());
            return Err(GraphError::Cycle { path });
        }

        visiting.insert(name.to_string());
        stack.push(name.to_string());

        if let Some(node) = self.get(name) {
            for dep in &node.deps {
                self.dfs(dep, visiting, visited, stack)?;
            }
        }

        stack.pop();
        visiting.remove(name);
        visited.insert(name.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn node(name: &str, deps: &[&str]) -> BuildNode {
        BuildNode {
            name: name.to_string(),
            source: Path::new("src").join(name),
            deps: deps.iter().map(|d| (*d).to_string()).collect(),
        }
    }

    fn graph_of(nodes: &[BuildNode]) -> BuildGraph {
        let mut graph = BuildGraph::new();
        for n in nodes {
            graph.add_node(n.clone()).unwrap();
        }
        graph
    }

    #[test]
    fn valid_chain_passes_validation() {
        let graph = graph_of(&[node("a", &[]), node("b", &["a"]), node("c", &["b"])]);
        assert!(graph.validate().is_ok());
        assert_eq!(graph.edges().len(), 2);
    }

    #[test]
    fn duplicate_node_rejected() {
        let mut graph = graph_of(&[node("a", &[])]);
        let err = graph.add_node(node("a", &[])).unwrap_err();
        assert_eq!(err, GraphError::DuplicateNode("a".to_string()));
    }

    #[test]
    fn unknown_dependency_rejected() {
        let graph = graph_of(&[node("a", &["ghost"])]);
        let err = graph.validate().unwrap_err();
        assert!(matches!(
            err,
            GraphError::UnknownDependency { node, dependency }
                if node == "a" && dependency == "ghost"
        ));
    }

    #[test]
    fn cycle_reported_with_path() {
        let graph = graph_of(&[node("a", &["c"]), node("b", &["a"]), node("c", &["b"])]);
        let err = graph.validate().unwrap_err();
        match err {
            GraphError::Cycle { path } => {
                assert!(path.len() >= 3, "path: {path:?}");
                assert_eq!(path.first(), path.last());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn in_degrees_and_dependents_agree() {
        let graph = graph_of(&[node("a", &[]), node("b", &["a"]), node("c", &["a", "b"])]);

        let degrees = graph.in_degrees();
        assert_eq!(degrees["a"], 0);
        assert_eq!(degrees["b"], 1);
        assert_eq!(degrees["c"], 2);

        let dependents = graph.dependents();
        assert_eq!(dependents["a"], vec!["b".to_string(), "c".to_string()]);
        assert!(dependents["c"].is_empty());
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let graph = graph_of(&[node("a", &["a"])]);
        assert!(matches!(graph.validate(), Err(GraphError::Cycle { .. })));
    }
}
