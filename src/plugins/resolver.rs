//! Plugin dependency resolution
//!
//! Initialization order is a topological sort of the dependency graph
//! (Kahn's algorithm). Among plugins whose dependencies are all satisfied,
//! the one registered first goes first, so the order is reproducible.

use indexmap::{IndexMap, IndexSet};
use std::collections::BTreeSet;
use tracing::debug;

use crate::simulation::StructuralError;
use crate::types::PluginId;

/// Dependency graph over registered plugins
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Plugin id to its dependencies, in registration order
    nodes: IndexMap<PluginId, Vec<PluginId>>,
}

impl DependencyGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin node
    pub fn register(&mut self, id: PluginId, dependencies: Vec<PluginId>) -> Result<(), StructuralError> {
        if self.nodes.contains_key(&id) {
            return Err(StructuralError::DuplicatePlugin(id));
        }
        self.nodes.insert(id, dependencies);
        Ok(())
    }

    /// Number of registered plugins
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the graph is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Initialization order in which every plugin follows its dependencies
    pub fn resolve_order(&self) -> Result<Vec<PluginId>, StructuralError> {
        let mut in_degree: Vec<usize> = vec![0; self.nodes.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];

        for (index, (id, dependencies)) in self.nodes.iter().enumerate() {
            for dependency in dependencies {
                let Some(dependency_index) = self.nodes.get_index_of(dependency) else {
                    return Err(StructuralError::MissingPluginDependency {
                        plugin: id.clone(),
                        dependency: dependency.clone(),
                    });
                };
                in_degree[index] += 1;
                dependents[dependency_index].push(index);
            }
        }

        // Ready set ordered by registration index
        let mut ready: BTreeSet<usize> =
            (0..self.nodes.len()).filter(|&index| in_degree[index] == 0).collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(index) = ready.pop_first() {
            order.push(index);
            for &dependent in &dependents[index] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() != self.nodes.len() {
            let involved: Vec<PluginId> = self
                .nodes
                .keys()
                .enumerate()
                .filter(|(index, _)| in_degree[*index] > 0)
                .map(|(_, id)| id.clone())
                .collect();
            return Err(StructuralError::CyclicDependency { involved });
        }

        let order: Vec<PluginId> = order
            .into_iter()
            .filter_map(|index| self.nodes.get_index(index).map(|(id, _)| id.clone()))
            .collect();
        debug!("Resolved plugin order: {:?}", order);
        Ok(order)
    }

    /// The plugin itself and everything it depends on, directly or not
    pub fn closure(&self, id: &PluginId) -> IndexSet<PluginId> {
        let mut reached = IndexSet::new();
        let mut stack = vec![id.clone()];
        while let Some(next) = stack.pop() {
            if !reached.insert(next.clone()) {
                continue;
            }
            if let Some(dependencies) = self.nodes.get(&next) {
                stack.extend(dependencies.iter().cloned());
            }
        }
        reached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<PluginId> {
        names.iter().map(|name| PluginId::new(*name)).collect()
    }

    fn graph(edges: &[(&str, &[&str])]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for (id, dependencies) in edges {
            graph.register(PluginId::new(*id), ids(dependencies)).unwrap();
        }
        graph
    }

    #[test]
    fn test_dependency_first() {
        let graph = graph(&[("p2", &["p1"]), ("p1", &[])]);
        assert_eq!(graph.resolve_order().unwrap(), ids(&["p1", "p2"]));
    }

    #[test]
    fn test_two_node_cycle() {
        let graph = graph(&[("p1", &["p2"]), ("p2", &["p1"])]);
        let error = graph.resolve_order().unwrap_err();
        assert_eq!(error, StructuralError::CyclicDependency { involved: ids(&["p1", "p2"]) });
    }

    #[test]
    fn test_ties_follow_registration_order() {
        let graph = graph(&[
            ("reports", &["people"]),
            ("people", &[]),
            ("regions", &[]),
            ("contagion", &["people", "regions"]),
        ]);
        assert_eq!(
            graph.resolve_order().unwrap(),
            ids(&["people", "reports", "regions", "contagion"])
        );
    }

    #[test]
    fn test_cycle_reports_only_blocked_plugins() {
        let graph = graph(&[("base", &[]), ("a", &["b", "base"]), ("b", &["a"]), ("c", &["a"])]);
        let StructuralError::CyclicDependency { involved } = graph.resolve_order().unwrap_err() else {
            panic!("expected a cycle");
        };
        assert_eq!(involved, ids(&["a", "b", "c"]));
    }

    #[test]
    fn test_missing_dependency() {
        let graph = graph(&[("a", &["ghost"])]);
        assert_eq!(
            graph.resolve_order().unwrap_err(),
            StructuralError::MissingPluginDependency {
                plugin: PluginId::new("a"),
                dependency: PluginId::new("ghost"),
            }
        );
    }

    #[test]
    fn test_duplicate_plugin() {
        let mut graph = DependencyGraph::new();
        graph.register(PluginId::new("a"), Vec::new()).unwrap();
        let error = graph.register(PluginId::new("a"), Vec::new()).unwrap_err();
        assert_eq!(error, StructuralError::DuplicatePlugin(PluginId::new("a")));
    }

    #[test]
    fn test_transitive_closure() {
        let graph = graph(&[("a", &[]), ("b", &["a"]), ("c", &["b"]), ("d", &[])]);
        let closure = graph.closure(&PluginId::new("c"));
        assert!(closure.contains(&PluginId::new("a")));
        assert!(closure.contains(&PluginId::new("c")));
        assert!(!closure.contains(&PluginId::new("d")));
    }
}
