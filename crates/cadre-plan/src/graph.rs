use std::collections::HashMap;

use crate::node::NodeDefinition;

/// Dependency structure of a plan, built once per validated plan.
///
/// Holds both edge directions: `dependencies` answers "what must finish
/// before this node", `dependents` answers "who to wake when this node
/// finishes".
#[derive(Debug, Clone)]
pub struct DependencyIndex {
  /// node_id -> nodes it depends on.
  dependencies: HashMap<String, Vec<String>>,
  /// node_id -> nodes that depend on it.
  dependents: HashMap<String, Vec<String>>,
  /// Nodes with no dependencies.
  entry_points: Vec<String>,
}

impl DependencyIndex {
  /// Build the index from a node list.
  ///
  /// Assumes dependency references have already been validated; unknown
  /// IDs would simply produce unreachable map entries.
  pub fn new(nodes: &[NodeDefinition]) -> Self {
    let mut dependencies: HashMap<String, Vec<String>> = HashMap::new();
    let mut dependents: HashMap<String, Vec<String>> = HashMap::new();

    for node in nodes {
      dependencies
        .entry(node.id.clone())
        .or_default()
        .extend(node.dependencies.iter().cloned());
      dependents.entry(node.id.clone()).or_default();
    }

    for node in nodes {
      for dep in &node.dependencies {
        dependents
          .entry(dep.clone())
          .or_default()
          .push(node.id.clone());
      }
    }

    let entry_points: Vec<String> = nodes
      .iter()
      .filter(|n| n.dependencies.is_empty())
      .map(|n| n.id.clone())
      .collect();

    Self {
      dependencies,
      dependents,
      entry_points,
    }
  }

  /// Nodes with no dependencies, in plan order.
  pub fn entry_points(&self) -> &[String] {
    &self.entry_points
  }

  /// Nodes the given node depends on.
  pub fn dependencies(&self, node_id: &str) -> &[String] {
    self
      .dependencies
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Nodes that depend on the given node.
  pub fn dependents(&self, node_id: &str) -> &[String] {
    self
      .dependents
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::node::NodeKind;

  fn node(id: &str, deps: &[&str]) -> NodeDefinition {
    let mut n = NodeDefinition::new(id, NodeKind::Task, id);
    n.dependencies = deps.iter().map(|d| d.to_string()).collect();
    n
  }

  #[test]
  fn test_diamond_index() {
    let nodes = vec![
      node("a", &[]),
      node("b", &["a"]),
      node("c", &["a"]),
      node("d", &["b", "c"]),
    ];
    let index = DependencyIndex::new(&nodes);

    assert_eq!(index.entry_points(), ["a".to_string()]);
    assert_eq!(index.dependents("a"), ["b".to_string(), "c".to_string()]);
    assert_eq!(index.dependencies("d"), ["b".to_string(), "c".to_string()]);
    assert!(index.dependents("d").is_empty());
  }

  #[test]
  fn test_unknown_node_is_empty() {
    let index = DependencyIndex::new(&[node("a", &[])]);
    assert!(index.dependents("missing").is_empty());
    assert!(index.dependencies("missing").is_empty());
  }
}
