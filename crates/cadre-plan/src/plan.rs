use serde::{Deserialize, Serialize};

use crate::node::NodeDefinition;

/// A declarative plan: an ordered set of nodes with inter-node
/// dependencies.
///
/// This is the wire-level definition as authored or generated by a
/// planner. It is not executable until it has passed validation; see
/// [`crate::ValidatedPlan`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDefinition {
  pub id: String,
  pub name: String,
  pub nodes: Vec<NodeDefinition>,
  /// Node IDs eligible at run start. Derived from nodes with no
  /// dependencies when not supplied.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub entry_nodes: Option<Vec<String>>,
  /// Initial shared variables for a run.
  #[serde(default)]
  pub variables: serde_json::Map<String, serde_json::Value>,
}

impl PlanDefinition {
  /// Create an empty plan with the given identity.
  pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      name: name.into(),
      nodes: Vec::new(),
      entry_nodes: None,
      variables: serde_json::Map::new(),
    }
  }

  /// Look up a node by ID.
  pub fn node(&self, node_id: &str) -> Option<&NodeDefinition> {
    self.nodes.iter().find(|n| n.id == node_id)
  }
}
