//! Run-scoped shared state.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::{Map, Value};

/// Shared state for one run of a plan.
///
/// `variables` are readable and writable by every handler in the run;
/// `outputs` are written once per node by the engine when the node
/// completes. Both sit behind locks because handlers for different nodes
/// run concurrently. A run owns its context exclusively; concurrent runs
/// of the same plan never share one.
pub struct ExecutionContext {
  plan_id: String,
  execution_id: String,
  variables: RwLock<Map<String, Value>>,
  outputs: RwLock<HashMap<String, Value>>,
  metadata: Map<String, Value>,
}

impl ExecutionContext {
  pub(crate) fn new(
    plan_id: impl Into<String>,
    execution_id: impl Into<String>,
    variables: Map<String, Value>,
  ) -> Self {
    Self {
      plan_id: plan_id.into(),
      execution_id: execution_id.into(),
      variables: RwLock::new(variables),
      outputs: RwLock::new(HashMap::new()),
      metadata: Map::new(),
    }
  }

  pub fn plan_id(&self) -> &str {
    &self.plan_id
  }

  pub fn execution_id(&self) -> &str {
    &self.execution_id
  }

  pub fn metadata(&self) -> &Map<String, Value> {
    &self.metadata
  }

  /// Read one shared variable.
  pub fn variable(&self, key: &str) -> Option<Value> {
    self.variables.read().unwrap().get(key).cloned()
  }

  /// Write one shared variable.
  ///
  /// Last write wins; handlers that mutate the same key from concurrent
  /// nodes must coordinate by convention.
  pub fn set_variable(&self, key: impl Into<String>, value: Value) {
    self.variables.write().unwrap().insert(key.into(), value);
  }

  /// Snapshot of all shared variables.
  pub fn variables(&self) -> Map<String, Value> {
    self.variables.read().unwrap().clone()
  }

  /// The captured output of a completed node.
  pub fn output(&self, node_id: &str) -> Option<Value> {
    self.outputs.read().unwrap().get(node_id).cloned()
  }

  /// Snapshot of all captured outputs.
  pub fn outputs(&self) -> HashMap<String, Value> {
    self.outputs.read().unwrap().clone()
  }

  /// Record a node's output. Completion handling runs before any
  /// dependent is dispatched, so dependents always observe it.
  pub(crate) fn record_output(&self, node_id: impl Into<String>, value: Value) {
    self.outputs.write().unwrap().insert(node_id.into(), value);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_variables_read_write() {
    let mut seed = Map::new();
    seed.insert("env".to_string(), json!("staging"));
    let ctx = ExecutionContext::new("p", "e", seed);

    assert_eq!(ctx.variable("env"), Some(json!("staging")));
    ctx.set_variable("attempted", json!(true));
    assert_eq!(ctx.variable("attempted"), Some(json!(true)));
    assert_eq!(ctx.variables().len(), 2);
  }

  #[test]
  fn test_outputs_recorded_per_node() {
    let ctx = ExecutionContext::new("p", "e", Map::new());
    assert_eq!(ctx.output("a"), None);

    ctx.record_output("a", json!({"rows": 3}));
    assert_eq!(ctx.output("a"), Some(json!({"rows": 3})));
    assert_eq!(ctx.outputs().len(), 1);
  }
}
