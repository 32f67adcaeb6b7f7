use thiserror::Error;

/// Structural validation errors. All are construction-time and fatal;
/// none are retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
  #[error("plan '{plan_id}' contains no nodes")]
  EmptyPlan { plan_id: String },

  #[error("duplicate node id '{id}'")]
  DuplicateNode { id: String },

  #[error("node '{node_id}' depends on unknown node '{dependency}'")]
  UnknownDependency { node_id: String, dependency: String },

  #[error("dependency cycle: edge '{from}' -> '{to}' closes a cycle")]
  Cycle { from: String, to: String },

  #[error("entry node '{id}' not found in plan")]
  UnknownEntryNode { id: String },

  #[error("no entry nodes (every node has at least one dependency)")]
  NoEntryNodes,
}
