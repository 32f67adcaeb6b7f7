//! Run result aggregation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::state::{NodeExecution, NodeStatus, RunState};

/// Immutable summary of one run, produced once every node has reached a
/// terminal state (or the run was stopped).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
  pub execution_id: String,
  pub plan_id: String,
  /// True iff the run raised no error and every node completed.
  pub success: bool,
  pub total_nodes: usize,
  pub completed: usize,
  pub failed: usize,
  pub blocked: usize,
  pub skipped: usize,
  pub duration_ms: u64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  /// Full per-node records, in plan order.
  pub executions: Vec<NodeExecution>,
  /// Captured outputs of completed nodes.
  pub outputs: HashMap<String, serde_json::Value>,
}

/// Tally the run state into a result.
///
/// Callable on every path: normal completion, the hard-failure error
/// path, and a stopped run (where non-terminal nodes simply do not count
/// toward any tally).
pub(crate) fn aggregate<'a>(
  plan_id: &str,
  execution_id: &str,
  node_order: impl Iterator<Item = &'a str>,
  state: &RunState,
  outputs: HashMap<String, serde_json::Value>,
  duration_ms: u64,
  error: Option<String>,
) -> ExecutionResult {
  let executions: Vec<NodeExecution> = node_order
    .filter_map(|id| state.executions.get(id).cloned())
    .collect();

  let count = |status: NodeStatus| executions.iter().filter(|e| e.status == status).count();
  let completed = count(NodeStatus::Completed);

  ExecutionResult {
    execution_id: execution_id.to_string(),
    plan_id: plan_id.to_string(),
    success: error.is_none() && completed == executions.len(),
    total_nodes: executions.len(),
    completed,
    failed: count(NodeStatus::Failed),
    blocked: count(NodeStatus::Blocked),
    skipped: count(NodeStatus::Skipped),
    duration_ms,
    error,
    executions,
    outputs,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn state_with(statuses: &[(&str, NodeStatus)]) -> RunState {
    let mut state = RunState::new(statuses.iter().map(|(id, _)| *id));
    for (id, status) in statuses {
      state.executions.get_mut(*id).unwrap().status = *status;
    }
    state
  }

  #[test]
  fn test_fully_successful_run() {
    let state = state_with(&[
      ("a", NodeStatus::Completed),
      ("b", NodeStatus::Completed),
    ]);
    let result = aggregate(
      "p",
      "e",
      ["a", "b"].into_iter(),
      &state,
      HashMap::new(),
      12,
      None,
    );

    assert!(result.success);
    assert_eq!(result.total_nodes, 2);
    assert_eq!(result.completed, 2);
    assert_eq!(result.failed + result.blocked + result.skipped, 0);
  }

  #[test]
  fn test_counts_never_exceed_total() {
    let state = state_with(&[
      ("a", NodeStatus::Failed),
      ("b", NodeStatus::Blocked),
      ("c", NodeStatus::Completed),
      ("d", NodeStatus::Pending),
    ]);
    let result = aggregate(
      "p",
      "e",
      ["a", "b", "c", "d"].into_iter(),
      &state,
      HashMap::new(),
      5,
      Some("a failed".to_string()),
    );

    assert!(!result.success);
    assert_eq!(result.total_nodes, 4);
    assert!(result.completed + result.failed + result.blocked + result.skipped <= result.total_nodes);
    assert_eq!(result.failed, 1);
    assert_eq!(result.blocked, 1);
    // Records come back in plan order.
    assert_eq!(result.executions[0].node_id, "a");
    assert_eq!(result.executions[3].node_id, "d");
  }

  #[test]
  fn test_no_error_but_incomplete_is_not_success() {
    let state = state_with(&[("a", NodeStatus::Completed), ("b", NodeStatus::Pending)]);
    let result = aggregate(
      "p",
      "e",
      ["a", "b"].into_iter(),
      &state,
      HashMap::new(),
      5,
      None,
    );
    assert!(!result.success);
  }
}
