//! Transitive blockage propagation.

use std::collections::VecDeque;

use cadre_plan::DependencyIndex;

use crate::state::{NodeStatus, RunState};

/// Mark every still-pending transitive dependent of `failed_node` as
/// blocked.
///
/// Breadth-first over the dependents map. Only `Pending` nodes that no
/// executor task owns are blocked; running, terminal, and already-blocked
/// nodes are left untouched and do not extend the traversal, which makes
/// revisits idempotent. `continue_on_error` on an intermediate node does
/// not stop the cascade - once blocked, a node never runs.
///
/// Runs under the executor's state lock. Returns the newly blocked node
/// IDs so the caller can emit events after releasing it.
pub(crate) fn propagate_blocked(
  index: &DependencyIndex,
  state: &mut RunState,
  failed_node: &str,
) -> Vec<String> {
  let RunState {
    executions,
    in_flight,
    ..
  } = state;

  let mut queue: VecDeque<String> = index.dependents(failed_node).iter().cloned().collect();
  let mut blocked = Vec::new();

  while let Some(node_id) = queue.pop_front() {
    let Some(execution) = executions.get_mut(&node_id) else {
      continue;
    };
    if execution.status != NodeStatus::Pending || in_flight.contains(&node_id) {
      continue;
    }

    execution.status = NodeStatus::Blocked;
    blocked.push(node_id.clone());
    queue.extend(index.dependents(&node_id).iter().cloned());
  }

  blocked
}

#[cfg(test)]
mod tests {
  use super::*;
  use cadre_plan::{NodeDefinition, NodeKind};

  fn node(id: &str, deps: &[&str]) -> NodeDefinition {
    let mut n = NodeDefinition::new(id, NodeKind::Task, id);
    n.dependencies = deps.iter().map(|d| d.to_string()).collect();
    n
  }

  fn chain() -> (DependencyIndex, RunState) {
    let nodes = vec![node("a", &[]), node("b", &["a"]), node("c", &["b"])];
    let index = DependencyIndex::new(&nodes);
    let state = RunState::new(["a", "b", "c"].into_iter());
    (index, state)
  }

  #[test]
  fn test_blockage_cascades_through_chain() {
    let (index, mut state) = chain();
    state.executions.get_mut("a").unwrap().status = NodeStatus::Failed;

    let blocked = propagate_blocked(&index, &mut state, "a");

    assert_eq!(blocked, vec!["b".to_string(), "c".to_string()]);
    assert_eq!(state.executions["b"].status, NodeStatus::Blocked);
    assert_eq!(state.executions["c"].status, NodeStatus::Blocked);
  }

  #[test]
  fn test_propagation_is_idempotent() {
    let (index, mut state) = chain();
    state.executions.get_mut("a").unwrap().status = NodeStatus::Failed;

    propagate_blocked(&index, &mut state, "a");
    let second = propagate_blocked(&index, &mut state, "a");

    assert!(second.is_empty());
  }

  #[test]
  fn test_non_pending_dependents_untouched() {
    let nodes = vec![
      node("a", &[]),
      node("b", &["a"]),
      node("c", &["a"]),
      node("d", &["b"]),
    ];
    let index = DependencyIndex::new(&nodes);
    let mut state = RunState::new(["a", "b", "c", "d"].into_iter());
    state.executions.get_mut("a").unwrap().status = NodeStatus::Failed;
    state.executions.get_mut("b").unwrap().status = NodeStatus::Running;
    state.executions.get_mut("c").unwrap().status = NodeStatus::Completed;

    let blocked = propagate_blocked(&index, &mut state, "a");

    // A running dependent is left alone and does not extend the
    // traversal to its own dependents.
    assert!(blocked.is_empty());
    assert_eq!(state.executions["b"].status, NodeStatus::Running);
    assert_eq!(state.executions["c"].status, NodeStatus::Completed);
    assert_eq!(state.executions["d"].status, NodeStatus::Pending);
  }

  #[test]
  fn test_in_flight_retrying_node_not_blocked() {
    let (index, mut state) = chain();
    state.executions.get_mut("a").unwrap().status = NodeStatus::Failed;
    // "b" is parked in retry backoff: status Pending but owned by a task.
    state.in_flight.insert("b".to_string());

    let blocked = propagate_blocked(&index, &mut state, "a");

    assert!(blocked.is_empty());
    assert_eq!(state.executions["b"].status, NodeStatus::Pending);
  }
}
