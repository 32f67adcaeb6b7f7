//! Per-run execution records and the node status state machine.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of one node within a run.
///
/// Transitions: `Pending -> Running -> {Completed | Failed}`, with
/// `Running -> Pending` while a retry is parked in backoff, and
/// `Pending -> Blocked` when an upstream failure cascades. `Skipped` is
/// reserved in the result schema; no engine transition produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
  Pending,
  Running,
  Completed,
  Failed,
  Blocked,
  Skipped,
}

impl NodeStatus {
  /// Terminal statuses never change again for the rest of the run.
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      NodeStatus::Completed | NodeStatus::Failed | NodeStatus::Blocked | NodeStatus::Skipped
    )
  }
}

/// Error recorded on a failed or retrying node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeError {
  pub message: String,
  /// Retries consumed so far.
  pub retry_count: u32,
}

/// Mutable per-run record for one node.
///
/// Created in `Pending` at run start, mutated only by the engine, never
/// removed during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecution {
  pub node_id: String,
  pub status: NodeStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub started_at: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub finished_at: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub duration_ms: Option<u64>,
  pub attempts: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub output: Option<serde_json::Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<NodeError>,
}

impl NodeExecution {
  pub(crate) fn new(node_id: impl Into<String>) -> Self {
    Self {
      node_id: node_id.into(),
      status: NodeStatus::Pending,
      started_at: None,
      finished_at: None,
      duration_ms: None,
      attempts: 0,
      output: None,
      error: None,
    }
  }

  /// Stamp the end of execution and derive the duration of the last
  /// attempt.
  pub(crate) fn finish(&mut self, status: NodeStatus) {
    let now = Utc::now();
    if let Some(started) = self.started_at {
      self.duration_ms = Some((now - started).num_milliseconds().max(0) as u64);
    }
    self.finished_at = Some(now);
    self.status = status;
  }
}

/// Engine bookkeeping for one run.
///
/// Every transition happens under the executor's lock; `in_flight`
/// tracks nodes owned by a spawned executor task (including nodes parked
/// in retry backoff, whose status is transiently `Pending`).
pub(crate) struct RunState {
  pub executions: HashMap<String, NodeExecution>,
  pub in_flight: HashSet<String>,
  pub stopped: bool,
}

impl RunState {
  pub fn empty() -> Self {
    Self {
      executions: HashMap::new(),
      in_flight: HashSet::new(),
      stopped: false,
    }
  }

  pub fn new<'a>(node_ids: impl Iterator<Item = &'a str>) -> Self {
    Self {
      executions: node_ids
        .map(|id| (id.to_string(), NodeExecution::new(id)))
        .collect(),
      in_flight: HashSet::new(),
      stopped: false,
    }
  }

  /// The run is complete when no node remains `Pending` or `Running`.
  pub fn all_terminal(&self) -> bool {
    self.executions.values().all(|e| e.status.is_terminal())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_terminal_statuses() {
    assert!(!NodeStatus::Pending.is_terminal());
    assert!(!NodeStatus::Running.is_terminal());
    assert!(NodeStatus::Completed.is_terminal());
    assert!(NodeStatus::Failed.is_terminal());
    assert!(NodeStatus::Blocked.is_terminal());
    assert!(NodeStatus::Skipped.is_terminal());
  }

  #[test]
  fn test_all_terminal() {
    let mut state = RunState::new(["a", "b"].into_iter());
    assert!(!state.all_terminal());

    state.executions.get_mut("a").unwrap().status = NodeStatus::Completed;
    assert!(!state.all_terminal());

    state.executions.get_mut("b").unwrap().status = NodeStatus::Blocked;
    assert!(state.all_terminal());
  }

  #[test]
  fn test_finish_stamps_duration() {
    let mut exec = NodeExecution::new("a");
    exec.started_at = Some(Utc::now());
    exec.finish(NodeStatus::Completed);

    assert_eq!(exec.status, NodeStatus::Completed);
    assert!(exec.finished_at.is_some());
    assert!(exec.duration_ms.is_some());
  }
}
