//! Engine errors.

use cadre_plan::NodeKind;
use thiserror::Error;

use crate::result::ExecutionResult;

/// One failed node, carried as structured detail on a run-level failure.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedNode {
  pub node_id: String,
  pub message: String,
}

/// Errors surfaced by the execution engine.
#[derive(Debug, Error)]
pub enum EngineError {
  /// No handler registered for a node's kind. Fatal for that node,
  /// never retried.
  #[error("no handler registered for node kind '{kind}'")]
  MissingHandler { kind: NodeKind },

  /// `execute()` called while a previous run on this instance has not
  /// finished.
  #[error("execution already in progress for plan '{plan_id}'")]
  AlreadyRunning { plan_id: String },

  /// The run completed with hard failures. The message names the single
  /// failing node's own error when exactly one node failed, and is a
  /// count-based summary otherwise; `failed` and `result` carry the full
  /// detail either way.
  #[error("{message}")]
  ExecutionFailed {
    message: String,
    failed: Vec<FailedNode>,
    result: Box<ExecutionResult>,
  },

  /// The runner's trigger channel is closed.
  #[error("plan runner channel closed")]
  ChannelClosed,
}

impl EngineError {
  /// The result computed for the run, when this error carries one.
  pub fn result(&self) -> Option<&ExecutionResult> {
    match self {
      EngineError::ExecutionFailed { result, .. } => Some(result),
      _ => None,
    }
  }
}
