use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default per-node execution timeout (5 minutes).
pub const DEFAULT_TIMEOUT_MS: u64 = 300_000;

/// The kind of work a node represents.
///
/// The engine never interprets the kind beyond using it to resolve a
/// handler; semantics live entirely in the registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
  Task,
  Condition,
  Parallel,
  Merge,
  Loop,
}

impl NodeKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      NodeKind::Task => "task",
      NodeKind::Condition => "condition",
      NodeKind::Parallel => "parallel",
      NodeKind::Merge => "merge",
      NodeKind::Loop => "loop",
    }
  }
}

impl fmt::Display for NodeKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Retry behavior for a node whose handler fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
  /// Number of retries after the initial attempt.
  pub max_retries: u32,
  /// Base delay between attempts.
  pub backoff_ms: u64,
  /// Double the delay on each successive retry.
  #[serde(default)]
  pub exponential: bool,
}

impl RetryPolicy {
  /// Delay before the given retry (1-based).
  ///
  /// Flat `backoff_ms`, or `backoff_ms * 2^(retry - 1)` when exponential.
  pub fn delay_for(&self, retry: u32) -> Duration {
    let ms = if self.exponential {
      self
        .backoff_ms
        .saturating_mul(1u64 << retry.saturating_sub(1).min(63))
    } else {
      self.backoff_ms
    };
    Duration::from_millis(ms)
  }
}

/// Static description of one unit of work in a plan.
///
/// Immutable once the plan has been validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
  pub id: String,
  #[serde(rename = "type")]
  pub kind: NodeKind,
  pub name: String,
  /// Node IDs that must resolve before this node is eligible.
  #[serde(default)]
  pub dependencies: Vec<String>,
  /// Opaque configuration, forwarded verbatim to the handler.
  #[serde(default)]
  pub config: serde_json::Value,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub retry: Option<RetryPolicy>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
  /// Allow dependents to proceed even if this node ultimately fails.
  #[serde(default)]
  pub continue_on_error: bool,
}

impl NodeDefinition {
  /// Create a node with no dependencies and default execution settings.
  pub fn new(id: impl Into<String>, kind: NodeKind, name: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      kind,
      name: name.into(),
      dependencies: Vec::new(),
      config: serde_json::Value::Null,
      retry: None,
      timeout_ms: None,
      continue_on_error: false,
    }
  }

  /// The timeout applied when racing this node's handler.
  pub fn effective_timeout_ms(&self) -> u64 {
    self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)
  }
}
