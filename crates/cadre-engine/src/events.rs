//! Execution events and notifiers for observability.
//!
//! Events are emitted during plan execution so consumers can observe
//! progress, persist state, stream to UIs, etc. The engine's only
//! coupling to logging and metrics backends is through these events.

use cadre_plan::NodeKind;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted during plan execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecutionEvent {
  /// A run has started.
  ExecutionStarted {
    execution_id: String,
    plan_id: String,
  },

  /// A run finished with every node completed.
  ExecutionCompleted {
    execution_id: String,
    duration_ms: u64,
  },

  /// A run finished with at least one hard failure.
  ExecutionFailed {
    execution_id: String,
    error: String,
  },

  /// A run was stopped cooperatively before completion.
  ExecutionStopped { execution_id: String },

  /// A node was dispatched. `attempt` is 1 on the first dispatch.
  NodeStarted {
    execution_id: String,
    node_id: String,
    attempt: u32,
  },

  /// A node's handler succeeded.
  NodeCompleted {
    execution_id: String,
    node_id: String,
    duration_ms: u64,
  },

  /// A node failed and will be re-dispatched after a backoff delay.
  NodeRetry {
    execution_id: String,
    node_id: String,
    retry_count: u32,
    delay_ms: u64,
    error: String,
  },

  /// A node exhausted its retry budget (or had none) and failed.
  NodeFailed {
    execution_id: String,
    node_id: String,
    error: String,
    attempts: u32,
  },

  /// A node will never run because an upstream dependency failed.
  NodeBlocked {
    execution_id: String,
    node_id: String,
    failed_dependency: String,
  },

  /// A handler was registered for a node kind.
  HandlerRegistered { kind: NodeKind },
}

/// Trait for receiving execution events.
///
/// Implement this trait to receive events during plan execution. The
/// engine calls `notify` for each event - implementations decide what to
/// do with them (persist, broadcast, log, ignore, etc.). Called from the
/// engine's hot path, so implementations must not block.
pub trait ExecutionNotifier: Send + Sync {
  /// Called when an execution event occurs.
  fn notify(&self, event: ExecutionEvent);
}

/// A no-op notifier that discards all events.
///
/// Useful for tests or when event observation is not needed.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {
    // Intentionally empty
  }
}

/// A notifier that sends events to an unbounded channel.
///
/// Use this when you need to consume events asynchronously (e.g. persist
/// to a database, stream to a UI via websocket, etc.).
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // NOTE: unbounded so the engine never blocks on a slow consumer. The
  // event volume is low (a handful per node), so memory growth is
  // unlikely in practice. If it becomes a concern: bounded channel with
  // backpressure, or try_send and drop on a full buffer.
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  /// Create a new channel notifier.
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }

  /// Create a notifier together with its receiving half.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self { sender }, receiver)
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Ignore send errors - receiver may have been dropped
    let _ = self.sender.send(event);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_channel_notifier_delivers_events() {
    let (notifier, mut receiver) = ChannelNotifier::channel();

    notifier.notify(ExecutionEvent::ExecutionStarted {
      execution_id: "e1".to_string(),
      plan_id: "p1".to_string(),
    });
    notifier.notify(ExecutionEvent::HandlerRegistered {
      kind: NodeKind::Task,
    });

    let first = receiver.recv().await.unwrap();
    assert!(matches!(first, ExecutionEvent::ExecutionStarted { .. }));
    let second = receiver.recv().await.unwrap();
    assert!(matches!(second, ExecutionEvent::HandlerRegistered { .. }));
  }

  #[test]
  fn test_notify_after_receiver_dropped_is_ignored() {
    let (notifier, receiver) = ChannelNotifier::channel();
    drop(receiver);

    // Must not panic.
    notifier.notify(ExecutionEvent::ExecutionStopped {
      execution_id: "e1".to_string(),
    });
  }
}
