//! Node handlers and the handler registry.
//!
//! The engine executes nodes through registered handlers; it never
//! interprets a node's `config` or a handler's output itself. Any node
//! kind can be supported by registering a handler for it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cadre_plan::{NodeDefinition, NodeKind};
use tokio_util::sync::CancellationToken;

use crate::context::ExecutionContext;
use crate::error::EngineError;

/// Error returned by a node handler.
///
/// Opaque to the engine; only the rendered message is recorded on the
/// node's execution record.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Executes nodes of one kind.
///
/// Implementations receive the node definition (including its verbatim
/// `config`), the run's shared context, and a cancellation token that is
/// cancelled when the run is stopped. Handlers that may run for a long
/// time should observe the token and return early when it fires.
#[async_trait]
pub trait NodeHandler: Send + Sync {
  async fn execute(
    &self,
    node: &NodeDefinition,
    ctx: &ExecutionContext,
    cancel: CancellationToken,
  ) -> Result<serde_json::Value, HandlerError>;
}

impl std::fmt::Debug for dyn NodeHandler {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("NodeHandler")
  }
}

/// Maps node kinds to handlers.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
  handlers: HashMap<NodeKind, Arc<dyn NodeHandler>>,
}

impl HandlerRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a handler for a node kind, replacing any previous one.
  pub fn register(&mut self, kind: NodeKind, handler: Arc<dyn NodeHandler>) {
    self.handlers.insert(kind, handler);
  }

  /// Resolve the handler for a node kind.
  ///
  /// A missing handler is a configuration error, fatal for the node and
  /// never retried.
  pub fn resolve(&self, kind: NodeKind) -> Result<Arc<dyn NodeHandler>, EngineError> {
    self
      .handlers
      .get(&kind)
      .cloned()
      .ok_or(EngineError::MissingHandler { kind })
  }

  pub fn contains(&self, kind: NodeKind) -> bool {
    self.handlers.contains_key(&kind)
  }
}
