//! Plan runner with channel-based triggering.
//!
//! The `PlanRunner` owns an mpsc channel of trigger payloads and runs
//! its executor once per payload. Each payload is a set of variable
//! overrides for that run.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::EngineError;
use crate::events::{ExecutionNotifier, NoopNotifier};
use crate::executor::PlanExecutor;
use crate::result::ExecutionResult;

/// Variable overrides for one triggered run.
pub type TriggerPayload = Map<String, Value>;

/// Runs a plan in response to trigger payloads.
///
/// # Usage
///
/// ```ignore
/// let runner = PlanRunner::new(executor);
///
/// // Give the sender to whatever produces triggers (webhooks, queue
/// // consumers, schedulers, ...).
/// let sender = runner.sender();
///
/// // Drive the trigger loop until cancelled.
/// let cancel = CancellationToken::new();
/// runner.start(cancel).await?;
/// ```
pub struct PlanRunner<N: ExecutionNotifier = NoopNotifier> {
  sender: mpsc::Sender<TriggerPayload>,
  receiver: mpsc::Receiver<TriggerPayload>,
  executor: Arc<PlanExecutor<N>>,
}

impl<N: ExecutionNotifier + 'static> PlanRunner<N> {
  /// Create a runner with the default trigger buffer.
  pub fn new(executor: Arc<PlanExecutor<N>>) -> Self {
    Self::with_buffer_size(executor, 100)
  }

  /// Create a runner with a custom trigger buffer size.
  pub fn with_buffer_size(executor: Arc<PlanExecutor<N>>, buffer_size: usize) -> Self {
    let (sender, receiver) = mpsc::channel(buffer_size);
    Self {
      sender,
      receiver,
      executor,
    }
  }

  /// A sender handle for triggering runs.
  pub fn sender(&self) -> mpsc::Sender<TriggerPayload> {
    self.sender.clone()
  }

  /// Trigger a run with the given variable overrides.
  ///
  /// Convenience wrapper around the channel.
  pub async fn run(&self, payload: TriggerPayload) -> Result<(), EngineError> {
    self
      .sender
      .send(payload)
      .await
      .map_err(|_| EngineError::ChannelClosed)
  }

  /// Drive the trigger loop.
  ///
  /// Blocks until the cancellation token fires or the channel closes.
  /// Each received payload triggers one run; run failures are logged and
  /// do not end the loop.
  pub async fn start(mut self, cancel: CancellationToken) -> Result<(), EngineError> {
    info!(
      plan_id = %self.executor.definition().id,
      plan_name = %self.executor.definition().name,
      "starting plan runner"
    );

    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!(plan_id = %self.executor.definition().id, "plan runner cancelled");
          break;
        }
        payload = self.receiver.recv() => {
          match payload {
            Some(payload) => {
              info!(plan_id = %self.executor.definition().id, "triggering plan execution");
              match self.executor.execute_with(payload).await {
                Ok(result) => {
                  info!(
                    plan_id = %self.executor.definition().id,
                    execution_id = %result.execution_id,
                    completed = result.completed,
                    success = result.success,
                    "plan execution finished"
                  );
                }
                Err(e) => {
                  error!(
                    plan_id = %self.executor.definition().id,
                    error = %e,
                    "plan execution failed"
                  );
                }
              }
            }
            None => {
              info!(plan_id = %self.executor.definition().id, "plan runner channel closed");
              break;
            }
          }
        }
      }
    }

    Ok(())
  }

  /// Execute a single run directly (without the loop).
  ///
  /// Useful for tests or one-shot executions.
  pub async fn execute_once(
    &self,
    payload: TriggerPayload,
  ) -> Result<ExecutionResult, EngineError> {
    self.executor.execute_with(payload).await
  }

  /// The executor backing this runner.
  pub fn executor(&self) -> &PlanExecutor<N> {
    &self.executor
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::executor::ExecutorConfig;
  use cadre_plan::{NodeDefinition, NodeKind, PlanDefinition};
  use std::time::Duration;

  fn test_executor() -> Arc<PlanExecutor> {
    let mut plan = PlanDefinition::new("test-plan", "Test Plan");
    plan.nodes.push(NodeDefinition::new("a", NodeKind::Task, "A"));
    Arc::new(PlanExecutor::new(plan, ExecutorConfig::default()).unwrap())
  }

  #[tokio::test]
  async fn test_runner_creation() {
    let runner = PlanRunner::new(test_executor());
    assert_eq!(runner.executor().definition().id, "test-plan");
  }

  #[tokio::test]
  async fn test_sender_cloning() {
    let runner = PlanRunner::new(test_executor());

    let sender1 = runner.sender();
    let sender2 = runner.sender();

    assert!(!sender1.is_closed());
    assert!(!sender2.is_closed());
  }

  #[tokio::test]
  async fn test_run_sends_to_channel() {
    let mut runner = PlanRunner::new(test_executor());

    let mut payload = TriggerPayload::new();
    payload.insert("test".to_string(), serde_json::json!("data"));
    runner.run(payload).await.unwrap();

    let received = runner.receiver.recv().await;
    assert!(received.is_some());
    assert_eq!(received.unwrap()["test"], "data");
  }

  #[tokio::test]
  async fn test_cancellation() {
    let runner = PlanRunner::new(test_executor());

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();

    let handle = tokio::spawn(async move { runner.start(cancel_clone).await });

    tokio::time::sleep(Duration::from_millis(10)).await;
    cancel.cancel();

    let result = handle.await.unwrap();
    assert!(result.is_ok());
  }
}
