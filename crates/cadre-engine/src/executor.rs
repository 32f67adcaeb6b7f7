//! The plan executor.
//!
//! Drives one plan through dependency-aware execution: entry nodes are
//! seeded, every completed node wakes its dependents, a semaphore bounds
//! how many nodes run concurrently, failed nodes retry per their policy,
//! and non-recoverable failures cascade blockage through the dependency
//! index. The run finishes when no node remains pending or running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use cadre_plan::{NodeDefinition, NodeKind, PlanDefinition, PlanError, ValidatedPlan};
use chrono::Utc;
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::context::ExecutionContext;
use crate::error::{EngineError, FailedNode};
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::handler::{HandlerRegistry, NodeHandler};
use crate::propagate::propagate_blocked;
use crate::result::{ExecutionResult, aggregate};
use crate::state::{NodeError, NodeExecution, NodeStatus, RunState};

/// Configuration for the plan executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
  /// Maximum number of nodes running concurrently.
  pub concurrency_limit: usize,
}

impl Default for ExecutorConfig {
  fn default() -> Self {
    Self {
      concurrency_limit: 10,
    }
  }
}

/// Identity and shared state of one run, cheap to clone into node tasks.
#[derive(Clone)]
struct RunHandle {
  execution_id: String,
  context: Arc<ExecutionContext>,
  cancel: CancellationToken,
}

/// Executes a validated plan.
///
/// Generic over `N: ExecutionNotifier` to allow different notification
/// strategies. Use `PlanExecutor::new()` for an executor that discards
/// events, or `PlanExecutor::with_notifier()` to observe them.
///
/// One executor owns one plan and runs it at most once at a time;
/// `execute()` while a run is in progress fails with `AlreadyRunning`.
pub struct PlanExecutor<N: ExecutionNotifier = NoopNotifier> {
  inner: Arc<Inner<N>>,
}

struct Inner<N> {
  plan: ValidatedPlan,
  registry: RwLock<HandlerRegistry>,
  state: Mutex<RunState>,
  /// Context and cancellation of the current (or most recent) run.
  current: RwLock<RunHandle>,
  /// Concurrency slots.
  semaphore: Semaphore,
  /// Signalled on every terminal transition; completion waiters re-check
  /// under the state lock.
  done: Notify,
  running: AtomicBool,
  notifier: N,
}

impl PlanExecutor<NoopNotifier> {
  /// Validate a plan and create an executor that discards events.
  pub fn new(definition: PlanDefinition, config: ExecutorConfig) -> Result<Self, PlanError> {
    Self::with_notifier(definition, config, NoopNotifier)
  }
}

impl<N: ExecutionNotifier + 'static> PlanExecutor<N> {
  /// Validate a plan and create an executor with a custom notifier.
  pub fn with_notifier(
    definition: PlanDefinition,
    config: ExecutorConfig,
    notifier: N,
  ) -> Result<Self, PlanError> {
    let plan = ValidatedPlan::new(definition)?;
    let execution_id = Uuid::new_v4().to_string();
    let context = Arc::new(ExecutionContext::new(
      plan.id(),
      execution_id.clone(),
      plan.definition().variables.clone(),
    ));

    let inner = Arc::new(Inner {
      registry: RwLock::new(HandlerRegistry::new()),
      state: Mutex::new(RunState::empty()),
      current: RwLock::new(RunHandle {
        execution_id,
        context,
        cancel: CancellationToken::new(),
      }),
      semaphore: Semaphore::new(config.concurrency_limit.max(1)),
      done: Notify::new(),
      running: AtomicBool::new(false),
      notifier,
      plan,
    });

    Ok(Self { inner })
  }

  /// Register a handler for a node kind, replacing any previous one.
  pub fn register_handler(&self, kind: NodeKind, handler: Arc<dyn NodeHandler>) {
    self.inner.registry.write().unwrap().register(kind, handler);
    info!(kind = %kind, "handler registered");
    self
      .inner
      .notifier
      .notify(ExecutionEvent::HandlerRegistered { kind });
  }

  /// The validated plan definition this executor runs.
  pub fn definition(&self) -> &PlanDefinition {
    self.inner.plan.definition()
  }

  /// Whether a run is currently in progress.
  pub fn is_running(&self) -> bool {
    self.inner.running.load(Ordering::SeqCst)
  }

  /// Shared context of the current (or most recent) run.
  pub fn context(&self) -> Arc<ExecutionContext> {
    self.inner.current.read().unwrap().context.clone()
  }

  /// Snapshot of one node's execution record.
  pub fn execution(&self, node_id: &str) -> Option<NodeExecution> {
    self
      .inner
      .state
      .lock()
      .unwrap()
      .executions
      .get(node_id)
      .cloned()
  }

  /// Snapshot of every execution record, in plan order.
  pub fn executions(&self) -> Vec<NodeExecution> {
    let state = self.inner.state.lock().unwrap();
    self
      .inner
      .plan
      .node_ids()
      .filter_map(|id| state.executions.get(id).cloned())
      .collect()
  }

  /// Execute the plan with its own initial variables.
  pub async fn execute(&self) -> Result<ExecutionResult, EngineError> {
    self.execute_with(serde_json::Map::new()).await
  }

  /// Execute the plan, overlaying `variables` onto the plan's initial
  /// variables for this run.
  ///
  /// Resolves with the run result when every node completed; fails with
  /// [`EngineError::ExecutionFailed`] (carrying the result) when any
  /// node failed hard. A stopped run returns its partial result with
  /// `success = false`.
  #[instrument(name = "plan_execute", skip_all, fields(plan_id = %self.inner.plan.id()))]
  pub async fn execute_with(
    &self,
    variables: serde_json::Map<String, serde_json::Value>,
  ) -> Result<ExecutionResult, EngineError> {
    if self.inner.running.swap(true, Ordering::SeqCst) {
      return Err(EngineError::AlreadyRunning {
        plan_id: self.inner.plan.id().to_string(),
      });
    }

    let execution_id = Uuid::new_v4().to_string();
    let started = Instant::now();

    let mut seed = self.inner.plan.definition().variables.clone();
    seed.extend(variables);
    let run = RunHandle {
      execution_id: execution_id.clone(),
      context: Arc::new(ExecutionContext::new(
        self.inner.plan.id(),
        execution_id.clone(),
        seed,
      )),
      cancel: CancellationToken::new(),
    };

    *self.inner.state.lock().unwrap() = RunState::new(self.inner.plan.node_ids());
    *self.inner.current.write().unwrap() = run.clone();

    info!(
      execution_id = %execution_id,
      total_nodes = self.inner.plan.total_nodes(),
      "execution started"
    );
    self.inner.notifier.notify(ExecutionEvent::ExecutionStarted {
      execution_id: execution_id.clone(),
      plan_id: self.inner.plan.id().to_string(),
    });

    Inner::schedule_nodes(&self.inner, self.inner.plan.entry_nodes(), &run);

    // Wait until every node is terminal or the run is stopped. The
    // notified future is enabled before the check so a transition
    // between check and await cannot be missed.
    loop {
      let notified = self.inner.done.notified();
      tokio::pin!(notified);
      notified.as_mut().enable();
      {
        let state = self.inner.state.lock().unwrap();
        if state.stopped || state.all_terminal() {
          break;
        }
      }
      notified.await;
    }

    let duration_ms = started.elapsed().as_millis() as u64;

    let (failed, stopped) = {
      let state = self.inner.state.lock().unwrap();
      let failed: Vec<FailedNode> = self
        .inner
        .plan
        .node_ids()
        .filter_map(|id| {
          let execution = state.executions.get(id)?;
          if execution.status != NodeStatus::Failed {
            return None;
          }
          if self.inner.plan.node(id).is_some_and(|n| n.continue_on_error) {
            return None;
          }
          Some(FailedNode {
            node_id: id.to_string(),
            message: execution
              .error
              .as_ref()
              .map(|e| e.message.clone())
              .unwrap_or_else(|| "unknown error".to_string()),
          })
        })
        .collect();
      (failed, state.stopped)
    };

    // Single hard failure: surface that node's own error message.
    // Several: a count-based summary. Detail rides along either way.
    let error_message = match failed.len() {
      0 => None,
      1 => Some(failed[0].message.clone()),
      n => Some(format!("execution failed: {n} nodes failed")),
    };

    let result = {
      let state = self.inner.state.lock().unwrap();
      aggregate(
        self.inner.plan.id(),
        &execution_id,
        self.inner.plan.node_ids(),
        &state,
        run.context.outputs(),
        duration_ms,
        error_message.clone(),
      )
    };

    self.inner.running.store(false, Ordering::SeqCst);

    match error_message {
      Some(message) => {
        error!(
          execution_id = %execution_id,
          error = %message,
          failed_nodes = failed.len(),
          "execution failed"
        );
        self.inner.notifier.notify(ExecutionEvent::ExecutionFailed {
          execution_id,
          error: message.clone(),
        });
        Err(EngineError::ExecutionFailed {
          message,
          failed,
          result: Box::new(result),
        })
      }
      None if stopped => {
        warn!(execution_id = %execution_id, "execution stopped before completion");
        Ok(result)
      }
      None => {
        info!(execution_id = %execution_id, duration_ms, "execution completed");
        self
          .inner
          .notifier
          .notify(ExecutionEvent::ExecutionCompleted {
            execution_id,
            duration_ms,
          });
        Ok(result)
      }
    }
  }

  /// Request a cooperative stop of the current run.
  ///
  /// Stops new scheduling, suppresses further retries, cancels the run's
  /// token (observable by handlers), and wakes the completion waiter.
  /// Handlers already in flight that ignore the token may outlive the
  /// reported run.
  pub fn stop(&self) {
    if !self.inner.running.load(Ordering::SeqCst) {
      return;
    }
    {
      let mut state = self.inner.state.lock().unwrap();
      if state.stopped {
        return;
      }
      state.stopped = true;
    }

    let run = self.inner.current.read().unwrap().clone();
    run.cancel.cancel();
    warn!(execution_id = %run.execution_id, "execution stop requested");
    self.inner.notifier.notify(ExecutionEvent::ExecutionStopped {
      execution_id: run.execution_id,
    });
    self.inner.done.notify_waiters();
  }
}

impl<N: ExecutionNotifier + 'static> Inner<N> {
  /// Evaluate the given nodes for eligibility and spawn an executor task
  /// for each one that qualifies.
  fn schedule_nodes(inner: &Arc<Self>, node_ids: &[String], run: &RunHandle) {
    for node_id in node_ids {
      let claimed = {
        let mut state = inner.state.lock().unwrap();
        if state.stopped || !inner.can_execute(&state, node_id) {
          false
        } else {
          state.in_flight.insert(node_id.clone())
        }
      };

      if claimed {
        let task_inner = Arc::clone(inner);
        let run = run.clone();
        let node_id = node_id.clone();
        tokio::spawn(async move {
          Inner::run_node(task_inner, node_id, run).await;
        });
      }
    }
  }

  /// A node is eligible when it is pending, unclaimed, and every
  /// dependency is completed - or failed with the *dependency's own*
  /// `continue_on_error` set.
  fn can_execute(&self, state: &RunState, node_id: &str) -> bool {
    let Some(execution) = state.executions.get(node_id) else {
      return false;
    };
    if execution.status != NodeStatus::Pending || state.in_flight.contains(node_id) {
      return false;
    }

    self
      .plan
      .index()
      .dependencies(node_id)
      .iter()
      .all(|dep| match state.executions.get(dep).map(|e| e.status) {
        Some(NodeStatus::Completed) => true,
        Some(NodeStatus::Failed) => self.plan.node(dep).is_some_and(|n| n.continue_on_error),
        _ => false,
      })
  }

  /// Drive one node to a terminal state: acquire a concurrency slot,
  /// invoke the handler under its timeout, and either complete, retry
  /// after backoff (re-entering the slot gate), or fail.
  #[instrument(
    name = "node_execute",
    skip_all,
    fields(execution_id = %run.execution_id, node_id = %node_id)
  )]
  async fn run_node(inner: Arc<Self>, node_id: String, run: RunHandle) {
    let Some(node) = inner.plan.node(&node_id).cloned() else {
      inner.state.lock().unwrap().in_flight.remove(&node_id);
      return;
    };

    loop {
      let Ok(permit) = inner.semaphore.acquire().await else {
        // The semaphore is never closed.
        return;
      };

      let attempt = {
        let mut state = inner.state.lock().unwrap();
        if state.stopped {
          state.in_flight.remove(&node_id);
          drop(state);
          inner.done.notify_waiters();
          return;
        }
        let Some(execution) = state.executions.get_mut(&node_id) else {
          state.in_flight.remove(&node_id);
          return;
        };
        execution.status = NodeStatus::Running;
        execution.started_at = Some(Utc::now());
        execution.attempts += 1;
        execution.attempts
      };

      info!(attempt, "node started");
      inner.notifier.notify(ExecutionEvent::NodeStarted {
        execution_id: run.execution_id.clone(),
        node_id: node_id.clone(),
        attempt,
      });

      let handler = inner.registry.read().unwrap().resolve(node.kind);
      let outcome = match handler {
        Err(e) => {
          // Configuration error: fatal for this node, never retried.
          drop(permit);
          Inner::fail_node(&inner, &node, e.to_string(), &run);
          return;
        }
        Ok(handler) => {
          let timeout_ms = node.effective_timeout_ms();
          let invocation = handler.execute(&node, &run.context, run.cancel.child_token());
          match tokio::time::timeout(Duration::from_millis(timeout_ms), invocation).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("node '{node_id}' timed out after {timeout_ms}ms")),
          }
        }
      };
      drop(permit);

      let message = match outcome {
        Ok(output) => {
          Inner::complete_node(&inner, &node, output, &run);
          return;
        }
        Err(message) => message,
      };

      // Retry is warranted while budget remains and the run has not
      // been stopped; the node returns to pending and re-enters the
      // scheduling gate after its backoff delay.
      let retry = {
        let mut state = inner.state.lock().unwrap();
        let stopped = state.stopped;
        match (state.executions.get_mut(&node_id), &node.retry) {
          (Some(execution), Some(policy))
            if !stopped && execution.attempts < policy.max_retries + 1 =>
          {
            execution.status = NodeStatus::Pending;
            let error = execution.error.get_or_insert_with(|| NodeError {
              message: String::new(),
              retry_count: 0,
            });
            error.retry_count += 1;
            error.message = message.clone();
            Some((policy.delay_for(error.retry_count), error.retry_count))
          }
          _ => None,
        }
      };

      match retry {
        Some((delay, retry_count)) => {
          warn!(
            retry_count,
            delay_ms = delay.as_millis() as u64,
            error = %message,
            "node failed, retry scheduled"
          );
          inner.notifier.notify(ExecutionEvent::NodeRetry {
            execution_id: run.execution_id.clone(),
            node_id: node_id.clone(),
            retry_count,
            delay_ms: delay.as_millis() as u64,
            error: message,
          });
          tokio::time::sleep(delay).await;
        }
        None => {
          Inner::fail_node(&inner, &node, message, &run);
          return;
        }
      }
    }
  }

  /// Record a successful node and wake its dependents.
  fn complete_node(
    inner: &Arc<Self>,
    node: &NodeDefinition,
    output: serde_json::Value,
    run: &RunHandle,
  ) {
    // The output must land in the context before the node turns
    // terminal: dependents dispatch on the status flip, and the
    // completion waiter aggregates outputs as soon as the last node is
    // terminal.
    run.context.record_output(&node.id, output.clone());

    let duration_ms = {
      let mut state = inner.state.lock().unwrap();
      state.in_flight.remove(&node.id);
      match state.executions.get_mut(&node.id) {
        Some(execution) => {
          execution.output = Some(output);
          execution.finish(NodeStatus::Completed);
          execution.duration_ms.unwrap_or(0)
        }
        None => 0,
      }
    };

    info!(duration_ms, "node completed");
    inner.notifier.notify(ExecutionEvent::NodeCompleted {
      execution_id: run.execution_id.clone(),
      node_id: node.id.clone(),
      duration_ms,
    });
    inner.done.notify_waiters();

    let dependents = inner.plan.index().dependents(&node.id).to_vec();
    Inner::schedule_nodes(inner, &dependents, run);
  }

  /// Record a terminal node failure; cascade blockage unless the node
  /// allows dependents to continue.
  fn fail_node(inner: &Arc<Self>, node: &NodeDefinition, message: String, run: &RunHandle) {
    let attempts = {
      let mut state = inner.state.lock().unwrap();
      state.in_flight.remove(&node.id);
      match state.executions.get_mut(&node.id) {
        Some(execution) => {
          let error = execution.error.get_or_insert_with(|| NodeError {
            message: String::new(),
            retry_count: 0,
          });
          error.message = message.clone();
          execution.finish(NodeStatus::Failed);
          execution.attempts
        }
        None => 0,
      }
    };

    error!(attempts, error = %message, "node failed");
    inner.notifier.notify(ExecutionEvent::NodeFailed {
      execution_id: run.execution_id.clone(),
      node_id: node.id.clone(),
      error: message,
      attempts,
    });

    if node.continue_on_error {
      inner.done.notify_waiters();
      let dependents = inner.plan.index().dependents(&node.id).to_vec();
      Inner::schedule_nodes(inner, &dependents, run);
    } else {
      let blocked = {
        let mut state = inner.state.lock().unwrap();
        propagate_blocked(inner.plan.index(), &mut state, &node.id)
      };
      for blocked_id in &blocked {
        warn!(node_id = %blocked_id, failed_dependency = %node.id, "node blocked");
        inner.notifier.notify(ExecutionEvent::NodeBlocked {
          execution_id: run.execution_id.clone(),
          node_id: blocked_id.clone(),
          failed_dependency: node.id.clone(),
        });
      }
      inner.done.notify_waiters();
    }
  }
}
