//! Cadre Engine
//!
//! Execution graph engine for cadre: drives a validated plan of
//! dependency-linked nodes through bounded-concurrency, retrying,
//! dependency-aware execution to completion, failure, or permanent
//! blockage, and reports a structured result.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        PlanRunner                           │
//! │  - owns mpsc channel (sender + receiver)                    │
//! │  - run(payload) triggers execution                          │
//! │  - start(cancel) runs the trigger loop                      │
//! └──────────────────────────────┬──────────────────────────────┘
//!                                │
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       PlanExecutor                          │
//! │  - execute() → ExecutionResult                              │
//! │  - dependency-satisfaction scheduling, semaphore-bounded    │
//! │  - per-node timeout, retry/backoff, blockage propagation    │
//! └──────────────────────────────┬──────────────────────────────┘
//!                                │
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       NodeHandler                           │
//! │  - registered per node kind                                 │
//! │  - execute(node, context, cancel) → output                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine never interprets node `config` or handler output; both
//! flow through it opaquely. Observability is event-based: every
//! lifecycle transition is reported to an [`ExecutionNotifier`].

mod context;
mod error;
mod events;
mod executor;
mod handler;
mod propagate;
mod result;
mod runner;
mod state;

pub use context::ExecutionContext;
pub use error::{EngineError, FailedNode};
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use executor::{ExecutorConfig, PlanExecutor};
pub use handler::{HandlerError, HandlerRegistry, NodeHandler};
pub use result::ExecutionResult;
pub use runner::{PlanRunner, TriggerPayload};
pub use state::{NodeError, NodeExecution, NodeStatus};
