//! Cadre Plan
//!
//! Plan graph definitions for the cadre execution engine. A plan is a
//! DAG of typed nodes with inter-node dependencies; this crate provides
//! the serde-level definition types, structural validation (duplicate
//! detection, dependency resolution, cycle detection, entry-node
//! derivation), and the dependency index used by the engine to wake
//! dependents.
//!
//! Key properties of a [`ValidatedPlan`]:
//! - Every dependency references a node present in the plan
//! - No two nodes share an ID
//! - The dependency relation is acyclic
//! - At least one entry node exists

mod error;
mod graph;
mod node;
mod plan;
mod validate;

pub use error::PlanError;
pub use graph::DependencyIndex;
pub use node::{DEFAULT_TIMEOUT_MS, NodeDefinition, NodeKind, RetryPolicy};
pub use plan::PlanDefinition;
pub use validate::ValidatedPlan;
