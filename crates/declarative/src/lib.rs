//! # Declarative
//!
//! A framework for declarative resource reconciliation.
//!
//! This crate provides the core abstractions for declaring desired state,
//! looking up existing state, and converging remote entities to match.
//!
//! ## Core Concepts
//!
//! - **Resource**: One remote entity with a lookup and three converge calls
//! - **DesiredState**: Ordered fields the resource should have
//! - **reconcile**: The lookup → diff → converge state machine
//! - **ExecutionPlan**: Ordered resources applied by the executor
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{ExecuteOptions, Execution, ExecutionPlan, NoProgress, apply_previewed, preview};
//!
//! let mut plan = ExecutionPlan::new();
//! plan.add_resource(Box::new(Pool::new("dev", "Development", client.clone())));
//!
//! let opts = ExecuteOptions::default();
//! let planned = preview(&plan, &opts);
//! let execution = Execution::new(apply_previewed(&plan, planned, &opts, &mut NoProgress));
//! for report in execution.reports() {
//!     println!("{} {}: {}", report.resource_type, report.id, report.action);
//! }
//! ```
//!
//! ## Dry Run
//!
//! With [`ApplyContext::dry_run`] set, [`reconcile`] stops right after the
//! decision and never calls `create`, `update` or `remove`. The report still
//! carries the predicted `changed` flag and updated fields.
//!
//! ## Provider Traits
//!
//! - [`ProgressCallback`]: Receives progress updates
//! - [`ConfirmCallback`]: Handles user confirmations
//!
//! This allows the crate to be used without hard dependencies on
//! specific UI frameworks.

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod planner;
pub mod reconcile;
pub mod resource;
pub mod state;
pub mod types;

// Re-export main types at crate root
pub use context::{
    ApplyContext, AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback,
};
pub use diff::{DiffSummary, group_by_type, updated_fields};
pub use error::ReconcileError;
pub use executor::{apply_previewed, decline, finish_preview, pending_changes, preview};
pub use planner::ExecutionPlan;
pub use reconcile::{Action, Report, reconcile};
pub use resource::{BoxedResource, Resource};
pub use state::{DesiredState, Ensure, FieldValue};
pub use types::{ExecuteOptions, ExecuteSummary, Execution, Outcome};
