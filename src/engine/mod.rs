//! Execution engine for pvesync
//!
//! The engine orchestrates:
//! 1. Previewing - Reconcile every resource in dry-run mode
//! 2. Diffing - Show what the preview would change
//! 3. Executing - Apply the changes after confirmation

pub mod differ;
pub mod executor;

pub use executor::{RunOptions, run};
