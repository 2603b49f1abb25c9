//! Core types for batch execution

use crate::error::ReconcileError;
use crate::reconcile::{Action, Report};
use serde::{Deserialize, Serialize};

/// Outcome of reconciling one resource
pub type Outcome = Result<Report, ReconcileError>;

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub modified: usize,
    pub removed: usize,
    /// Changes found but not applied because the user declined
    pub skipped: usize,
    pub failed: usize,
    pub no_change: usize,
    /// Changes predicted by a dry run
    pub planned: usize,
}

impl ExecuteSummary {
    /// Build a summary from a list of outcomes
    pub fn from_outcomes(outcomes: &[Outcome]) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            summary.add_outcome(outcome);
        }
        summary
    }

    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.modified + self.removed
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.created
            + self.modified
            + self.removed
            + self.skipped
            + self.failed
            + self.no_change
            + self.planned
    }

    /// Add an outcome to the summary
    pub fn add_outcome(&mut self, outcome: &Outcome) {
        match outcome {
            Err(_) => self.failed += 1,
            Ok(report) if report.dry_run && report.changed => self.planned += 1,
            Ok(report) => match report.action {
                Action::NoChange => self.no_change += 1,
                Action::Created => self.created += 1,
                Action::Modified => self.modified += 1,
                Action::Removed => self.removed += 1,
            },
        }
    }
}

/// Options for execution
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Collect before/after snapshots
    pub diff: bool,
}

/// Everything a batch run produced, in plan order
#[derive(Debug)]
pub struct Execution {
    pub outcomes: Vec<Outcome>,
    pub summary: ExecuteSummary,
}

impl Execution {
    /// Wrap outcomes, computing the summary
    pub fn new(outcomes: Vec<Outcome>) -> Self {
        let summary = ExecuteSummary::from_outcomes(&outcomes);
        Self { outcomes, summary }
    }

    /// Successful reports only
    pub fn reports(&self) -> impl Iterator<Item = &Report> {
        self.outcomes.iter().filter_map(|o| o.as_ref().ok())
    }

    /// Failures only
    pub fn failures(&self) -> impl Iterator<Item = &ReconcileError> {
        self.outcomes.iter().filter_map(|o| o.as_ref().err())
    }
}
