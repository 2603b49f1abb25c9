//! Execution engine - reconciles a plan one resource at a time
//!
//! A run has two passes. The preview pass reconciles every resource in dry-run
//! mode to find out what would change. After confirmation the apply pass
//! reconciles only the resources that reported a change. A failure on one
//! resource never stops the others.
//!
//! The caller drives the passes so it can show the preview and ask in between:
//!
//! ```ignore
//! let planned = preview(&plan, &opts);
//! let execution = if opts.dry_run || pending_changes(&planned) == 0 {
//!     finish_preview(planned, &opts)
//! } else if confirm.confirm("Apply?")? {
//!     Execution::new(apply_previewed(&plan, planned, &opts, &mut progress))
//! } else {
//!     decline(planned)
//! };
//! ```

use crate::context::{ApplyContext, ProgressCallback};
use crate::planner::ExecutionPlan;
use crate::reconcile::reconcile;
use crate::types::{ExecuteOptions, Execution, Outcome};

/// Reconcile every resource in dry-run mode
pub fn preview(plan: &ExecutionPlan, opts: &ExecuteOptions) -> Vec<Outcome> {
    let ctx = ApplyContext::new(true).with_diff(opts.diff);
    plan.resources
        .iter()
        .map(|resource| reconcile(resource.as_ref(), &ctx))
        .collect()
}

/// Number of resources a preview says would change
pub fn pending_changes(preview: &[Outcome]) -> usize {
    preview
        .iter()
        .filter(|o| matches!(o, Ok(report) if report.changed))
        .count()
}

/// Apply the changes found by [`preview`]
///
/// `preview` must come from the same plan. Resources that were unchanged or
/// failed during the preview are passed through without being touched again.
pub fn apply_previewed<P: ProgressCallback>(
    plan: &ExecutionPlan,
    preview: Vec<Outcome>,
    opts: &ExecuteOptions,
    progress: &mut P,
) -> Vec<Outcome> {
    let ctx = ApplyContext::new(false).with_diff(opts.diff);

    progress.on_batch_start(pending_changes(&preview));
    let outcomes = plan
        .resources
        .iter()
        .zip(preview)
        .map(|(resource, planned)| match planned {
            Ok(report) if report.changed => {
                let id = resource.id();
                progress.on_resource_start(&id, &resource.description());
                let outcome = reconcile(resource.as_ref(), &ctx);
                progress.on_resource_complete(&id, &outcome);
                outcome
            }
            Ok(mut report) => {
                report.dry_run = false;
                Ok(report)
            }
            Err(e) => Err(e),
        })
        .collect();
    progress.on_batch_complete();

    outcomes
}

/// Close a run that stops after the preview
///
/// A dry run keeps the preview as is. A real run with nothing pending has
/// already looked at the live state, so its reports are not marked dry-run.
pub fn finish_preview(preview: Vec<Outcome>, opts: &ExecuteOptions) -> Execution {
    if opts.dry_run {
        return Execution::new(preview);
    }
    let outcomes = preview
        .into_iter()
        .map(|outcome| {
            outcome.map(|mut report| {
                report.dry_run = false;
                report
            })
        })
        .collect();
    Execution::new(outcomes)
}

/// Close a run whose pending changes were declined
pub fn decline(preview: Vec<Outcome>) -> Execution {
    let mut execution = Execution::new(preview);
    execution.summary.skipped = execution.summary.planned;
    execution.summary.planned = 0;
    execution
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NoProgress;
    use crate::reconcile::Action;
    use crate::resource::Resource;
    use crate::state::DesiredState;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    #[derive(Debug)]
    struct TestResource {
        id: String,
        existing: Mutex<Option<Value>>,
        comment: &'static str,
        fail_lookup: bool,
    }

    impl TestResource {
        fn new(id: &str, existing: Option<Value>, comment: &'static str) -> Self {
            Self {
                id: id.to_string(),
                existing: Mutex::new(existing),
                comment,
                fail_lookup: false,
            }
        }
    }

    impl Resource for TestResource {
        fn id(&self) -> String {
            self.id.clone()
        }

        fn resource_type(&self) -> &'static str {
            "test"
        }

        fn lookup(&self) -> anyhow::Result<Option<Value>> {
            if self.fail_lookup {
                anyhow::bail!("permission denied");
            }
            Ok(self.existing.lock().unwrap().clone())
        }

        fn desired(&self) -> DesiredState {
            DesiredState::new().with("comment", self.comment)
        }

        fn create(&self) -> anyhow::Result<()> {
            *self.existing.lock().unwrap() = Some(json!({"comment": self.comment}));
            Ok(())
        }

        fn update(&self, _existing: &Value, _fields: &[String]) -> anyhow::Result<()> {
            self.create()
        }

        fn remove(&self, _existing: &Value) -> anyhow::Result<()> {
            *self.existing.lock().unwrap() = None;
            Ok(())
        }
    }

    /// Preview, then apply everything pending without asking
    fn run(plan: &ExecutionPlan, opts: &ExecuteOptions) -> Execution {
        let planned = preview(plan, opts);
        if opts.dry_run || pending_changes(&planned) == 0 {
            finish_preview(planned, opts)
        } else {
            Execution::new(apply_previewed(plan, planned, opts, &mut NoProgress))
        }
    }

    #[test]
    fn test_execute_empty_plan() {
        let plan = ExecutionPlan::new();
        let result = run(&plan, &ExecuteOptions::default());
        assert_eq!(result.summary.total(), 0);
    }

    #[test]
    fn test_execute_no_changes() {
        let mut plan = ExecutionPlan::new();
        plan.add_resource(Box::new(TestResource::new(
            "test1",
            Some(json!({"comment": "same"})),
            "same",
        )));

        let result = run(&plan, &ExecuteOptions::default());
        assert_eq!(result.summary.no_change, 1);
        assert!(result.reports().all(|r| !r.dry_run));
    }

    #[test]
    fn test_execute_with_changes() {
        let mut plan = ExecutionPlan::new();
        plan.add_resource(Box::new(TestResource::new("test1", None, "new")));
        plan.add_resource(Box::new(TestResource::new(
            "test2",
            Some(json!({"comment": "old"})),
            "new",
        )));

        let result = run(&plan, &ExecuteOptions::default());
        assert_eq!(result.summary.created, 1);
        assert_eq!(result.summary.modified, 1);

        let again = run(&plan, &ExecuteOptions::default());
        assert_eq!(again.summary.no_change, 2);
    }

    #[test]
    fn test_failure_does_not_stop_batch() {
        let mut plan = ExecutionPlan::new();
        let mut broken = TestResource::new("broken", None, "x");
        broken.fail_lookup = true;
        plan.add_resource(Box::new(broken));
        plan.add_resource(Box::new(TestResource::new("test2", None, "new")));

        let result = run(&plan, &ExecuteOptions::default());
        assert_eq!(result.summary.failed, 1);
        assert_eq!(result.summary.created, 1);
        assert_eq!(result.failures().next().unwrap().id(), "broken");
    }

    #[test]
    fn test_dry_run_counts_planned() {
        let mut plan = ExecutionPlan::new();
        plan.add_resource(Box::new(TestResource::new("test1", None, "new")));

        let opts = ExecuteOptions {
            dry_run: true,
            ..Default::default()
        };
        let result = run(&plan, &opts);
        assert_eq!(result.summary.planned, 1);
        assert_eq!(result.summary.total_changes(), 0);

        let report = result.reports().next().unwrap();
        assert_eq!(report.action, Action::Created);
        assert!(report.dry_run);
    }

    #[test]
    fn test_declined_confirmation_skips() {
        let mut plan = ExecutionPlan::new();
        plan.add_resource(Box::new(TestResource::new("test1", None, "new")));

        let result = decline(preview(&plan, &ExecuteOptions::default()));
        assert_eq!(result.summary.skipped, 1);
        assert_eq!(result.summary.planned, 0);
        assert_eq!(result.summary.created, 0);
    }

    #[test]
    fn test_unchanged_run_reports_live_state() {
        let mut plan = ExecutionPlan::new();
        plan.add_resource(Box::new(TestResource::new(
            "test1",
            Some(json!({"comment": "same"})),
            "same",
        )));

        let dry_opts = ExecuteOptions {
            dry_run: true,
            ..Default::default()
        };
        let dry = finish_preview(preview(&plan, &dry_opts), &dry_opts);
        assert!(dry.reports().all(|r| r.dry_run));

        let planned = preview(&plan, &ExecuteOptions::default());
        assert!(planned.iter().all(|o| o.as_ref().unwrap().dry_run));
        let live = finish_preview(planned, &ExecuteOptions::default());
        assert!(live.reports().all(|r| !r.dry_run));
        assert_eq!(live.summary.no_change, 1);
    }
}
