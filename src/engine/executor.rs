//! Execution engine - preview, confirm, apply, report

use anyhow::Result;
use colored::Colorize;
use declarative::{
    ConfirmCallback, ExecuteOptions, ExecuteSummary, Execution, ExecutionPlan, Outcome,
    ProgressCallback, apply_previewed, decline, finish_preview, pending_changes, preview,
};
use serde::Serialize;

use super::differ::display_diff;
use crate::progress::BarProgress;
use crate::ui;

/// Options for a run, on top of what the reconciler needs
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Show before/after snapshots
    pub diff: bool,
    /// Skip the confirmation prompt
    pub yes: bool,
    /// Print outcomes as JSON instead of the boxed display
    pub json: bool,
    /// Suppress non-essential output
    pub quiet: bool,
}

impl RunOptions {
    fn execute_options(&self) -> ExecuteOptions {
        ExecuteOptions {
            dry_run: self.dry_run,
            diff: self.diff,
        }
    }

    fn interactive(&self) -> bool {
        !self.json && !self.quiet
    }
}

/// Asks on the terminal before the first change
pub struct PromptConfirm;

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        use dialoguer::Confirm;

        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()?;

        Ok(confirmed)
    }
}

/// Run a plan with the terminal UI
pub fn run(plan: &ExecutionPlan, opts: &RunOptions) -> Result<Execution> {
    let mut progress = if opts.interactive() {
        BarProgress::new()
    } else {
        BarProgress::hidden()
    };
    if opts.yes {
        run_with(plan, opts, &mut progress, &mut declarative::AutoConfirm)
    } else {
        run_with(plan, opts, &mut progress, &mut PromptConfirm)
    }
}

/// Run a plan with explicit callbacks
///
/// Preview failures are reported with everything else; they never stop the
/// resources that previewed fine from being applied.
pub fn run_with<P, C>(
    plan: &ExecutionPlan,
    opts: &RunOptions,
    progress: &mut P,
    confirm: &mut C,
) -> Result<Execution>
where
    P: ProgressCallback,
    C: ConfirmCallback,
{
    let exec_opts = opts.execute_options();

    log::info!("previewing {} resources", plan.total_resources());
    let planned = preview(plan, &exec_opts);
    let changes = pending_changes(&planned);
    log::debug!("{changes} resources would change");

    if !opts.json {
        display_diff(&reports(&planned));
    }

    if opts.dry_run || changes == 0 {
        let execution = finish_preview(planned, &exec_opts);
        finish(&execution, opts)?;
        return Ok(execution);
    }

    if !confirm.confirm(&format!("Apply {}?", ui::count(changes, "change")))? {
        if !opts.json {
            println!();
            println!("  {} Aborted", "✗".red());
        }
        let execution = decline(planned);
        finish(&execution, opts)?;
        return Ok(execution);
    }

    if opts.interactive() {
        println!();
        println!(
            "  {} Applying {}...",
            "→".cyan(),
            ui::count(changes, "resource")
        );
    }

    let outcomes = apply_previewed(plan, planned, &exec_opts, progress);
    let execution = Execution::new(outcomes);
    finish(&execution, opts)?;
    Ok(execution)
}

fn reports(outcomes: &[Outcome]) -> Vec<declarative::Report> {
    outcomes
        .iter()
        .filter_map(|o| o.as_ref().ok().cloned())
        .collect()
}

/// One outcome as printed by `--json`
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum JsonOutcome<'a> {
    Report(&'a declarative::Report),
    Failure {
        id: &'a str,
        resource_type: &'static str,
        error: String,
    },
}

#[derive(Debug, Serialize)]
struct JsonExecution<'a> {
    summary: &'a ExecuteSummary,
    resources: Vec<JsonOutcome<'a>>,
}

fn to_json(execution: &Execution) -> Result<String> {
    let resources = execution
        .outcomes
        .iter()
        .map(|outcome| match outcome {
            Ok(report) => JsonOutcome::Report(report),
            Err(e) => JsonOutcome::Failure {
                id: e.id(),
                resource_type: e.resource_type(),
                error: e.to_string(),
            },
        })
        .collect();
    Ok(serde_json::to_string_pretty(&JsonExecution {
        summary: &execution.summary,
        resources,
    })?)
}

fn finish(execution: &Execution, opts: &RunOptions) -> Result<()> {
    if opts.json {
        println!("{}", to_json(execution)?);
        return Ok(());
    }

    for failure in execution.failures() {
        ui::error(&failure.to_string());
    }
    if !opts.quiet {
        print_summary(&execution.summary, opts.dry_run);
    }
    Ok(())
}

/// Print final summary
fn print_summary(summary: &ExecuteSummary, dry_run: bool) {
    println!();
    if dry_run {
        println!("  {} Dry run - no changes made", "ℹ".blue());
    } else if summary.is_success() {
        println!(
            "  {} Configuration applied successfully!",
            "✓".green().bold()
        );
    } else {
        println!(
            "  {} Configuration applied with errors",
            "⚠".yellow().bold()
        );
    }

    if summary.planned > 0 {
        println!("    • {} would change", ui::count(summary.planned, "resource"));
    }
    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} resources modified", summary.modified);
    }
    if summary.removed > 0 {
        println!("    • {} resources removed", summary.removed);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::mock_client;
    use crate::resource::{Pool, PoolSpec};
    use declarative::{AutoConfirm, AutoDecline, Ensure, NoProgress};
    use serde_json::json;

    fn plan(client: &std::sync::Arc<pvesh::Client>) -> ExecutionPlan {
        let mut plan = ExecutionPlan::new();
        for name in ["dev", "prod"] {
            plan.add_resource(Box::new(Pool::new(
                PoolSpec {
                    name: name.into(),
                    state: Ensure::Present,
                    comment: Some(format!("{name} pool")),
                },
                std::sync::Arc::clone(client),
            )));
        }
        plan
    }

    fn quiet_json() -> RunOptions {
        RunOptions {
            json: true,
            quiet: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_dry_run_never_mutates() {
        let (mock, client) = mock_client();
        mock.get_not_found("pools/dev");
        mock.get_not_found("pools/prod");

        let opts = RunOptions {
            dry_run: true,
            ..quiet_json()
        };
        let execution = run_with(&plan(&client), &opts, &mut NoProgress, &mut AutoConfirm).unwrap();
        assert_eq!(execution.summary.planned, 2);
        assert!(mock.mutating_invocations().is_empty());
    }

    #[test]
    fn test_declined_confirmation_skips_changes() {
        let (mock, client) = mock_client();
        mock.get_not_found("pools/dev");
        mock.get_returns("pools/prod", json!({"poolid": "prod", "comment": "prod pool"}));

        let execution =
            run_with(&plan(&client), &quiet_json(), &mut NoProgress, &mut AutoDecline).unwrap();
        assert_eq!(execution.summary.skipped, 1);
        assert_eq!(execution.summary.no_change, 1);
        assert!(mock.mutating_invocations().is_empty());
    }

    #[test]
    fn test_unchanged_apply_is_not_a_dry_run() {
        let (mock, client) = mock_client();
        mock.get_returns("pools/dev", json!({"poolid": "dev", "comment": "dev pool"}));
        mock.get_returns("pools/prod", json!({"poolid": "prod", "comment": "prod pool"}));

        let execution =
            run_with(&plan(&client), &quiet_json(), &mut NoProgress, &mut AutoConfirm).unwrap();
        assert_eq!(execution.summary.no_change, 2);
        assert!(execution.reports().all(|r| !r.dry_run));

        let rendered: serde_json::Value =
            serde_json::from_str(&to_json(&execution).unwrap()).unwrap();
        assert_eq!(rendered["resources"][0]["dry_run"], false);
    }

    #[test]
    fn test_apply_creates_only_missing() {
        let (mock, client) = mock_client();
        mock.get_not_found("pools/dev");
        mock.get_returns("pools/prod", json!({"poolid": "prod", "comment": "prod pool"}));

        let execution =
            run_with(&plan(&client), &quiet_json(), &mut NoProgress, &mut AutoConfirm).unwrap();
        assert_eq!(execution.summary.created, 1);
        assert_eq!(execution.summary.no_change, 1);

        let calls = mock.mutating_invocations();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].param("poolid"), Some("dev"));
    }

    #[test]
    fn test_json_output_lists_failures() {
        let (mock, client) = mock_client();
        mock.get_returns("pools/dev", json!({"poolid": "dev", "comment": "dev pool"}));
        mock.always(
            pvesh::Verb::Get,
            "pools/prod",
            pvesh::Response::error(500, "cluster not ready", None),
        );

        let execution = Execution::new(preview(&plan(&client), &ExecuteOptions::default()));
        let rendered: serde_json::Value =
            serde_json::from_str(&to_json(&execution).unwrap()).unwrap();

        assert_eq!(rendered["summary"]["failed"], 1);
        assert_eq!(rendered["resources"][0]["id"], "dev");
        assert_eq!(rendered["resources"][1]["id"], "prod");
        assert!(
            rendered["resources"][1]["error"]
                .as_str()
                .unwrap()
                .contains("cluster not ready")
        );
    }
}
