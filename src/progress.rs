//! Progress bar for the apply pass

use declarative::{Outcome, ProgressCallback};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Draws one bar per batch and a symbol per finished resource
pub struct BarProgress {
    bar: Option<ProgressBar>,
    hidden: bool,
}

impl BarProgress {
    pub fn new() -> Self {
        Self {
            bar: None,
            hidden: false,
        }
    }

    /// Track progress without drawing anything
    pub fn hidden() -> Self {
        Self {
            bar: None,
            hidden: true,
        }
    }
}

fn style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
}

/// Symbol shown next to a finished resource
fn outcome_symbol(outcome: &Outcome) -> &'static str {
    match outcome {
        Ok(report) if report.changed => "✓",
        Ok(_) => "○",
        Err(_) => "✗",
    }
}

impl ProgressCallback for BarProgress {
    fn on_batch_start(&mut self, count: usize) {
        let bar = ProgressBar::new(count as u64);
        if self.hidden {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        bar.set_style(style());
        self.bar = Some(bar);
    }

    fn on_resource_start(&mut self, _id: &str, description: &str) {
        if let Some(bar) = &self.bar {
            bar.set_message(description.to_string());
        }
    }

    fn on_resource_complete(&mut self, id: &str, outcome: &Outcome) {
        if let Some(bar) = &self.bar {
            bar.set_message(format!("{} {id}", outcome_symbol(outcome)));
            bar.inc(1);
        }
        if let Err(e) = outcome {
            log::debug!("{id}: {e}");
        }
    }

    fn on_batch_complete(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{Action, Report, ReconcileError};

    fn report(changed: bool) -> Report {
        Report {
            id: "dev".into(),
            resource_type: "pool",
            action: if changed { Action::Created } else { Action::NoChange },
            changed,
            updated_fields: Vec::new(),
            dry_run: false,
            state: None,
            before: None,
            after: None,
        }
    }

    #[test]
    fn test_outcome_symbols() {
        assert_eq!(outcome_symbol(&Ok(report(true))), "✓");
        assert_eq!(outcome_symbol(&Ok(report(false))), "○");
        let failed: Outcome = Err(ReconcileError::Precondition {
            id: "dev".into(),
            resource_type: "pool",
            message: "bad".into(),
        });
        assert_eq!(outcome_symbol(&failed), "✗");
    }

    #[test]
    fn test_hidden_bar_counts_resources() {
        let mut progress = BarProgress::hidden();
        progress.on_batch_start(2);
        progress.on_resource_start("dev", "pool dev (present)");
        progress.on_resource_complete("dev", &Ok(report(true)));
        let position = progress.bar.as_ref().map(ProgressBar::position);
        assert_eq!(position, Some(1));
        progress.on_batch_complete();
        assert!(progress.bar.is_none());
    }
}
