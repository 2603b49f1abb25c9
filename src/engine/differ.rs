//! Diff display for previewed changes

use colored::Colorize;
use declarative::{DiffSummary, Report, group_by_type};
use serde_json::Value;
use similar::{ChangeTag, TextDiff};

use crate::ui;

/// Display the changes a preview found, grouped by resource type
pub fn display_diff(reports: &[Report]) {
    let summary = DiffSummary::from_reports(reports);
    if !summary.has_changes() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Configuration Diff".bold()
    );
    println!("│");

    for (resource_type, type_reports) in group_by_type(reports) {
        println!("│ {}", ui::type_label(resource_type).bold());

        for report in type_reports {
            println!(
                "│   {} {:<30} {}",
                ui::action_symbol(report.action),
                report.id,
                change_detail(report).dimmed()
            );
            if report.before.is_some() || report.after.is_some() {
                for line in json_diff(report.before.as_ref(), report.after.as_ref()) {
                    println!("│       {line}");
                }
            }
        }
        println!("│");
    }

    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} to add, {} to change, {} to remove",
        summary.additions.to_string().green(),
        summary.modifications.to_string().yellow(),
        summary.removals.to_string().red()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

/// Short description of what will happen to a resource
fn change_detail(report: &Report) -> String {
    if report.updated_fields.is_empty() {
        format!("(will {})", report.action.verb())
    } else {
        report.updated_fields.join(", ")
    }
}

/// Pretty JSON, or nothing when the entity does not exist
fn render(value: Option<&Value>) -> String {
    value
        .filter(|v| v.as_str() != Some(""))
        .and_then(|v| serde_json::to_string_pretty(v).ok())
        .map(|text| text + "\n")
        .unwrap_or_default()
}

/// Line diff between two snapshots, colored
pub fn json_diff(before: Option<&Value>, after: Option<&Value>) -> Vec<String> {
    diff_lines(before, after)
        .into_iter()
        .map(|(tag, line)| match tag {
            ChangeTag::Insert => format!("+ {line}").green().to_string(),
            ChangeTag::Delete => format!("- {line}").red().to_string(),
            ChangeTag::Equal => format!("  {line}").dimmed().to_string(),
        })
        .collect()
}

fn diff_lines(before: Option<&Value>, after: Option<&Value>) -> Vec<(ChangeTag, String)> {
    let old = render(before);
    let new = render(after);
    TextDiff::from_lines(&old, &new)
        .iter_all_changes()
        .map(|change| (change.tag(), change.value().trim_end().to_string()))
        .collect()
}
