//! Field-level diff between desired and existing state
//!
//! Existing state comes straight from the remote side, so values are
//! normalized before comparing:
//! - lists are compared as sets and may arrive as arrays or comma-joined strings
//! - text has `\ ` unescaped to a plain space on both sides
//! - integers and booleans accept numeric strings and `0`/`1`

use crate::reconcile::{Action, Report};
use crate::state::{DesiredState, FieldValue};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// Names of desired fields whose value differs from `existing`, in declaration order
///
/// A field missing from `existing` always counts as changed.
pub fn updated_fields(desired: &DesiredState, existing: &Value) -> Vec<String> {
    desired
        .iter()
        .filter(|(name, value)| field_differs(value, existing.get(name)))
        .map(|(name, _)| name.to_string())
        .collect()
}

/// Check whether one desired value differs from the existing one
pub fn field_differs(desired: &FieldValue, existing: Option<&Value>) -> bool {
    let Some(existing) = existing.filter(|v| !v.is_null()) else {
        return true;
    };

    match desired {
        FieldValue::List(items) => match existing_set(existing) {
            Some(current) => current != desired_set(items),
            None => true,
        },
        FieldValue::Text(text) => match existing {
            Value::String(current) => unescape(text) != unescape(current),
            Value::Number(_) | Value::Bool(_) => {
                scalar_string(existing).as_deref() != Some(text.as_str())
            }
            _ => true,
        },
        FieldValue::Int(n) => existing_int(existing) != Some(*n),
        FieldValue::Bool(b) => existing_bool(existing) != Some(*b),
    }
}

/// Replace escaped spaces (`\ `) with plain spaces
pub fn unescape(text: &str) -> String {
    text.replace("\\ ", " ")
}

/// Render a JSON scalar the way it would be passed as a flag value
pub fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("1".to_string()),
        Value::Bool(false) => Some("0".to_string()),
        _ => None,
    }
}

/// Interpret an existing value as a set of strings
///
/// Accepts an array of scalars or a comma-joined string. Blank items are
/// dropped so `""` is the empty set.
pub fn existing_set(value: &Value) -> Option<BTreeSet<String>> {
    match value {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(scalar_string)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        ),
        Value::String(joined) => Some(
            joined
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect(),
        ),
        _ => None,
    }
}

fn desired_set(items: &[String]) -> BTreeSet<String> {
    items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Interpret an existing value as an integer, accepting numeric strings
pub fn existing_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// Interpret an existing value as a boolean, accepting `0`/`1`
pub fn existing_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim() {
            "1" | "true" => Some(true),
            "0" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Diff summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    /// Number of resources to add
    pub additions: usize,
    /// Number of resources to remove
    pub removals: usize,
    /// Number of resources to modify
    pub modifications: usize,
}

impl DiffSummary {
    /// Create a summary from reconcile reports
    pub fn from_reports(reports: &[Report]) -> Self {
        let mut summary = Self::default();
        for report in reports.iter().filter(|r| r.changed) {
            match report.action {
                Action::Created => summary.additions += 1,
                Action::Removed => summary.removals += 1,
                Action::Modified => summary.modifications += 1,
                Action::NoChange => {}
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.removals + self.modifications
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Group changed reports by resource type, keeping first-seen order
pub fn group_by_type(reports: &[Report]) -> Vec<(&'static str, Vec<&Report>)> {
    let mut order: Vec<&'static str> = Vec::new();
    let mut groups: HashMap<&'static str, Vec<&Report>> = HashMap::new();
    for report in reports.iter().filter(|r| r.changed) {
        if !groups.contains_key(report.resource_type) {
            order.push(report.resource_type);
        }
        groups.entry(report.resource_type).or_default().push(report);
    }
    order
        .into_iter()
        .map(|t| (t, groups.remove(t).unwrap_or_default()))
        .collect()
}
