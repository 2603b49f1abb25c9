//! The lookup → diff → converge state machine for one resource

use crate::context::ApplyContext;
use crate::error::ReconcileError;
use crate::resource::Resource;
use crate::state::{DesiredState, Ensure};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// What reconciling a resource did (or would do in a dry run)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Already in the desired state
    NoChange,
    /// Entity was created
    Created,
    /// Some fields were updated
    Modified,
    /// Entity was removed
    Removed,
}

impl Action {
    /// Imperative form, used in error messages
    pub fn verb(&self) -> &'static str {
        match self {
            Self::NoChange => "lookup",
            Self::Created => "create",
            Self::Modified => "update",
            Self::Removed => "remove",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoChange => "unchanged",
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Removed => "removed",
        })
    }
}

/// Result of reconciling one resource
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    /// Resource id
    pub id: String,
    /// Resource type
    pub resource_type: &'static str,
    /// What happened, or what would happen in a dry run
    pub action: Action,
    /// Whether remote state changed (or would change)
    pub changed: bool,
    /// Fields that differ, in declaration order (updates only)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub updated_fields: Vec<String>,
    /// Whether this came from a dry run
    pub dry_run: bool,
    /// Final observed state, `None` when the entity does not exist
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
    /// State before, only filled when a diff was requested
    ///
    /// An entity that did not exist is an empty string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    /// State after (predicted in a dry run), only filled when a diff was requested
    ///
    /// An entity that no longer exists is an empty string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
}

/// Reconcile a single resource
///
/// Steps:
/// 1. validate the declaration (present only)
/// 2. look up the existing state
/// 3. pick create, update, remove or nothing
/// 4. stop here in a dry run
/// 5. converge, then re-fetch the final state
pub fn reconcile(resource: &dyn Resource, ctx: &ApplyContext) -> Result<Report, ReconcileError> {
    let id = resource.id();
    let resource_type = resource.resource_type();
    let ensure = resource.ensure();

    if ensure.is_present() {
        resource
            .validate()
            .map_err(|e| ReconcileError::Precondition {
                id: id.clone(),
                resource_type,
                message: format!("{e:#}"),
            })?;
    }

    let existing = resource.lookup().map_err(|source| ReconcileError::Lookup {
        id: id.clone(),
        resource_type,
        source,
    })?;

    let (action, updated_fields) = match (ensure, &existing) {
        (Ensure::Absent, None) => (Action::NoChange, Vec::new()),
        (Ensure::Absent, Some(_)) => (Action::Removed, Vec::new()),
        (Ensure::Present, None) => (Action::Created, Vec::new()),
        (Ensure::Present, Some(current)) => {
            let fields = resource.diff(current);
            if fields.is_empty() {
                (Action::NoChange, fields)
            } else {
                (Action::Modified, fields)
            }
        }
    };

    let mut report = Report {
        id,
        resource_type,
        action,
        changed: action != Action::NoChange,
        updated_fields,
        dry_run: ctx.dry_run,
        state: existing.clone(),
        before: None,
        after: None,
    };

    if !report.changed {
        log::debug!("{resource_type} {}: no change", report.id);
        if ctx.diff {
            report.before = snapshot(existing.clone());
            report.after = snapshot(existing);
        }
        return Ok(report);
    }

    if ctx.dry_run {
        log::info!("{resource_type} {}: would be {action}", report.id);
        if ctx.diff {
            report.after = snapshot(predict(existing.as_ref(), &resource.desired(), &report));
            report.before = snapshot(existing);
        }
        return Ok(report);
    }

    log::info!("{resource_type} {}: {}", report.id, action.verb());
    let converged = match (action, existing.as_ref()) {
        (Action::Created, _) => resource.create(),
        (Action::Modified, Some(current)) => resource.update(current, &report.updated_fields),
        (Action::Removed, Some(current)) => resource.remove(current),
        _ => Ok(()),
    };

    if let Err(source) = converged {
        if resource.tolerates(&source) {
            log::warn!("{resource_type} {}: ignoring known failure: {source:#}", report.id);
        } else {
            return Err(ReconcileError::Converge {
                id: report.id,
                resource_type,
                action,
                source,
            });
        }
    }

    let after = resource.lookup().map_err(|source| ReconcileError::Lookup {
        id: report.id.clone(),
        resource_type,
        source,
    })?;

    if ctx.diff {
        report.before = snapshot(existing);
        report.after = snapshot(after.clone());
    }
    report.state = after;
    Ok(report)
}

/// Diff side of a report; a missing entity is an empty string
fn snapshot(state: Option<Value>) -> Option<Value> {
    Some(state.unwrap_or_else(|| Value::String(String::new())))
}

/// Best guess of the state a dry-run change would leave behind
fn predict(existing: Option<&Value>, desired: &DesiredState, report: &Report) -> Option<Value> {
    match report.action {
        Action::Removed => None,
        Action::NoChange => existing.cloned(),
        Action::Created | Action::Modified => {
            let mut fields = match existing {
                Some(Value::Object(map)) => map.clone(),
                _ => Map::new(),
            };
            for (name, value) in desired.iter() {
                let touched = report.action == Action::Created
                    || report.updated_fields.iter().any(|f| f == name);
                if touched {
                    fields.insert(name.to_string(), Value::String(value.render()));
                }
            }
            Some(Value::Object(fields))
        }
    }
}
