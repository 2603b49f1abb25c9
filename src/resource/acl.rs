//! ACL resource (`access/acl`)
//!
//! An ACL declaration expands to one entry per (role, user or group) pair on
//! a single path. There is no instance path: entries are listed with one GET
//! and written with SET on the collection.

use anyhow::{Result, bail};
use declarative::diff::existing_int;
use declarative::{DesiredState, Ensure, Resource};
use pvesh::{Client, Params};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::sync::Arc;

use super::{entries, path};

const COLLECTION: &str = "access/acl";

fn default_true() -> bool {
    true
}

/// Manifest entry for an ACL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AclSpec {
    /// Object path, e.g. `/vms/100`
    #[serde(alias = "resource")]
    pub path: String,
    #[serde(default)]
    pub state: Ensure,
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    #[serde(default = "default_true")]
    pub propagate: bool,
}

impl AclSpec {
    /// Path plus the roles granted on it
    pub fn id(&self) -> String {
        format!("{}:{}", self.path, self.roles.join(","))
    }
}

/// One row of the ACL listing
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Entry {
    path: String,
    propagate: i64,
    roleid: String,
    kind: &'static str,
    ugid: String,
}

impl Entry {
    fn from_listing(value: &Value) -> Option<Self> {
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
        let kind = match value.get("type").and_then(Value::as_str)? {
            "user" => "user",
            "group" => "group",
            _ => return None,
        };
        Some(Self {
            path: text("path")?,
            propagate: value.get("propagate").and_then(existing_int).unwrap_or(1),
            roleid: text("roleid")?,
            kind,
            ugid: text("ugid")?,
        })
    }

    fn to_json(&self) -> Value {
        json!({
            "path": self.path,
            "propagate": self.propagate,
            "roleid": self.roleid,
            "type": self.kind,
            "ugid": self.ugid,
        })
    }
}

#[derive(Debug)]
pub struct Acl {
    spec: AclSpec,
    client: Arc<Client>,
}

impl Acl {
    pub fn new(spec: AclSpec, client: Arc<Client>) -> Self {
        Self { spec, client }
    }

    fn desired_entries(&self) -> BTreeSet<Entry> {
        let spec = &self.spec;
        let principals = spec
            .users
            .iter()
            .map(|u| ("user", u))
            .chain(spec.groups.iter().map(|g| ("group", g)));

        principals
            .flat_map(|(kind, ugid)| {
                spec.roles.iter().map(move |role| Entry {
                    path: spec.path.clone(),
                    propagate: i64::from(spec.propagate),
                    roleid: role.clone(),
                    kind,
                    ugid: ugid.clone(),
                })
            })
            .collect()
    }

    fn write(&self, delete: bool) -> Result<()> {
        let mut params: Params = self.desired().params();
        if delete {
            params.push(("delete".to_string(), "1".to_string()));
        }
        self.client.set(&path(COLLECTION)?, &params)?;
        Ok(())
    }
}

impl Resource for Acl {
    fn id(&self) -> String {
        self.spec.id()
    }

    fn resource_type(&self) -> &'static str {
        "acl"
    }

    fn ensure(&self) -> Ensure {
        self.spec.state
    }

    fn validate(&self) -> Result<()> {
        if !self.spec.path.starts_with('/') {
            bail!("path '{}' must start with '/'", self.spec.path);
        }
        if self.spec.roles.is_empty() {
            bail!("at least one role is required");
        }
        if self.spec.users.is_empty() && self.spec.groups.is_empty() {
            bail!("at least one user or group is required");
        }
        Ok(())
    }

    /// Present when every declared entry exists; for removal, when any does
    fn lookup(&self) -> Result<Option<Value>> {
        let listing = self.client.get_required(&path(COLLECTION)?)?;
        let existing: BTreeSet<Entry> = entries(listing)
            .iter()
            .filter_map(Entry::from_listing)
            .collect();

        let desired = self.desired_entries();
        let matching: Vec<Value> = desired
            .intersection(&existing)
            .map(Entry::to_json)
            .collect();

        let found = match self.spec.state {
            Ensure::Present => !desired.is_empty() && matching.len() == desired.len(),
            Ensure::Absent => !matching.is_empty(),
        };

        Ok(found.then(|| json!({"path": self.spec.path, "entries": matching})))
    }

    fn desired(&self) -> DesiredState {
        let spec = &self.spec;
        let non_empty = |items: &Vec<String>| (!items.is_empty()).then(|| items.clone());
        DesiredState::new()
            .with("path", spec.path.as_str())
            .with("roles", spec.roles.clone())
            .with_opt("users", non_empty(&spec.users))
            .with_opt("groups", non_empty(&spec.groups))
            .with("propagate", spec.propagate)
    }

    /// Existence already means every entry matches
    fn diff(&self, _existing: &Value) -> Vec<String> {
        Vec::new()
    }

    fn create(&self) -> Result<()> {
        self.write(false)
    }

    fn update(&self, _existing: &Value, _fields: &[String]) -> Result<()> {
        self.write(false)
    }

    fn remove(&self, _existing: &Value) -> Result<()> {
        self.write(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::mock_client;
    use declarative::{Action, ApplyContext, ReconcileError, reconcile};
    use pvesh::Verb;

    fn spec(state: Ensure) -> AclSpec {
        AclSpec {
            path: "/vms/100".into(),
            state,
            roles: vec!["PVEVMUser".into()],
            users: vec!["alice@pve".into()],
            groups: vec!["ops".into()],
            propagate: true,
        }
    }

    fn row(roleid: &str, kind: &str, ugid: &str, propagate: Value) -> Value {
        json!({"path": "/vms/100", "roleid": roleid, "type": kind, "ugid": ugid, "propagate": propagate})
    }

    #[test]
    fn test_present_when_all_entries_exist() {
        let (mock, client) = mock_client();
        mock.get_returns(
            "access/acl",
            json!([
                row("PVEVMUser", "user", "alice@pve", json!(1)),
                row("PVEVMUser", "group", "ops", json!("1")),
                row("PVEAdmin", "user", "root@pam", json!(1)),
            ]),
        );

        let report = reconcile(&Acl::new(spec(Ensure::Present), client), &ApplyContext::new(false))
            .unwrap();
        assert!(!report.changed);
        assert!(mock.mutating_invocations().is_empty());
    }

    #[test]
    fn test_partial_entries_are_written() {
        let (mock, client) = mock_client();
        mock.get_returns(
            "access/acl",
            json!([row("PVEVMUser", "user", "alice@pve", json!(1))]),
        );

        let report = reconcile(&Acl::new(spec(Ensure::Present), client), &ApplyContext::new(false))
            .unwrap();
        assert_eq!(report.action, Action::Created);

        let calls = mock.mutating_invocations();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].verb, Verb::Set);
        assert_eq!(calls[0].path, "access/acl");
        assert_eq!(calls[0].param("path"), Some("/vms/100"));
        assert_eq!(calls[0].param("roles"), Some("PVEVMUser"));
        assert_eq!(calls[0].param("users"), Some("alice@pve"));
        assert_eq!(calls[0].param("groups"), Some("ops"));
        assert_eq!(calls[0].param("propagate"), Some("1"));
        assert_eq!(calls[0].param("delete"), None);
    }

    #[test]
    fn test_propagate_mismatch_is_not_a_match() {
        let (mock, client) = mock_client();
        mock.get_returns(
            "access/acl",
            json!([
                row("PVEVMUser", "user", "alice@pve", json!(0)),
                row("PVEVMUser", "group", "ops", json!(0)),
            ]),
        );

        let report = reconcile(&Acl::new(spec(Ensure::Present), client), &ApplyContext::new(true))
            .unwrap();
        assert!(report.changed);
    }

    #[test]
    fn test_absent_removes_when_any_entry_exists() {
        let (mock, client) = mock_client();
        mock.get_returns(
            "access/acl",
            json!([row("PVEVMUser", "group", "ops", json!(1))]),
        );

        let report = reconcile(&Acl::new(spec(Ensure::Absent), client), &ApplyContext::new(false))
            .unwrap();
        assert_eq!(report.action, Action::Removed);
        let calls = mock.mutating_invocations();
        assert_eq!(calls[0].param("delete"), Some("1"));
    }

    #[test]
    fn test_absent_ignores_entries_with_other_propagate() {
        let (mock, client) = mock_client();
        mock.get_returns(
            "access/acl",
            json!([
                row("PVEVMUser", "user", "alice@pve", json!(0)),
                row("PVEAdmin", "group", "ops", json!(1)),
            ]),
        );

        let report = reconcile(&Acl::new(spec(Ensure::Absent), client), &ApplyContext::new(false))
            .unwrap();
        assert_eq!(report.action, Action::NoChange);
        assert!(mock.mutating_invocations().is_empty());
    }

    #[test]
    fn test_needs_a_principal() {
        let (_mock, client) = mock_client();
        let mut spec = spec(Ensure::Present);
        spec.users.clear();
        spec.groups.clear();

        let err = reconcile(&Acl::new(spec, client), &ApplyContext::new(true)).unwrap_err();
        assert!(matches!(err, ReconcileError::Precondition { .. }));
        assert!(err.to_string().contains("user or group"));
    }
}
