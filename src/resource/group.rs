//! Access group resource (`access/groups`)

use anyhow::{Context, Result};
use declarative::{DesiredState, Ensure, Resource};
use pvesh::{Client, Params, ResourcePath};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::path;

const COLLECTION: &str = "access/groups";

/// Manifest entry for an access group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupSpec {
    /// Group id
    #[serde(alias = "groupid")]
    pub name: String,
    #[serde(default)]
    pub state: Ensure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// An access group
#[derive(Debug)]
pub struct Group {
    spec: GroupSpec,
    client: Arc<Client>,
}

impl Group {
    pub fn new(spec: GroupSpec, client: Arc<Client>) -> Self {
        Self { spec, client }
    }

    fn instance(&self) -> Result<ResourcePath> {
        path(format!("{COLLECTION}/{}", self.spec.name))
    }
}

impl Resource for Group {
    fn id(&self) -> String {
        self.spec.name.clone()
    }

    fn resource_type(&self) -> &'static str {
        "group"
    }

    fn ensure(&self) -> Ensure {
        self.spec.state
    }

    fn lookup(&self) -> Result<Option<Value>> {
        let instance = self.instance()?;
        self.client
            .get(&instance)
            .with_context(|| format!("failed to read {instance}"))
    }

    fn desired(&self) -> DesiredState {
        DesiredState::new().with_opt("comment", self.spec.comment.clone())
    }

    fn create(&self) -> Result<()> {
        let mut params: Params = vec![("groupid".to_string(), self.spec.name.clone())];
        params.extend(self.desired().params());
        self.client.create(&path(COLLECTION)?, &params)?;
        Ok(())
    }

    fn update(&self, _existing: &Value, fields: &[String]) -> Result<()> {
        self.client
            .set(&self.instance()?, &self.desired().params_for(fields))?;
        Ok(())
    }

    fn remove(&self, _existing: &Value) -> Result<()> {
        self.client.delete(&self.instance()?, &Params::new())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::mock_client;
    use declarative::{Action, ApplyContext, reconcile};
    use pvesh::{Response, Verb};
    use serde_json::json;

    fn spec(comment: &str) -> GroupSpec {
        GroupSpec {
            name: "admins".into(),
            state: Ensure::Present,
            comment: Some(comment.into()),
        }
    }

    #[test]
    fn test_create_sends_groupid_and_comment() {
        let (mock, client) = mock_client();
        mock.push(
            Verb::Get,
            "access/groups/admins",
            Response::error(404, "group 'admins' does not exist", None),
        );
        mock.get_returns("access/groups/admins", json!({"comment": "Cluster admins"}));

        let group = Group::new(spec("Cluster admins"), client);
        let report = reconcile(&group, &ApplyContext::new(false)).unwrap();
        assert_eq!(report.action, Action::Created);

        let calls = mock.mutating_invocations();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].path, "access/groups");
        assert_eq!(
            calls[0].params,
            vec![
                ("groupid".to_string(), "admins".to_string()),
                ("comment".to_string(), "Cluster admins".to_string()),
            ]
        );
    }

    #[test]
    fn test_escaped_comment_is_unchanged() {
        let (mock, client) = mock_client();
        mock.get_returns("access/groups/admins", json!({"comment": "Cluster\\ admins"}));

        let group = Group::new(spec("Cluster admins"), client);
        let report = reconcile(&group, &ApplyContext::new(false)).unwrap();
        assert!(!report.changed);
        assert!(mock.mutating_invocations().is_empty());
    }

    #[test]
    fn test_absent_deletes_instance() {
        let (mock, client) = mock_client();
        mock.push(
            Verb::Get,
            "access/groups/admins",
            Response::ok(Some(json!({"comment": "x"}))),
        );
        mock.get_not_found("access/groups/admins");

        let mut spec = spec("x");
        spec.state = Ensure::Absent;
        let report = reconcile(&Group::new(spec, client), &ApplyContext::new(false)).unwrap();
        assert_eq!(report.action, Action::Removed);
        let calls = mock.mutating_invocations();
        assert_eq!(calls[0].verb, Verb::Delete);
        assert_eq!(calls[0].path, "access/groups/admins");
    }
}
