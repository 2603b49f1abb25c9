//! Cluster firewall alias (`cluster/firewall/aliases`)

use anyhow::{Context, Result};
use declarative::{DesiredState, Ensure, Resource};
use pvesh::{Client, Params, ResourcePath};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::path;

const COLLECTION: &str = "cluster/firewall/aliases";

/// Manifest entry for a firewall alias
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FirewallAliasSpec {
    pub name: String,
    #[serde(default)]
    pub state: Ensure,
    /// Address or network the alias stands for
    pub cidr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug)]
pub struct FirewallAlias {
    spec: FirewallAliasSpec,
    client: Arc<Client>,
}

impl FirewallAlias {
    pub fn new(spec: FirewallAliasSpec, client: Arc<Client>) -> Self {
        Self { spec, client }
    }

    fn instance(&self) -> Result<ResourcePath> {
        path(format!("{COLLECTION}/{}", self.spec.name))
    }
}

impl Resource for FirewallAlias {
    fn id(&self) -> String {
        self.spec.name.clone()
    }

    fn resource_type(&self) -> &'static str {
        "firewall_alias"
    }

    fn ensure(&self) -> Ensure {
        self.spec.state
    }

    /// The aliases endpoint answers an unknown name with a 400
    fn lookup(&self) -> Result<Option<Value>> {
        let instance = self.instance()?;
        match self.client.get(&instance) {
            Ok(found) => Ok(found),
            Err(e) if e.status() == Some(400) => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read {instance}")),
        }
    }

    fn desired(&self) -> DesiredState {
        DesiredState::new()
            .with("cidr", self.spec.cidr.as_str())
            .with_opt("comment", self.spec.comment.clone())
    }

    fn create(&self) -> Result<()> {
        let mut params: Params = vec![("name".to_string(), self.spec.name.clone())];
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
    use declarative::{Action, ApplyContext, ReconcileError, reconcile};
    use pvesh::{Response, Verb};
    use serde_json::json;

    fn alias(client: Arc<Client>) -> FirewallAlias {
        FirewallAlias::new(
            FirewallAliasSpec {
                name: "office".into(),
                state: Ensure::Present,
                cidr: "10.1.0.0/16".into(),
                comment: Some("HQ".into()),
            },
            client,
        )
    }

    #[test]
    fn test_400_means_absent() {
        let (mock, client) = mock_client();
        mock.push(
            Verb::Get,
            "cluster/firewall/aliases/office",
            Response::error(400, "no such alias 'office'", None),
        );

        let report = reconcile(&alias(client), &ApplyContext::new(false)).unwrap();
        assert_eq!(report.action, Action::Created);
        let calls = mock.mutating_invocations();
        assert_eq!(calls[0].path, "cluster/firewall/aliases");
        assert_eq!(calls[0].param("name"), Some("office"));
        assert_eq!(calls[0].param("cidr"), Some("10.1.0.0/16"));
    }

    #[test]
    fn test_other_failures_are_lookup_errors() {
        let (mock, client) = mock_client();
        mock.always(
            Verb::Get,
            "cluster/firewall/aliases/office",
            Response::error(500, "cluster not ready", None),
        );

        let err = reconcile(&alias(client), &ApplyContext::new(false)).unwrap_err();
        assert!(matches!(err, ReconcileError::Lookup { .. }));
    }

    #[test]
    fn test_cidr_change_sets_instance() {
        let (mock, client) = mock_client();
        mock.get_returns(
            "cluster/firewall/aliases/office",
            json!({"name": "office", "cidr": "10.2.0.0/16", "comment": "HQ"}),
        );

        let report = reconcile(&alias(client), &ApplyContext::new(false)).unwrap();
        assert_eq!(report.updated_fields, vec!["cidr"]);
        let calls = mock.mutating_invocations();
        assert_eq!(calls[0].path, "cluster/firewall/aliases/office");
        assert_eq!(calls[0].param("cidr"), Some("10.1.0.0/16"));
    }
}
