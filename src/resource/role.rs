//! Role resource (`access/roles`)

use anyhow::Result;
use declarative::{DesiredState, Ensure, Resource};
use pvesh::{Client, Params, ResourcePath};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::{find_entry, path};

const COLLECTION: &str = "access/roles";

/// Manifest entry for a role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleSpec {
    #[serde(alias = "roleid")]
    pub name: String,
    #[serde(default)]
    pub state: Ensure,
    /// Privileges, compared as a set
    #[serde(default, alias = "privs")]
    pub privileges: Vec<String>,
}

#[derive(Debug)]
pub struct Role {
    spec: RoleSpec,
    client: Arc<Client>,
}

impl Role {
    pub fn new(spec: RoleSpec, client: Arc<Client>) -> Self {
        Self { spec, client }
    }

    fn instance(&self) -> Result<ResourcePath> {
        path(format!("{COLLECTION}/{}", self.spec.name))
    }
}

impl Resource for Role {
    fn id(&self) -> String {
        self.spec.name.clone()
    }

    fn resource_type(&self) -> &'static str {
        "role"
    }

    fn ensure(&self) -> Ensure {
        self.spec.state
    }

    fn lookup(&self) -> Result<Option<Value>> {
        find_entry(&self.client, COLLECTION, "roleid", &self.spec.name)
    }

    fn desired(&self) -> DesiredState {
        DesiredState::new().with("privs", self.spec.privileges.clone())
    }

    fn create(&self) -> Result<()> {
        let mut params: Params = vec![("roleid".to_string(), self.spec.name.clone())];
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
    use pvesh::Verb;
    use serde_json::json;

    fn role(privileges: &[&str], client: Arc<Client>) -> Role {
        Role::new(
            RoleSpec {
                name: "Auditor".into(),
                state: Ensure::Present,
                privileges: privileges.iter().map(ToString::to_string).collect(),
            },
            client,
        )
    }

    #[test]
    fn test_missing_role_is_created() {
        let (mock, client) = mock_client();
        mock.get_returns("access/roles", json!([{"roleid": "PVEAdmin", "privs": "Sys.Audit"}]));

        let report = reconcile(&role(&["Sys.Audit", "VM.Audit"], client), &ApplyContext::new(false))
            .unwrap();
        assert_eq!(report.action, Action::Created);

        let calls = mock.mutating_invocations();
        assert_eq!(calls[0].verb, Verb::Create);
        assert_eq!(calls[0].path, "access/roles");
        assert_eq!(calls[0].param("roleid"), Some("Auditor"));
        assert_eq!(calls[0].param("privs"), Some("Sys.Audit,VM.Audit"));
    }

    #[test]
    fn test_privileges_compare_as_set() {
        let (mock, client) = mock_client();
        mock.get_returns(
            "access/roles",
            json!([{"roleid": "Auditor", "privs": "VM.Audit,Sys.Audit"}]),
        );

        let report = reconcile(&role(&["Sys.Audit", "VM.Audit"], client), &ApplyContext::new(false))
            .unwrap();
        assert!(!report.changed);
    }

    #[test]
    fn test_changed_privileges_set_instance() {
        let (mock, client) = mock_client();
        mock.get_returns("access/roles", json!([{"roleid": "Auditor", "privs": "VM.Audit"}]));

        let report = reconcile(&role(&["Sys.Audit"], client), &ApplyContext::new(false)).unwrap();
        assert_eq!(report.updated_fields, vec!["privs"]);
        let calls = mock.mutating_invocations();
        assert_eq!(calls[0].verb, Verb::Set);
        assert_eq!(calls[0].path, "access/roles/Auditor");
        assert_eq!(calls[0].param("privs"), Some("Sys.Audit"));
    }
}
