//! User account resource (`access/users`)
//!
//! The password is write-only: it is sent when the user is created and never
//! compared afterwards.

use anyhow::{Context, Result, bail};
use declarative::{DesiredState, Ensure, Resource};
use pvesh::{Client, Params, ResourcePath};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::path;

const COLLECTION: &str = "access/users";

fn default_true() -> bool {
    true
}

/// Manifest entry for a user
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserSpec {
    /// `name@realm`
    #[serde(alias = "name")]
    pub userid: String,
    #[serde(default)]
    pub state: Ensure,
    #[serde(default = "default_true")]
    pub enable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Expiry as a unix timestamp, 0 for never
    #[serde(default)]
    pub expire: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firstname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lastname: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

impl fmt::Debug for UserSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserSpec")
            .field("userid", &self.userid)
            .field("state", &self.state)
            .field("enable", &self.enable)
            .field("groups", &self.groups)
            .field("comment", &self.comment)
            .field("email", &self.email)
            .field("expire", &self.expire)
            .field("firstname", &self.firstname)
            .field("lastname", &self.lastname)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug)]
pub struct User {
    spec: UserSpec,
    client: Arc<Client>,
}

impl User {
    pub fn new(spec: UserSpec, client: Arc<Client>) -> Self {
        Self { spec, client }
    }

    fn instance(&self) -> Result<ResourcePath> {
        path(format!("{COLLECTION}/{}", self.spec.userid))
    }
}

impl Resource for User {
    fn id(&self) -> String {
        self.spec.userid.clone()
    }

    fn resource_type(&self) -> &'static str {
        "user"
    }

    fn ensure(&self) -> Ensure {
        self.spec.state
    }

    fn validate(&self) -> Result<()> {
        match self.spec.userid.split_once('@') {
            Some((name, realm)) if !name.is_empty() && !realm.is_empty() => Ok(()),
            _ => bail!(
                "userid '{}' must have the form name@realm",
                self.spec.userid
            ),
        }
    }

    fn lookup(&self) -> Result<Option<Value>> {
        let instance = self.instance()?;
        self.client
            .get(&instance)
            .with_context(|| format!("failed to read {instance}"))
    }

    fn desired(&self) -> DesiredState {
        let spec = &self.spec;
        DesiredState::new()
            .with("enable", spec.enable)
            .with_opt("groups", spec.groups.clone())
            .with_opt("comment", spec.comment.clone())
            .with_opt("email", spec.email.clone())
            .with("expire", spec.expire)
            .with_opt("firstname", spec.firstname.clone())
            .with_opt("lastname", spec.lastname.clone())
    }

    fn create(&self) -> Result<()> {
        let mut params: Params = vec![("userid".to_string(), self.spec.userid.clone())];
        params.extend(self.desired().params());
        if let Some(password) = &self.spec.password {
            params.push(("password".to_string(), password.clone()));
        }
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
    use declarative::{ApplyContext, ReconcileError, reconcile};
    use pvesh::{Response, Verb};
    use serde_json::json;

    fn spec() -> UserSpec {
        UserSpec {
            userid: "alice@pve".into(),
            state: Ensure::Present,
            enable: true,
            groups: Some(vec!["admins".into(), "ops".into()]),
            comment: None,
            email: Some("alice@example.com".into()),
            expire: 0,
            firstname: None,
            lastname: None,
            password: Some("hunter22".into()),
        }
    }

    #[test]
    fn test_userid_needs_realm() {
        let (mock, client) = mock_client();
        let mut spec = spec();
        spec.userid = "alice".into();

        let err = reconcile(&User::new(spec, client), &ApplyContext::new(true)).unwrap_err();
        assert!(matches!(err, ReconcileError::Precondition { .. }));
        assert!(err.to_string().contains("name@realm"));
        assert!(mock.invocations().is_empty());
    }

    #[test]
    fn test_create_includes_password() {
        let (mock, client) = mock_client();
        mock.push(
            Verb::Get,
            "access/users/alice@pve",
            Response::error(404, "no such user ('alice@pve')", None),
        );

        reconcile(&User::new(spec(), client), &ApplyContext::new(false)).unwrap();
        let calls = mock.mutating_invocations();
        assert_eq!(calls[0].path, "access/users");
        assert_eq!(calls[0].param("userid"), Some("alice@pve"));
        assert_eq!(calls[0].param("groups"), Some("admins,ops"));
        assert_eq!(calls[0].param("enable"), Some("1"));
        assert_eq!(calls[0].param("expire"), Some("0"));
        assert_eq!(calls[0].param("password"), Some("hunter22"));
    }

    #[test]
    fn test_groups_compare_as_set_and_password_is_ignored() {
        let (mock, client) = mock_client();
        mock.get_returns(
            "access/users/alice@pve",
            json!({
                "enable": 1,
                "expire": 0,
                "groups": ["ops", "admins"],
                "email": "alice@example.com"
            }),
        );

        let report = reconcile(&User::new(spec(), client), &ApplyContext::new(false)).unwrap();
        assert!(!report.changed);
        assert!(mock.mutating_invocations().is_empty());
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", spec());
        assert!(!rendered.contains("hunter22"));
        assert!(rendered.contains("<redacted>"));
    }
}
