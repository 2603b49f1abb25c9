//! ACME account registration (`cluster/acme/account`)
//!
//! An account is bound to its directory and the terms of service it agreed
//! to. Only the contact can be changed in place; a different directory or
//! newer terms mean deleting the account and registering it again.

use anyhow::{Context, Result, bail};
use declarative::{DesiredState, Ensure, Resource, updated_fields};
use pvesh::{Client, Params, ResourcePath};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::{Arc, OnceLock};

use super::path;

const COLLECTION: &str = "cluster/acme/account";
const TOS: &str = "cluster/acme/tos";

pub const DEFAULT_DIRECTORY: &str = "https://acme-v02.api.letsencrypt.org/directory";

fn default_name() -> String {
    "default".to_string()
}

fn default_directory() -> String {
    DEFAULT_DIRECTORY.to_string()
}

/// Manifest entry for an ACME account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AcmeAccountSpec {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub state: Ensure,
    #[serde(default = "default_directory")]
    pub directory: String,
    /// Contact email
    #[serde(default)]
    pub contact: String,
}

#[derive(Debug)]
pub struct AcmeAccount {
    spec: AcmeAccountSpec,
    client: Arc<Client>,
    /// Terms of service URL, fetched once per run
    tos: OnceLock<Option<String>>,
}

impl AcmeAccount {
    pub fn new(spec: AcmeAccountSpec, client: Arc<Client>) -> Self {
        Self {
            spec,
            client,
            tos: OnceLock::new(),
        }
    }

    fn instance(&self) -> Result<ResourcePath> {
        path(format!("{COLLECTION}/{}", self.spec.name))
    }

    /// Current terms of service URL of the cluster's ACME directory
    fn current_tos(&self) -> Result<Option<String>> {
        if let Some(tos) = self.tos.get() {
            return Ok(tos.clone());
        }
        let tos_path = path(TOS)?;
        let tos = self
            .client
            .get_required(&tos_path)
            .with_context(|| format!("failed to read {tos_path}"))?
            .as_str()
            .map(str::to_string);
        Ok(self.tos.get_or_init(|| tos).clone())
    }

    fn register(&self) -> Result<()> {
        let mut params: Params = vec![
            ("name".to_string(), self.spec.name.clone()),
            ("directory".to_string(), self.spec.directory.clone()),
            ("contact".to_string(), self.spec.contact.clone()),
        ];
        if let Some(tos) = self.current_tos()? {
            params.push(("tos_url".to_string(), tos));
        }
        self.client.create(&path(COLLECTION)?, &params)?;
        Ok(())
    }
}

/// Contact address of an account, without the `mailto:` scheme
fn contact_of(account: &Value) -> Option<&str> {
    let raw = account.get("contact")?.as_array()?.first()?.as_str()?;
    Some(raw.split_once(':').map_or(raw, |(_, address)| address))
}

impl Resource for AcmeAccount {
    fn id(&self) -> String {
        self.spec.name.clone()
    }

    fn resource_type(&self) -> &'static str {
        "acme_account"
    }

    fn ensure(&self) -> Ensure {
        self.spec.state
    }

    fn validate(&self) -> Result<()> {
        if self.spec.contact.trim().is_empty() {
            bail!("contact is required");
        }
        Ok(())
    }

    /// The account endpoint answers an unknown name with a 400. Only the
    /// comparable fields are kept; the rest carries key material.
    fn lookup(&self) -> Result<Option<Value>> {
        let instance = self.instance()?;
        let found = match self.client.get(&instance) {
            Ok(found) => found,
            Err(e) if e.status() == Some(400) => None,
            Err(e) => return Err(e).with_context(|| format!("failed to read {instance}")),
        };
        let Some(account) = found else {
            return Ok(None);
        };

        let contact = account.get("account").and_then(contact_of);
        Ok(Some(json!({
            "name": self.spec.name,
            "contact": contact,
            "directory": account.get("directory"),
            "tos": account.get("tos"),
        })))
    }

    fn desired(&self) -> DesiredState {
        DesiredState::new()
            .with("contact", self.spec.contact.as_str())
            .with("directory", self.spec.directory.as_str())
    }

    fn diff(&self, existing: &Value) -> Vec<String> {
        let mut fields = updated_fields(&self.desired(), existing);
        // unreadable terms are left to the next run
        if let Ok(tos) = self.current_tos() {
            let agreed = existing.get("tos").and_then(Value::as_str);
            if tos.is_some() && agreed != tos.as_deref() {
                fields.push("tos".to_string());
            }
        }
        fields
    }

    fn create(&self) -> Result<()> {
        self.register()
    }

    fn update(&self, _existing: &Value, fields: &[String]) -> Result<()> {
        let recreate = fields.iter().any(|f| f == "directory" || f == "tos");
        if recreate {
            log::info!("acme_account {}: registering again", self.spec.name);
            self.client.delete(&self.instance()?, &Params::new())?;
            return self.register();
        }
        let params: Params = vec![("contact".to_string(), self.spec.contact.clone())];
        self.client.set(&self.instance()?, &params)?;
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

    const TOS_URL: &str = "https://letsencrypt.org/documents/LE-SA-v1.4.pdf";

    fn spec(contact: &str) -> AcmeAccountSpec {
        toml::from_str(&format!("contact = \"{contact}\"")).unwrap()
    }

    fn account(directory: &str, tos: &str) -> Value {
        json!({
            "account": {"contact": ["mailto:admin@example.com"], "status": "valid"},
            "directory": directory,
            "location": "https://acme-v02.api.letsencrypt.org/acme/acct/1",
            "tos": tos,
        })
    }

    #[test]
    fn test_defaults() {
        let spec = spec("admin@example.com");
        assert_eq!(spec.name, "default");
        assert_eq!(spec.directory, DEFAULT_DIRECTORY);
        assert_eq!(spec.state, Ensure::Present);
    }

    #[test]
    fn test_create_agrees_to_current_tos() {
        let (mock, client) = mock_client();
        mock.push(
            Verb::Get,
            "cluster/acme/account/default",
            Response::error(400, "ACME account config file 'default' does not exist.", None),
        );
        mock.get_returns("cluster/acme/tos", json!(TOS_URL));

        let resource = AcmeAccount::new(spec("admin@example.com"), client);
        let report = reconcile(&resource, &ApplyContext::new(false)).unwrap();
        assert_eq!(report.action, Action::Created);

        let calls = mock.mutating_invocations();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].verb, Verb::Create);
        assert_eq!(calls[0].path, "cluster/acme/account");
        assert_eq!(calls[0].param("name"), Some("default"));
        assert_eq!(calls[0].param("contact"), Some("admin@example.com"));
        assert_eq!(calls[0].param("directory"), Some(DEFAULT_DIRECTORY));
        assert_eq!(calls[0].param("tos_url"), Some(TOS_URL));
    }

    #[test]
    fn test_matching_account_is_unchanged() {
        let (mock, client) = mock_client();
        mock.get_returns("cluster/acme/account/default", account(DEFAULT_DIRECTORY, TOS_URL));
        mock.get_returns("cluster/acme/tos", json!(TOS_URL));

        let resource = AcmeAccount::new(spec("admin@example.com"), client);
        let report = reconcile(&resource, &ApplyContext::new(false)).unwrap();
        assert!(!report.changed);
        assert_eq!(report.state.unwrap()["contact"], "admin@example.com");
    }

    #[test]
    fn test_contact_change_sets_in_place() {
        let (mock, client) = mock_client();
        mock.get_returns("cluster/acme/account/default", account(DEFAULT_DIRECTORY, TOS_URL));
        mock.get_returns("cluster/acme/tos", json!(TOS_URL));

        let resource = AcmeAccount::new(spec("ops@example.com"), client);
        let report = reconcile(&resource, &ApplyContext::new(false)).unwrap();
        assert_eq!(report.updated_fields, vec!["contact"]);

        let calls = mock.mutating_invocations();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].verb, Verb::Set);
        assert_eq!(calls[0].path, "cluster/acme/account/default");
        assert_eq!(calls[0].param("contact"), Some("ops@example.com"));
    }

    #[test]
    fn test_new_terms_register_again() {
        let (mock, client) = mock_client();
        mock.get_returns(
            "cluster/acme/account/default",
            account(DEFAULT_DIRECTORY, "https://letsencrypt.org/documents/LE-SA-v1.3.pdf"),
        );
        mock.get_returns("cluster/acme/tos", json!(TOS_URL));

        let resource = AcmeAccount::new(spec("admin@example.com"), client);
        let report = reconcile(&resource, &ApplyContext::new(false)).unwrap();
        assert_eq!(report.updated_fields, vec!["tos"]);

        let calls = mock.mutating_invocations();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].verb, Verb::Delete);
        assert_eq!(calls[0].path, "cluster/acme/account/default");
        assert_eq!(calls[1].verb, Verb::Create);
        assert_eq!(calls[1].param("tos_url"), Some(TOS_URL));
    }

    #[test]
    fn test_directory_change_registers_again() {
        let (mock, client) = mock_client();
        mock.get_returns(
            "cluster/acme/account/default",
            account("https://acme-staging-v02.api.letsencrypt.org/directory", TOS_URL),
        );
        mock.get_returns("cluster/acme/tos", json!(TOS_URL));

        let resource = AcmeAccount::new(spec("admin@example.com"), client);
        let report = reconcile(&resource, &ApplyContext::new(true)).unwrap();
        assert_eq!(report.updated_fields, vec!["directory"]);
        assert!(mock.mutating_invocations().is_empty());

        let resource = AcmeAccount::new(spec("admin@example.com"), Arc::clone(&resource.client));
        reconcile(&resource, &ApplyContext::new(false)).unwrap();
        let calls = mock.mutating_invocations();
        assert_eq!(calls[0].verb, Verb::Delete);
        assert_eq!(calls[1].param("directory"), Some(DEFAULT_DIRECTORY));
    }

    #[test]
    fn test_absent_deletes() {
        let (mock, client) = mock_client();
        mock.get_returns("cluster/acme/account/default", account(DEFAULT_DIRECTORY, TOS_URL));
        mock.get_returns("cluster/acme/tos", json!(TOS_URL));

        let mut spec = spec("admin@example.com");
        spec.state = Ensure::Absent;
        let report = reconcile(&AcmeAccount::new(spec, client), &ApplyContext::new(false)).unwrap();
        assert_eq!(report.action, Action::Removed);
        assert_eq!(mock.mutating_invocations()[0].verb, Verb::Delete);
    }

    #[test]
    fn test_contact_is_required() {
        let (_mock, client) = mock_client();
        let err = reconcile(&AcmeAccount::new(spec(""), client), &ApplyContext::new(true))
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Precondition { .. }));
    }
}
