//! Cluster firewall IP set (`cluster/firewall/ipset`)
//!
//! Sets have no update handler of their own. Membership is converged entry by
//! entry and the comment can only be given at creation.

use anyhow::{Context, Result};
use declarative::diff::existing_set;
use declarative::{DesiredState, Ensure, Resource};
use pvesh::{Client, Params, ResourcePath};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::{entries, find_entry, path};

const COLLECTION: &str = "cluster/firewall/ipset";

/// Manifest entry for an IP set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FirewallIpsetSpec {
    pub name: String,
    #[serde(default)]
    pub state: Ensure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Member CIDRs, compared as a set
    #[serde(default)]
    pub entries: Vec<String>,
}

#[derive(Debug)]
pub struct FirewallIpset {
    spec: FirewallIpsetSpec,
    client: Arc<Client>,
}

impl FirewallIpset {
    pub fn new(spec: FirewallIpsetSpec, client: Arc<Client>) -> Self {
        Self { spec, client }
    }

    fn instance(&self) -> Result<ResourcePath> {
        path(format!("{COLLECTION}/{}", self.spec.name))
    }

    fn add_entry(&self, cidr: &str) -> Result<()> {
        let params: Params = vec![("cidr".to_string(), cidr.to_string())];
        self.client
            .create(&self.instance()?, &params)
            .with_context(|| format!("failed to add {cidr}"))?;
        Ok(())
    }

    fn remove_entry(&self, cidr: &str) -> Result<()> {
        self.client
            .delete(&self.instance()?.join(cidr)?, &Params::new())
            .with_context(|| format!("failed to remove {cidr}"))?;
        Ok(())
    }

    fn desired_entries(&self) -> BTreeSet<String> {
        self.spec.entries.iter().map(|e| e.trim().to_string()).collect()
    }
}

fn current_entries(existing: &Value) -> BTreeSet<String> {
    existing
        .get("entries")
        .and_then(existing_set)
        .unwrap_or_default()
}

impl Resource for FirewallIpset {
    fn id(&self) -> String {
        self.spec.name.clone()
    }

    fn resource_type(&self) -> &'static str {
        "firewall_ipset"
    }

    fn ensure(&self) -> Ensure {
        self.spec.state
    }

    fn lookup(&self) -> Result<Option<Value>> {
        let Some(mut set) = find_entry(&self.client, COLLECTION, "name", &self.spec.name)? else {
            return Ok(None);
        };

        let instance = self.instance()?;
        let members: Vec<Value> = entries(
            self.client
                .get_required(&instance)
                .with_context(|| format!("failed to list {instance}"))?,
        )
        .into_iter()
        .filter_map(|entry| entry.get("cidr").cloned())
        .collect();

        if let Value::Object(fields) = &mut set {
            fields.insert("entries".to_string(), Value::Array(members));
        }
        Ok(Some(set))
    }

    fn desired(&self) -> DesiredState {
        DesiredState::new().with("entries", self.spec.entries.clone())
    }

    fn create(&self) -> Result<()> {
        let mut params: Params = vec![("name".to_string(), self.spec.name.clone())];
        if let Some(comment) = &self.spec.comment {
            params.push(("comment".to_string(), comment.clone()));
        }
        self.client.create(&path(COLLECTION)?, &params)?;

        for cidr in &self.spec.entries {
            self.add_entry(cidr)?;
        }
        Ok(())
    }

    fn update(&self, existing: &Value, _fields: &[String]) -> Result<()> {
        let current = current_entries(existing);
        let desired = self.desired_entries();

        for cidr in desired.difference(&current) {
            self.add_entry(cidr)?;
        }
        for cidr in current.difference(&desired) {
            self.remove_entry(cidr)?;
        }
        Ok(())
    }

    /// A set can only be deleted once it is empty
    fn remove(&self, existing: &Value) -> Result<()> {
        for cidr in current_entries(existing) {
            self.remove_entry(&cidr)?;
        }
        self.client.delete(&self.instance()?, &Params::new())?;
        Ok(())
    }
}
