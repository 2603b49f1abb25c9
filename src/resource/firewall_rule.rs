//! Security group assignment (`<scope>/firewall/rules`)
//!
//! Assigns a security group to the cluster, a node or a single VM by keeping
//! a `type=group` rule whose action names the group.

use anyhow::{Context, Result, anyhow};
use declarative::diff::existing_int;
use declarative::{DesiredState, Ensure, Resource};
use pvesh::{Client, Params, ResourcePath};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::{entries, path};

/// Manifest entry for a group assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FirewallRuleSpec {
    /// Security group to assign
    #[serde(alias = "name")]
    pub group: String,
    #[serde(default)]
    pub state: Ensure,
    #[serde(default)]
    pub cluster: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(default, alias = "qemu", skip_serializing_if = "Option::is_none")]
    pub vm: Option<u32>,
}

impl FirewallRuleSpec {
    /// Group name plus the scope it is assigned to
    pub fn id(&self) -> String {
        match Scope::from_spec(self) {
            Ok(scope) => format!("{}@{scope}", self.group),
            Err(_) => self.group.clone(),
        }
    }
}

/// Where the rule lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Cluster,
    Node(String),
    Vm { node: String, vmid: u32 },
}

impl Scope {
    /// Cluster wins over a VM, a VM over its node
    fn from_spec(spec: &FirewallRuleSpec) -> Result<Self> {
        if spec.cluster {
            return Ok(Self::Cluster);
        }
        match (&spec.node, spec.vm) {
            (Some(node), Some(vmid)) => Ok(Self::Vm {
                node: node.clone(),
                vmid,
            }),
            (Some(node), None) => Ok(Self::Node(node.clone())),
            (None, Some(vmid)) => Err(anyhow!("vm {vmid} needs the node it runs on")),
            (None, None) => Err(anyhow!("one of cluster, node or vm must be set")),
        }
    }

    fn rules_path(&self) -> String {
        match self {
            Self::Cluster => "cluster/firewall/rules".to_string(),
            Self::Node(node) => format!("nodes/{node}/firewall/rules"),
            Self::Vm { node, vmid } => format!("nodes/{node}/qemu/{vmid}/firewall/rules"),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cluster => f.write_str("cluster"),
            Self::Node(node) => f.write_str(node),
            Self::Vm { node, vmid } => write!(f, "{node}/{vmid}"),
        }
    }
}

#[derive(Debug)]
pub struct FirewallRule {
    spec: FirewallRuleSpec,
    client: Arc<Client>,
}

impl FirewallRule {
    pub fn new(spec: FirewallRuleSpec, client: Arc<Client>) -> Self {
        Self { spec, client }
    }

    fn base(&self) -> Result<ResourcePath> {
        path(Scope::from_spec(&self.spec)?.rules_path())
    }

    fn position(&self, existing: &Value) -> Result<ResourcePath> {
        let pos = existing
            .get("pos")
            .and_then(existing_int)
            .context("existing rule has no position")?;
        Ok(self.base()?.join(pos)?)
    }
}

impl Resource for FirewallRule {
    fn id(&self) -> String {
        self.spec.id()
    }

    fn resource_type(&self) -> &'static str {
        "firewall_rule"
    }

    fn ensure(&self) -> Ensure {
        self.spec.state
    }

    fn validate(&self) -> Result<()> {
        Scope::from_spec(&self.spec).map(|_| ())
    }

    fn lookup(&self) -> Result<Option<Value>> {
        let base = self.base()?;
        let listing = self
            .client
            .get_required(&base)
            .with_context(|| format!("failed to list {base}"))?;

        let found = entries(listing).into_iter().find(|rule| {
            rule.get("type").and_then(Value::as_str) == Some("group")
                && rule.get("action").and_then(Value::as_str) == Some(self.spec.group.as_str())
        });
        Ok(found.map(|mut rule| {
            if let Value::Object(fields) = &mut rule {
                fields.remove("digest");
                fields.entry("enable").or_insert(Value::from(0));
            }
            rule
        }))
    }

    fn desired(&self) -> DesiredState {
        DesiredState::new()
            .with("enable", true)
            .with("type", "group")
            .with("action", self.spec.group.as_str())
    }

    fn create(&self) -> Result<()> {
        self.client.create(&self.base()?, &self.desired().params())?;
        Ok(())
    }

    fn update(&self, existing: &Value, fields: &[String]) -> Result<()> {
        self.client
            .set(&self.position(existing)?, &self.desired().params_for(fields))?;
        Ok(())
    }

    fn remove(&self, existing: &Value) -> Result<()> {
        self.client
            .delete(&self.position(existing)?, &Params::new())?;
        Ok(())
    }
}
