//! SDN zones and vnets (`cluster/sdn/zones`, `cluster/sdn/vnets`)

use anyhow::{Result, bail};
use declarative::{DesiredState, Ensure, Resource};
use pvesh::{Client, Params, ResourcePath};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::{find_entry, path};

/// Zone types, plus `vnet` for virtual networks inside a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdnKind {
    Qinq,
    Simple,
    Vlan,
    Vxlan,
    #[serde(alias = "vnets")]
    Vnet,
}

impl SdnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qinq => "qinq",
            Self::Simple => "simple",
            Self::Vlan => "vlan",
            Self::Vxlan => "vxlan",
            Self::Vnet => "vnet",
        }
    }

    /// Collection, and the key naming an entry in it
    fn collection(&self) -> (&'static str, &'static str) {
        match self {
            Self::Vnet => ("cluster/sdn/vnets", "vnet"),
            _ => ("cluster/sdn/zones", "zone"),
        }
    }

    fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Qinq => &["bridge", "tag"],
            Self::Simple => &[],
            Self::Vlan => &["bridge"],
            Self::Vxlan => &["peers"],
            Self::Vnet => &["zone"],
        }
    }
}

impl fmt::Display for SdnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Manifest entry for a zone or vnet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SdnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SdnKind,
    #[serde(default)]
    pub state: Ensure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipam: Option<String>,
    /// VXLAN peer addresses, compared as a set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<u32>,
    /// Nodes the zone is restricted to, compared as a set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<String>>,
    /// `802.1q` or `802.1ad`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan_protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Zone a vnet belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlanaware: Option<bool>,
}

impl SdnSpec {
    pub fn is_vnet(&self) -> bool {
        self.kind == SdnKind::Vnet
    }
}

#[derive(Debug)]
pub struct Sdn {
    spec: SdnSpec,
    client: Arc<Client>,
}

impl Sdn {
    pub fn new(spec: SdnSpec, client: Arc<Client>) -> Self {
        Self { spec, client }
    }

    fn instance(&self) -> Result<ResourcePath> {
        let (collection, _) = self.spec.kind.collection();
        path(format!("{collection}/{}", self.spec.name))
    }
}

impl Resource for Sdn {
    fn id(&self) -> String {
        self.spec.name.clone()
    }

    fn resource_type(&self) -> &'static str {
        "sdn"
    }

    fn description(&self) -> String {
        format!("sdn {} {} ({})", self.spec.kind, self.spec.name, self.spec.state)
    }

    fn ensure(&self) -> Ensure {
        self.spec.state
    }

    fn validate(&self) -> Result<()> {
        let desired = self.desired();
        let missing: Vec<&str> = self
            .spec
            .kind
            .required_fields()
            .iter()
            .copied()
            .filter(|field| !desired.contains(field))
            .collect();
        if !missing.is_empty() {
            bail!("{} requires: {}", self.spec.kind, missing.join(", "));
        }

        if let Some(protocol) = &self.spec.vlan_protocol
            && !matches!(protocol.as_str(), "802.1q" | "802.1ad")
        {
            bail!("vlan_protocol must be 802.1q or 802.1ad, not '{protocol}'");
        }
        Ok(())
    }

    fn lookup(&self) -> Result<Option<Value>> {
        let (collection, key) = self.spec.kind.collection();
        find_entry(&self.client, collection, key, &self.spec.name)
    }

    fn desired(&self) -> DesiredState {
        let spec = &self.spec;
        DesiredState::new()
            .with_opt("peers", spec.peers.clone())
            .with_opt("mtu", spec.mtu)
            .with_opt("ipam", spec.ipam.clone())
            .with_opt("tag", spec.tag)
            .with_opt("bridge", spec.bridge.clone())
            .with_opt("nodes", spec.nodes.clone())
            .with_opt("vlan-protocol", spec.vlan_protocol.clone())
            .with_opt("alias", spec.alias.clone())
            .with_opt("zone", spec.zone.clone())
            .with_opt("vlanaware", spec.vlanaware)
    }

    fn create(&self) -> Result<()> {
        let (collection, key) = self.spec.kind.collection();
        let mut params: Params = vec![(key.to_string(), self.spec.name.clone())];
        if !self.spec.is_vnet() {
            params.push(("type".to_string(), self.spec.kind.to_string()));
        }
        params.extend(self.desired().params());
        self.client.create(&path(collection)?, &params)?;
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
