use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::resource::{
    AclSpec, AcmeAccountSpec, FirewallAliasSpec, FirewallGroupSpec, FirewallIpsetSpec,
    FirewallRuleSpec, GroupSpec, MetricServerSpec, PoolSpec, RoleSpec, SdnSpec, StorageSpec,
    UserSpec,
};

/// pvesh executable used when nothing else is configured
pub const DEFAULT_PVESH: &str = "/usr/bin/pvesh";

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("pvesync"))
}

/// Default manifest location, `~/.config/pvesync/manifest.toml`
pub fn default_manifest_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("manifest.toml"))
}

/// Expand `~` and environment variables in a user-supplied path
pub fn expand_path(raw: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(raw).with_context(|| format!("Could not expand {raw}"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestError {
    #[error("duplicate {kind} '{id}'")]
    Duplicate { kind: &'static str, id: String },
}

// ============================================================================
// Manifest
// ============================================================================

/// Desired state of a Proxmox VE node or cluster
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub pools: Vec<PoolSpec>,
    #[serde(default)]
    pub groups: Vec<GroupSpec>,
    #[serde(default)]
    pub roles: Vec<RoleSpec>,
    #[serde(default)]
    pub users: Vec<UserSpec>,
    #[serde(default)]
    pub acls: Vec<AclSpec>,
    #[serde(default)]
    pub storages: Vec<StorageSpec>,
    #[serde(default)]
    pub metric_servers: Vec<MetricServerSpec>,
    #[serde(default)]
    pub acme_accounts: Vec<AcmeAccountSpec>,
    #[serde(default)]
    pub sdn: Vec<SdnSpec>,
    #[serde(default)]
    pub firewall_aliases: Vec<FirewallAliasSpec>,
    #[serde(default)]
    pub firewall_ipsets: Vec<FirewallIpsetSpec>,
    #[serde(default)]
    pub firewall_groups: Vec<FirewallGroupSpec>,
    #[serde(default)]
    pub firewall_rules: Vec<FirewallRuleSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// pvesh executable; `~` is expanded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pvesh: Option<String>,
}

impl Manifest {
    /// Load a manifest; `.json` files are read as JSON, anything else as TOML
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;

        let manifest: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid manifest {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Invalid manifest {}", path.display()))?
        };

        manifest
            .validate()
            .with_context(|| format!("Invalid manifest {}", path.display()))?;
        Ok(manifest)
    }

    /// Reject entries that would reconcile the same object twice
    pub fn validate(&self) -> Result<(), ManifestError> {
        unique("pool", self.pools.iter().map(|s| s.name.clone()))?;
        unique("group", self.groups.iter().map(|s| s.name.clone()))?;
        unique("role", self.roles.iter().map(|s| s.name.clone()))?;
        unique("user", self.users.iter().map(|s| s.userid.clone()))?;
        unique("acl", self.acls.iter().map(AclSpec::id))?;
        unique("storage", self.storages.iter().map(|s| s.name.clone()))?;
        unique("metric_server", self.metric_servers.iter().map(|s| s.id.clone()))?;
        unique("acme_account", self.acme_accounts.iter().map(|s| s.name.clone()))?;
        unique("sdn", self.sdn.iter().map(|s| s.name.clone()))?;
        unique("firewall_alias", self.firewall_aliases.iter().map(|s| s.name.clone()))?;
        unique("firewall_ipset", self.firewall_ipsets.iter().map(|s| s.name.clone()))?;
        unique("firewall_group", self.firewall_groups.iter().map(|s| s.name.clone()))?;
        unique("firewall_rule", self.firewall_rules.iter().map(FirewallRuleSpec::id))?;
        Ok(())
    }

    /// Number of declared resources
    pub fn len(&self) -> usize {
        self.pools.len()
            + self.groups.len()
            + self.roles.len()
            + self.users.len()
            + self.acls.len()
            + self.storages.len()
            + self.metric_servers.len()
            + self.acme_accounts.len()
            + self.sdn.len()
            + self.firewall_aliases.len()
            + self.firewall_ipsets.len()
            + self.firewall_groups.len()
            + self.firewall_rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn unique(kind: &'static str, ids: impl Iterator<Item = String>) -> Result<(), ManifestError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id.clone()) {
            return Err(ManifestError::Duplicate { kind, id });
        }
    }
    Ok(())
}

/// Pick the pvesh executable: flag or environment, then manifest, then default
pub fn resolve_pvesh(cli: Option<&Path>, settings: &Settings) -> Result<PathBuf> {
    if let Some(path) = cli {
        return Ok(path.to_path_buf());
    }
    match &settings.pvesh {
        Some(raw) => expand_path(raw),
        None => Ok(PathBuf::from(DEFAULT_PVESH)),
    }
}
