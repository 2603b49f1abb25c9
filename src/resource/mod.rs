//! Proxmox VE resources
//!
//! Every kind pairs a manifest entry (`*Spec`) with a shared
//! [`pvesh::Client`] and implements [`declarative::Resource`] against one
//! API collection:
//! - Lookup only ever issues GET calls
//! - Create sends the full parameter set
//! - Update sends only the fields the diff reported
//! - Remove deletes the instance path

use anyhow::{Context, Result};
use declarative::ExecutionPlan;
use pvesh::{Client, ResourcePath};
use serde_json::Value;
use std::sync::Arc;

use crate::config::Manifest;

pub mod acl;
pub mod acme_account;
pub mod firewall_alias;
pub mod firewall_group;
pub mod firewall_ipset;
pub mod firewall_rule;
pub mod group;
pub mod metric_server;
pub mod pool;
pub mod role;
pub mod sdn;
pub mod storage;
pub mod user;

pub use acl::{Acl, AclSpec};
pub use acme_account::{AcmeAccount, AcmeAccountSpec};
pub use firewall_alias::{FirewallAlias, FirewallAliasSpec};
pub use firewall_group::{FirewallGroup, FirewallGroupSpec};
pub use firewall_ipset::{FirewallIpset, FirewallIpsetSpec};
pub use firewall_rule::{FirewallRule, FirewallRuleSpec};
pub use group::{Group, GroupSpec};
pub use metric_server::{MetricServer, MetricServerSpec};
pub use pool::{Pool, PoolSpec};
pub use role::{Role, RoleSpec};
pub use sdn::{Sdn, SdnSpec};
pub use storage::{Storage, StorageSpec};
pub use user::{User, UserSpec};

/// Parse a resource path, turning validation failures into `anyhow` errors
pub(crate) fn path(raw: impl AsRef<str>) -> Result<ResourcePath> {
    Ok(ResourcePath::new(raw)?)
}

/// Items of a listing; anything that is not an array counts as empty
pub(crate) fn entries(listing: Value) -> Vec<Value> {
    match listing {
        Value::Array(items) => items,
        _ => Vec::new(),
    }
}

/// GET a collection and pick the entry whose `key` equals `id`
pub(crate) fn find_entry(
    client: &Client,
    collection: &str,
    key: &str,
    id: &str,
) -> Result<Option<Value>> {
    let listing_path = path(collection)?;
    let listing = client
        .get_required(&listing_path)
        .with_context(|| format!("failed to list {listing_path}"))?;
    Ok(entries(listing)
        .into_iter()
        .find(|entry| entry.get(key).and_then(Value::as_str) == Some(id)))
}

/// Build the execution plan for everything a manifest declares
///
/// Kinds are ordered so that references resolve: pools, groups and roles
/// come before the users and ACLs that name them, zones before vnets, and
/// security groups before the rules that assign them.
pub fn build_plan(manifest: &Manifest, client: &Arc<Client>) -> ExecutionPlan {
    let mut plan = ExecutionPlan::new();

    for spec in &manifest.pools {
        plan.add_resource(Box::new(Pool::new(spec.clone(), Arc::clone(client))));
    }
    for spec in &manifest.groups {
        plan.add_resource(Box::new(Group::new(spec.clone(), Arc::clone(client))));
    }
    for spec in &manifest.roles {
        plan.add_resource(Box::new(Role::new(spec.clone(), Arc::clone(client))));
    }
    for spec in &manifest.users {
        plan.add_resource(Box::new(User::new(spec.clone(), Arc::clone(client))));
    }
    for spec in &manifest.acls {
        plan.add_resource(Box::new(Acl::new(spec.clone(), Arc::clone(client))));
    }
    for spec in &manifest.storages {
        plan.add_resource(Box::new(Storage::new(spec.clone(), Arc::clone(client))));
    }
    for spec in &manifest.metric_servers {
        plan.add_resource(Box::new(MetricServer::new(spec.clone(), Arc::clone(client))));
    }
    for spec in &manifest.acme_accounts {
        plan.add_resource(Box::new(AcmeAccount::new(spec.clone(), Arc::clone(client))));
    }

    let (zones, vnets): (Vec<_>, Vec<_>) = manifest.sdn.iter().partition(|s| !s.is_vnet());
    for spec in zones.into_iter().chain(vnets) {
        plan.add_resource(Box::new(Sdn::new(spec.clone(), Arc::clone(client))));
    }

    for spec in &manifest.firewall_aliases {
        plan.add_resource(Box::new(FirewallAlias::new(spec.clone(), Arc::clone(client))));
    }
    for spec in &manifest.firewall_ipsets {
        plan.add_resource(Box::new(FirewallIpset::new(spec.clone(), Arc::clone(client))));
    }
    for spec in &manifest.firewall_groups {
        plan.add_resource(Box::new(FirewallGroup::new(spec.clone(), Arc::clone(client))));
    }
    for spec in &manifest.firewall_rules {
        plan.add_resource(Box::new(FirewallRule::new(spec.clone(), Arc::clone(client))));
    }

    plan
}

#[cfg(test)]
pub(crate) mod testing {
    use pvesh::Client;
    use pvesh::backend::mock::MockBackend;
    use std::sync::Arc;

    /// A client wired to a scripted backend
    pub fn mock_client() -> (Arc<MockBackend>, Arc<Client>) {
        let mock = Arc::new(MockBackend::new());
        let client = Arc::new(Client::with_backend(Box::new(Arc::clone(&mock))));
        (mock, client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Manifest;
    use serde_json::json;

    #[test]
    fn test_entries_ignores_non_arrays() {
        assert_eq!(entries(json!([{"a": 1}])).len(), 1);
        assert!(entries(Value::Null).is_empty());
        assert!(entries(json!({"a": 1})).is_empty());
    }

    #[test]
    fn test_find_entry_matches_key() {
        let (mock, client) = testing::mock_client();
        mock.get_returns(
            "access/roles",
            json!([{"roleid": "PVEAdmin"}, {"roleid": "Auditor", "privs": "Sys.Audit"}]),
        );

        let found = find_entry(&client, "access/roles", "roleid", "Auditor").unwrap();
        assert_eq!(found, Some(json!({"roleid": "Auditor", "privs": "Sys.Audit"})));
        assert!(
            find_entry(&client, "access/roles", "roleid", "Missing")
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_build_plan_orders_dependencies() {
        let manifest: Manifest = toml::from_str(
            r#"
[[firewall_rules]]
group = "web"
cluster = true

[[users]]
userid = "alice@pve"
groups = ["admins"]

[[sdn]]
name = "vnet1"
type = "vnet"
zone = "zone1"

[[sdn]]
name = "zone1"
type = "simple"

[[groups]]
name = "admins"
"#,
        )
        .unwrap();
        let (_mock, client) = testing::mock_client();

        let plan = build_plan(&manifest, &client);
        let order: Vec<_> = plan.resources.iter().map(|r| r.resource_type()).collect();
        assert_eq!(order, vec!["group", "user", "sdn", "sdn", "firewall_rule"]);
        assert_eq!(plan.resources[2].id(), "zone1");
        assert_eq!(plan.resources[3].id(), "vnet1");
    }
}
