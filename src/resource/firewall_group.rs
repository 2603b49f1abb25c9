//! Cluster firewall security group (`cluster/firewall/groups`)
//!
//! A group is an ordered rule list. Rules are matched to existing ones by
//! position: missing positions are created, differing ones are updated in
//! place and surplus positions are deleted from the highest down so the
//! remaining positions stay stable. A group is emptied the same way before it
//! is deleted, since pvesh refuses to delete a group that still has rules.

use anyhow::{Context, Result};
use declarative::diff::{existing_int, field_differs};
use declarative::{DesiredState, Ensure, Resource};
use pvesh::{Client, Params, ResourcePath};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::{entries, find_entry, path};

const COLLECTION: &str = "cluster/firewall/groups";

/// Optional rule fields; cleared with `delete` when no longer declared
const OPTIONAL_FIELDS: &[&str] = &[
    "source", "dest", "macro", "proto", "dport", "sport", "comment",
];

fn default_action() -> String {
    "ACCEPT".to_string()
}

fn default_direction() -> String {
    "in".to_string()
}

fn default_log() -> String {
    "nolog".to_string()
}

fn default_true() -> bool {
    true
}

/// One rule inside a security group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupRule {
    #[serde(default = "default_action")]
    pub action: String,
    /// `in` or `out`
    #[serde(rename = "type", default = "default_direction")]
    pub direction: String,
    #[serde(default = "default_true")]
    pub enable: bool,
    #[serde(default = "default_log")]
    pub log: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
    #[serde(rename = "macro", default, skip_serializing_if = "Option::is_none")]
    pub macro_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proto: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dport: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sport: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl GroupRule {
    /// Fields as sent to pvesh, without the position
    pub fn fields(&self) -> DesiredState {
        DesiredState::new()
            .with("action", self.action.as_str())
            .with("type", self.direction.as_str())
            .with("enable", self.enable)
            .with("log", self.log.as_str())
            .with_opt("source", self.source.clone())
            .with_opt("dest", self.dest.clone())
            .with_opt("macro", self.macro_name.clone())
            .with_opt("proto", self.proto.clone())
            .with_opt("dport", self.dport.clone())
            .with_opt("sport", self.sport.clone())
            .with_opt("comment", self.comment.clone())
    }

    /// Fields to send to make `existing` match, plus the optional ones to clear
    fn changes(&self, existing: &Value) -> (Vec<String>, Vec<&'static str>) {
        let fields = self.fields();
        let changed = fields
            .iter()
            .filter(|(name, value)| field_differs(value, existing.get(name)))
            .map(|(name, _)| name.to_string())
            .collect();
        let cleared = OPTIONAL_FIELDS
            .iter()
            .copied()
            .filter(|name| !fields.contains(name))
            .filter(|name| existing.get(name).is_some_and(|v| !v.is_null()))
            .collect();
        (changed, cleared)
    }

    fn matches(&self, existing: &Value) -> bool {
        let (changed, cleared) = self.changes(existing);
        changed.is_empty() && cleared.is_empty()
    }
}

/// Manifest entry for a security group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FirewallGroupSpec {
    #[serde(alias = "group")]
    pub name: String,
    #[serde(default)]
    pub state: Ensure,
    /// Only applied when the group is created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub rules: Vec<GroupRule>,
}

#[derive(Debug)]
pub struct FirewallGroup {
    spec: FirewallGroupSpec,
    client: Arc<Client>,
}

impl FirewallGroup {
    pub fn new(spec: FirewallGroupSpec, client: Arc<Client>) -> Self {
        Self { spec, client }
    }

    fn instance(&self) -> Result<ResourcePath> {
        path(format!("{COLLECTION}/{}", self.spec.name))
    }

    fn create_rule(&self, pos: usize, rule: &GroupRule) -> Result<()> {
        let mut params: Params = vec![("pos".to_string(), pos.to_string())];
        params.extend(rule.fields().params());
        self.client
            .create(&self.instance()?, &params)
            .with_context(|| format!("failed to create rule {pos}"))?;
        Ok(())
    }

    /// Delete rules at `positions`, highest first
    fn delete_rules(&self, mut positions: Vec<usize>) -> Result<()> {
        let instance = self.instance()?;
        positions.sort_unstable_by(|a, b| b.cmp(a));
        for pos in positions {
            self.client
                .delete(&instance.join(pos)?, &Params::new())
                .with_context(|| format!("failed to delete rule {pos}"))?;
        }
        Ok(())
    }
}

/// Existing rules keyed by position
fn rule_at(existing: &Value, pos: usize) -> Option<&Value> {
    existing
        .get("rules")
        .and_then(Value::as_array)?
        .iter()
        .find(|rule| rule.get("pos").and_then(existing_int) == Some(pos as i64))
}

fn existing_positions(existing: &Value) -> Vec<usize> {
    existing
        .get("rules")
        .and_then(Value::as_array)
        .map(|rules| {
            rules
                .iter()
                .filter_map(|rule| rule.get("pos").and_then(existing_int))
                .filter_map(|pos| usize::try_from(pos).ok())
                .collect()
        })
        .unwrap_or_default()
}

impl Resource for FirewallGroup {
    fn id(&self) -> String {
        self.spec.name.clone()
    }

    fn resource_type(&self) -> &'static str {
        "firewall_group"
    }

    fn ensure(&self) -> Ensure {
        self.spec.state
    }

    fn lookup(&self) -> Result<Option<Value>> {
        let Some(mut group) = find_entry(&self.client, COLLECTION, "group", &self.spec.name)?
        else {
            return Ok(None);
        };

        let instance = self.instance()?;
        let rules: Vec<Value> = entries(
            self.client
                .get_required(&instance)
                .with_context(|| format!("failed to list {instance}"))?,
        )
        .into_iter()
        .map(|mut rule| {
            // disabled and unlogged rules come back without these keys
            if let Value::Object(fields) = &mut rule {
                fields.remove("digest");
                fields.entry("enable").or_insert(Value::from(0));
                fields.entry("log").or_insert(Value::from("nolog"));
            }
            rule
        })
        .collect();

        if let Value::Object(fields) = &mut group {
            fields.remove("digest");
            fields.insert("rules".to_string(), Value::Array(rules));
        }
        Ok(Some(group))
    }

    fn desired(&self) -> DesiredState {
        DesiredState::new().with_opt("comment", self.spec.comment.clone())
    }

    /// Only the rule list is compared; the comment has no update handler
    fn diff(&self, existing: &Value) -> Vec<String> {
        let surplus = existing_positions(existing)
            .into_iter()
            .any(|pos| pos >= self.spec.rules.len());
        let differs = self
            .spec
            .rules
            .iter()
            .enumerate()
            .any(|(pos, rule)| rule_at(existing, pos).is_none_or(|current| !rule.matches(current)));

        if surplus || differs {
            vec!["rules".to_string()]
        } else {
            Vec::new()
        }
    }

    fn create(&self) -> Result<()> {
        let mut params: Params = vec![("group".to_string(), self.spec.name.clone())];
        params.extend(self.desired().params());
        self.client.create(&path(COLLECTION)?, &params)?;

        for (pos, rule) in self.spec.rules.iter().enumerate() {
            self.create_rule(pos, rule)?;
        }
        Ok(())
    }

    fn update(&self, existing: &Value, _fields: &[String]) -> Result<()> {
        let instance = self.instance()?;

        for (pos, rule) in self.spec.rules.iter().enumerate() {
            let Some(current) = rule_at(existing, pos) else {
                self.create_rule(pos, rule)?;
                continue;
            };

            let (changed, cleared) = rule.changes(current);
            if changed.is_empty() && cleared.is_empty() {
                continue;
            }
            let mut params = rule.fields().params_for(&changed);
            if !cleared.is_empty() {
                params.push(("delete".to_string(), cleared.join(",")));
            }
            self.client
                .set(&instance.join(pos)?, &params)
                .with_context(|| format!("failed to update rule {pos}"))?;
        }

        let surplus = existing_positions(existing)
            .into_iter()
            .filter(|pos| *pos >= self.spec.rules.len())
            .collect();
        self.delete_rules(surplus)
    }

    fn remove(&self, existing: &Value) -> Result<()> {
        self.delete_rules(existing_positions(existing))?;
        self.client.delete(&self.instance()?, &Params::new())?;
        Ok(())
    }
}
