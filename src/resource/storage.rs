//! Storage definition resource (`storage`)
//!
//! Each storage type needs its own set of fields. The type itself is fixed
//! once the storage exists.

use anyhow::{Result, bail};
use declarative::{DesiredState, Ensure, Resource};
use pvesh::{Client, Params, ResourcePath};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::{find_entry, path};

const COLLECTION: &str = "storage";

/// Supported storage backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Cephfs,
    Dir,
    Rbd,
    Nfs,
    Lvm,
    Lvmthin,
    Zfspool,
}

impl StorageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cephfs => "cephfs",
            Self::Dir => "dir",
            Self::Rbd => "rbd",
            Self::Nfs => "nfs",
            Self::Lvm => "lvm",
            Self::Lvmthin => "lvmthin",
            Self::Zfspool => "zfspool",
        }
    }

    /// Fields that must be set for this type, besides `content`
    fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Cephfs => &[],
            Self::Dir => &["path"],
            Self::Rbd | Self::Zfspool => &["pool"],
            Self::Nfs => &["server", "export"],
            Self::Lvm => &["vgname"],
            Self::Lvmthin => &["vgname", "thinpool"],
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Manifest entry for a storage definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSpec {
    #[serde(alias = "storage")]
    pub name: String,
    #[serde(default)]
    pub state: Ensure,
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// Content types, compared as a set
    pub content: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<String>>,
    #[serde(default)]
    pub disable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monhost: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub krbd: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxfiles: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vgname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinpool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse: Option<bool>,
}

#[derive(Debug)]
pub struct Storage {
    spec: StorageSpec,
    client: Arc<Client>,
}

impl Storage {
    pub fn new(spec: StorageSpec, client: Arc<Client>) -> Self {
        Self { spec, client }
    }

    fn instance(&self) -> Result<ResourcePath> {
        path(format!("{COLLECTION}/{}", self.spec.name))
    }

    fn existing_type<'a>(&self, existing: &'a Value) -> Option<&'a str> {
        existing.get("type").and_then(Value::as_str)
    }
}

impl Resource for Storage {
    fn id(&self) -> String {
        self.spec.name.clone()
    }

    fn resource_type(&self) -> &'static str {
        "storage"
    }

    fn ensure(&self) -> Ensure {
        self.spec.state
    }

    fn validate(&self) -> Result<()> {
        let spec = &self.spec;
        if spec.content.is_empty() {
            bail!("content is required for {} storage", spec.storage_type);
        }

        let desired = self.desired();
        let missing: Vec<&str> = spec
            .storage_type
            .required_fields()
            .iter()
            .copied()
            .filter(|field| !desired.contains(field))
            .collect();
        if !missing.is_empty() {
            bail!(
                "{} storage requires: {}",
                spec.storage_type,
                missing.join(", ")
            );
        }

        if spec.maxfiles.is_some() && !spec.content.iter().any(|c| c == "backup") {
            bail!("maxfiles is not allowed when there is no 'backup' in content");
        }
        if spec.krbd.is_some() && spec.storage_type != StorageType::Rbd {
            bail!("krbd is only allowed with 'rbd' storage type");
        }
        Ok(())
    }

    fn lookup(&self) -> Result<Option<Value>> {
        let mut found = find_entry(&self.client, COLLECTION, "storage", &self.spec.name)?;
        // pvesh omits `disable` while it is false
        if let Some(Value::Object(fields)) = found.as_mut() {
            fields.entry("disable").or_insert(Value::from(0));
        }
        Ok(found)
    }

    fn desired(&self) -> DesiredState {
        let spec = &self.spec;
        DesiredState::new()
            .with("content", spec.content.clone())
            .with_opt("nodes", spec.nodes.clone())
            .with("disable", spec.disable)
            .with_opt("path", spec.path.clone())
            .with_opt("pool", spec.pool.clone())
            .with_opt("monhost", spec.monhost.clone())
            .with_opt("username", spec.username.clone())
            .with_opt("krbd", spec.krbd)
            .with_opt("maxfiles", spec.maxfiles)
            .with_opt("server", spec.server.clone())
            .with_opt("export", spec.export.clone())
            .with_opt("options", spec.options.clone())
            .with_opt("vgname", spec.vgname.clone())
            .with_opt("thinpool", spec.thinpool.clone())
            .with_opt("sparse", spec.sparse)
    }

    fn diff(&self, existing: &Value) -> Vec<String> {
        let mut fields = declarative::updated_fields(&self.desired(), existing);
        if self.existing_type(existing) != Some(self.spec.storage_type.as_str()) {
            fields.insert(0, "type".to_string());
        }
        fields
    }

    fn create(&self) -> Result<()> {
        let mut params: Params = vec![
            ("storage".to_string(), self.spec.name.clone()),
            ("type".to_string(), self.spec.storage_type.to_string()),
        ];
        params.extend(self.desired().params());
        self.client.create(&path(COLLECTION)?, &params)?;
        Ok(())
    }

    fn update(&self, existing: &Value, fields: &[String]) -> Result<()> {
        if fields.iter().any(|f| f == "type") {
            bail!(
                "storage type cannot change from {} to {}",
                self.existing_type(existing).unwrap_or("unknown"),
                self.spec.storage_type
            );
        }
        self.client
            .set(&self.instance()?, &self.desired().params_for(fields))?;
        Ok(())
    }

    fn remove(&self, _existing: &Value) -> Result<()> {
        self.client.delete(&self.instance()?, &Params::new())?;
        Ok(())
    }
}
