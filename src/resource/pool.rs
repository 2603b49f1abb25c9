//! Resource pool (`pools`)

use anyhow::{Context, Result};
use declarative::{DesiredState, Ensure, Resource};
use pvesh::{Client, Params, ResourcePath};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::path;

const COLLECTION: &str = "pools";

/// Manifest entry for a resource pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolSpec {
    #[serde(alias = "poolid")]
    pub name: String,
    #[serde(default)]
    pub state: Ensure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug)]
pub struct Pool {
    spec: PoolSpec,
    client: Arc<Client>,
}

impl Pool {
    pub fn new(spec: PoolSpec, client: Arc<Client>) -> Self {
        Self { spec, client }
    }

    fn instance(&self) -> Result<ResourcePath> {
        path(format!("{COLLECTION}/{}", self.spec.name))
    }
}

impl Resource for Pool {
    fn id(&self) -> String {
        self.spec.name.clone()
    }

    fn resource_type(&self) -> &'static str {
        "pool"
    }

    fn ensure(&self) -> Ensure {
        self.spec.state
    }

    fn lookup(&self) -> Result<Option<Value>> {
        let instance = self.instance()?;
        self.client
            .get(&instance)
            .with_context(|| format!("failed to read {instance}"))
    }

    fn desired(&self) -> DesiredState {
        DesiredState::new().with_opt("comment", self.spec.comment.clone())
    }

    fn create(&self) -> Result<()> {
        let mut params: Params = vec![("poolid".to_string(), self.spec.name.clone())];
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
