//! External metric server (`cluster/metrics/server`)

use anyhow::{Result, bail};
use declarative::{DesiredState, Ensure, Resource};
use pvesh::{Client, Params, ResourcePath};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::{find_entry, path};

const COLLECTION: &str = "cluster/metrics/server";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricServerType {
    #[default]
    Influxdb,
    Graphite,
}

impl MetricServerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Influxdb => "influxdb",
            Self::Graphite => "graphite",
        }
    }

    /// Parameter carrying the transport protocol
    fn protocol_key(&self) -> &'static str {
        match self {
            Self::Influxdb => "influxdbproto",
            Self::Graphite => "proto",
        }
    }
}

impl fmt::Display for MetricServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Udp,
    Tcp,
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    fn is_http(&self) -> bool {
        matches!(self, Self::Http | Self::Https)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_port() -> u16 {
    8089
}

/// Manifest entry for a metric server
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricServerSpec {
    pub id: String,
    #[serde(default)]
    pub state: Ensure,
    #[serde(rename = "type", default)]
    pub server_type: MetricServerType,
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub disable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    /// InfluxDB API token; sent but never read back
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
    /// Graphite metric path prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_path_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_body_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_certificate: Option<bool>,
}

impl fmt::Debug for MetricServerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricServerSpec")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("server_type", &self.server_type)
            .field("server", &self.server)
            .field("port", &self.port)
            .field("protocol", &self.protocol)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl MetricServerSpec {
    fn check(&self) -> Result<()> {
        let influx_only = [
            ("organization", self.organization.is_some()),
            ("bucket", self.bucket.is_some()),
            ("token", self.token.is_some()),
        ];
        let not_with_mtu = [
            ("organization", self.organization.is_some()),
            ("bucket", self.bucket.is_some()),
            ("token", self.token.is_some()),
            ("api_path_prefix", self.api_path_prefix.is_some()),
            ("timeout", self.timeout.is_some()),
            ("max_body_size", self.max_body_size.is_some()),
            ("verify_certificate", self.verify_certificate.is_some()),
        ];
        let not_with_path = [
            ("organization", self.organization.is_some()),
            ("bucket", self.bucket.is_some()),
            ("token", self.token.is_some()),
            ("api_path_prefix", self.api_path_prefix.is_some()),
            ("max_body_size", self.max_body_size.is_some()),
            ("verify_certificate", self.verify_certificate.is_some()),
        ];

        let graphite = self.server_type == MetricServerType::Graphite;
        let udp = self.protocol == Protocol::Udp;

        if self.protocol.is_http() {
            let missing: Vec<&str> = influx_only
                .iter()
                .filter(|(_, set)| !set)
                .map(|(name, _)| *name)
                .collect();
            if !missing.is_empty() {
                bail!("{} requires: {}", self.protocol, missing.join(", "));
            }
        }
        if graphite && self.protocol != Protocol::Tcp && !udp {
            bail!("graphite only supports tcp or udp, not {}", self.protocol);
        }
        if !graphite && self.protocol == Protocol::Tcp {
            bail!("influxdb does not support tcp");
        }
        if self.mtu.is_some() && !udp {
            bail!("mtu is only valid with udp");
        }
        if self.path.is_some() && !graphite {
            bail!("path is only valid for graphite");
        }
        if graphite && let Some((name, _)) = influx_only.iter().find(|(_, set)| *set) {
            bail!("{name} is only valid for influxdb");
        }
        if self.timeout.is_some() && udp {
            bail!("timeout is not valid with udp");
        }
        if self.max_body_size.is_some() && (udp || graphite) {
            bail!("max_body_size is not valid with udp or graphite");
        }
        if self.verify_certificate.is_some() && self.protocol != Protocol::Https {
            bail!("verify_certificate is only valid with https");
        }
        if self.mtu.is_some()
            && let Some((name, _)) = not_with_mtu.iter().find(|(_, set)| *set)
        {
            bail!("{name} cannot be combined with mtu");
        }
        if self.path.is_some()
            && let Some((name, _)) = not_with_path.iter().find(|(_, set)| *set)
        {
            bail!("{name} cannot be combined with path");
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct MetricServer {
    spec: MetricServerSpec,
    client: Arc<Client>,
}

impl MetricServer {
    pub fn new(spec: MetricServerSpec, client: Arc<Client>) -> Self {
        Self { spec, client }
    }

    fn instance(&self) -> Result<ResourcePath> {
        path(format!("{COLLECTION}/{}", self.spec.id))
    }

    fn with_token(&self, mut params: Params) -> Params {
        if let Some(token) = &self.spec.token {
            params.push(("token".to_string(), token.clone()));
        }
        params
    }
}

impl Resource for MetricServer {
    fn id(&self) -> String {
        self.spec.id.clone()
    }

    fn resource_type(&self) -> &'static str {
        "metric_server"
    }

    fn description(&self) -> String {
        format!(
            "metric_server {} {}:{} ({})",
            self.spec.server_type, self.spec.server, self.spec.port, self.spec.state
        )
    }

    fn ensure(&self) -> Ensure {
        self.spec.state
    }

    fn validate(&self) -> Result<()> {
        self.spec.check()
    }

    fn lookup(&self) -> Result<Option<Value>> {
        find_entry(&self.client, COLLECTION, "id", &self.spec.id)
    }

    fn desired(&self) -> DesiredState {
        let spec = &self.spec;
        DesiredState::new()
            .with("server", spec.server.as_str())
            .with("port", spec.port)
            .with(spec.server_type.protocol_key(), spec.protocol.as_str())
            .with("disable", spec.disable)
            .with_opt("organization", spec.organization.clone())
            .with_opt("bucket", spec.bucket.clone())
            .with_opt("path", spec.path.clone())
            .with_opt("api-path-prefix", spec.api_path_prefix.clone())
            .with_opt("timeout", spec.timeout)
            .with_opt("max-body-size", spec.max_body_size)
            .with_opt("mtu", spec.mtu)
            .with_opt("verify-certificate", spec.verify_certificate)
    }

    fn create(&self) -> Result<()> {
        let mut params: Params = vec![("type".to_string(), self.spec.server_type.to_string())];
        params.extend(self.desired().params());
        self.client
            .create(&self.instance()?, &self.with_token(params))?;
        Ok(())
    }

    fn update(&self, _existing: &Value, fields: &[String]) -> Result<()> {
        let params = self.with_token(self.desired().params_for(fields));
        self.client.set(&self.instance()?, &params)?;
        Ok(())
    }

    fn remove(&self, _existing: &Value) -> Result<()> {
        self.client.delete(&self.instance()?, &Params::new())?;
        Ok(())
    }

    /// Removing a server without a stored credentials file still succeeds
    /// on the API side but reports an error
    fn tolerates(&self, error: &anyhow::Error) -> bool {
        let prefix = format!("removing {} credentials file", self.spec.server_type);
        error
            .chain()
            .any(|cause| cause.to_string().trim_start().starts_with(&prefix))
    }
}
