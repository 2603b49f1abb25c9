//! Core types for pvesh invocations.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Parameters passed to pvesh as `-<key> <value>` flag pairs, in order.
pub type Params = Vec<(String, String)>;

/// The four pvesh handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    /// Read-only fetch
    Get,
    /// Create an entity that does not exist yet
    Create,
    /// Partial update of an existing entity
    Set,
    /// Remove an entity
    Delete,
}

impl Verb {
    /// Token passed on the pvesh command line (always lowercase).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Create => "create",
            Self::Set => "set",
            Self::Delete => "delete",
        }
    }

    /// Whether the verb changes remote state.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::Get)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A slash-segmented API path such as `access/groups/admins`.
///
/// Leading and trailing slashes are stripped (pvesh does the same before
/// dispatching). Segments are kept case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourcePath(String);

impl ResourcePath {
    /// Parse and validate a resource path.
    pub fn new(path: impl AsRef<str>) -> Result<Self> {
        let raw = path.as_ref();
        let trimmed = raw.trim_matches('/');

        let invalid = |reason: &str| Error::InvalidPath {
            path: raw.to_string(),
            reason: reason.to_string(),
        };

        if trimmed.is_empty() {
            return Err(invalid("path is empty"));
        }
        if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(invalid("path contains whitespace or control characters"));
        }
        for segment in trimmed.split('/') {
            match segment {
                "" => return Err(invalid("path contains an empty segment")),
                "." | ".." => return Err(invalid("relative segments are not allowed")),
                _ => {}
            }
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Append a segment (or several, separated by `/`).
    pub fn join(&self, segment: impl fmt::Display) -> Result<Self> {
        Self::new(format!("{}/{}", self.0, segment))
    }

    /// The normalized path string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ResourcePath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ResourcePath> for String {
    fn from(path: ResourcePath) -> Self {
        path.0
    }
}

/// Normalized outcome of a single pvesh invocation.
///
/// A 200 response never carries a message; every other status does. Data may
/// be attached to error responses when pvesh printed something to stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// HTTP-like status code
    pub status: u16,
    /// Error message for non-200 responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Decoded payload (JSON when possible, raw text otherwise)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Response {
    /// A successful response, optionally carrying data.
    pub fn ok(data: Option<Value>) -> Self {
        Self {
            status: 200,
            message: None,
            data,
        }
    }

    /// A failed response.
    pub fn error(status: u16, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            status,
            message: Some(message.into()),
            data,
        }
    }

    /// Whether the status is 200.
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_path_strips_slashes() {
        let path = ResourcePath::new("/access/groups/").unwrap();
        assert_eq!(path.as_str(), "access/groups");
    }

    #[test]
    fn test_resource_path_keeps_case() {
        let path = ResourcePath::new("access/groups/Admins").unwrap();
        assert_eq!(path.to_string(), "access/groups/Admins");
    }

    #[test]
    fn test_resource_path_rejects_bad_input() {
        assert!(ResourcePath::new("").is_err());
        assert!(ResourcePath::new("///").is_err());
        assert!(ResourcePath::new("access//groups").is_err());
        assert!(ResourcePath::new("access/../nodes").is_err());
        assert!(ResourcePath::new("access/groups; rm").is_err());
    }

    #[test]
    fn test_resource_path_join() {
        let base = ResourcePath::new("cluster/firewall/ipset").unwrap();
        let joined = base.join("office").unwrap().join("10.0.0.0/24").unwrap();
        assert_eq!(joined.as_str(), "cluster/firewall/ipset/office/10.0.0.0/24");
    }

    #[test]
    fn test_verb_tokens() {
        assert_eq!(Verb::Get.as_str(), "get");
        assert_eq!(Verb::Delete.to_string(), "delete");
        assert!(!Verb::Get.is_mutating());
        assert!(Verb::Set.is_mutating());
    }
}
