//! Resource trait for declarative state management
//!
//! A Resource is one remote entity that should either exist with a given
//! set of fields or not exist at all. The reconciler drives it through
//! lookup, diff and converge; the resource only knows how to talk to its
//! own endpoint.

use crate::diff::updated_fields;
use crate::state::{DesiredState, Ensure};
use anyhow::Result;
use serde_json::Value;
use std::fmt;

/// Core trait for declarative resources
///
/// Every resource in the system implements this trait, which provides:
/// - Identity (id, description, type)
/// - Local validation of the declared fields
/// - Lookup of the existing state (`None` when it does not exist)
/// - The three converge operations (create, update, remove)
///
/// # Example
///
/// ```ignore
/// use declarative::{DesiredState, Resource};
/// use serde_json::Value;
///
/// #[derive(Debug)]
/// struct Pool {
///     id: String,
///     comment: String,
///     client: std::sync::Arc<pvesh::Client>,
/// }
///
/// impl Resource for Pool {
///     fn id(&self) -> String {
///         self.id.clone()
///     }
///
///     fn resource_type(&self) -> &'static str {
///         "pool"
///     }
///
///     fn lookup(&self) -> anyhow::Result<Option<Value>> {
///         Ok(self.client.get(&format!("pools/{}", self.id).parse()?)?)
///     }
///
///     fn desired(&self) -> DesiredState {
///         DesiredState::new().with("comment", self.comment.as_str())
///     }
///
///     // create / update / remove issue one pvesh call each
/// #   fn create(&self) -> anyhow::Result<()> { Ok(()) }
/// #   fn update(&self, _: &Value, _: &[String]) -> anyhow::Result<()> { Ok(()) }
/// #   fn remove(&self, _: &Value) -> anyhow::Result<()> { Ok(()) }
/// }
/// ```
pub trait Resource: Send + Sync + fmt::Debug {
    /// Unique identifier for this resource
    ///
    /// This should be stable and uniquely identify the resource
    /// within its type. Examples:
    /// - "admins" for a group
    /// - "alice@pve" for a user
    /// - "/vms/100" for an ACL entry
    fn id(&self) -> String;

    /// Resource type category
    ///
    /// Used for grouping, reporting and target filtering.
    fn resource_type(&self) -> &'static str;

    /// Human-readable description of what this resource does
    fn description(&self) -> String {
        format!("{} {} ({})", self.resource_type(), self.id(), self.ensure())
    }

    /// Whether the resource should exist
    fn ensure(&self) -> Ensure {
        Ensure::Present
    }

    /// Check field combinations before anything is sent
    ///
    /// Only called when the resource should be present. Must not make any
    /// external call.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Fetch the existing state, `None` when the entity does not exist
    ///
    /// Errors mean the state could not be determined and are never read as
    /// "absent".
    fn lookup(&self) -> Result<Option<Value>>;

    /// Fields the default diff compares against the existing state
    fn desired(&self) -> DesiredState;

    /// Names of fields that need to change
    fn diff(&self, existing: &Value) -> Vec<String> {
        updated_fields(&self.desired(), existing)
    }

    /// Create the entity with its full parameter set
    fn create(&self) -> Result<()>;

    /// Send only the given fields to an existing entity
    fn update(&self, existing: &Value, fields: &[String]) -> Result<()>;

    /// Remove an existing entity
    fn remove(&self, existing: &Value) -> Result<()>;

    /// Whether a converge failure is known to be benign
    fn tolerates(&self, _error: &anyhow::Error) -> bool {
        false
    }
}

/// A boxed resource for type-erased storage
pub type BoxedResource = Box<dyn Resource>;
