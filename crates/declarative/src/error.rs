//! Reconcile failures

use crate::reconcile::Action;
use thiserror::Error;

/// Why a single resource could not be reconciled
///
/// Every variant carries the resource id so batch output can always say
/// which entry failed.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Declared fields are invalid; nothing was sent
    #[error("{resource_type} '{id}': {message}")]
    Precondition {
        /// Resource id
        id: String,
        /// Resource type
        resource_type: &'static str,
        /// What is wrong with the declaration
        message: String,
    },

    /// Existing state could not be determined
    #[error("{resource_type} '{id}': lookup failed: {source:#}")]
    Lookup {
        /// Resource id
        id: String,
        /// Resource type
        resource_type: &'static str,
        /// Underlying failure
        #[source]
        source: anyhow::Error,
    },

    /// A create, update or remove call failed
    #[error("{resource_type} '{id}': {} failed: {source:#}", .action.verb())]
    Converge {
        /// Resource id
        id: String,
        /// Resource type
        resource_type: &'static str,
        /// What was being attempted
        action: Action,
        /// Underlying failure
        #[source]
        source: anyhow::Error,
    },
}

impl ReconcileError {
    /// Id of the resource that failed
    pub fn id(&self) -> &str {
        match self {
            Self::Precondition { id, .. } | Self::Lookup { id, .. } | Self::Converge { id, .. } => {
                id
            }
        }
    }

    /// Type of the resource that failed
    pub fn resource_type(&self) -> &'static str {
        match self {
            Self::Precondition { resource_type, .. }
            | Self::Lookup { resource_type, .. }
            | Self::Converge { resource_type, .. } => resource_type,
        }
    }

    /// Short label for the failure kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Precondition { .. } => "precondition",
            Self::Lookup { .. } => "lookup",
            Self::Converge { .. } => "converge",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_resource() {
        let err = ReconcileError::Precondition {
            id: "local-lvm".into(),
            resource_type: "storage",
            message: "thinpool is required for lvmthin".into(),
        };
        assert_eq!(
            err.to_string(),
            "storage 'local-lvm': thinpool is required for lvmthin"
        );

        let err = ReconcileError::Converge {
            id: "dev".into(),
            resource_type: "pool",
            action: Action::Modified,
            source: anyhow::anyhow!("comment: value too long"),
        };
        assert_eq!(
            err.to_string(),
            "pool 'dev': update failed: comment: value too long"
        );
        assert_eq!(err.id(), "dev");
        assert_eq!(err.kind(), "converge");
    }
}
