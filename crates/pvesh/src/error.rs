//! Error types for pvesh operations.
//!
//! Every non-200 [`Response`] maps onto one [`Error`] variant so callers can
//! decide whether a failure means "absent", "rejected" or "broken" without
//! parsing messages themselves.

use crate::types::Response;
use serde_json::Value;
use thiserror::Error;

/// Categories of pvesh failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Entity does not exist (GET only)
    NotFound,
    /// Parameter rejected by pvesh or the API
    Validation,
    /// No handler for the verb/path pairing
    Unsupported,
    /// Unclassified failure
    Unexpected,
    /// The command could not be built or started
    Invocation,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotFound => "Entity not found",
            Self::Validation => "Parameter verification failed",
            Self::Unsupported => "Unsupported operation",
            Self::Unexpected => "Unexpected failure",
            Self::Invocation => "Could not run pvesh",
        }
    }
}

/// Errors that can occur while talking to pvesh.
#[derive(Debug, Error)]
pub enum Error {
    /// 404: the entity does not exist
    #[error("{message}")]
    NotFound {
        /// First stderr line reported by pvesh
        message: String,
    },

    /// 400: a parameter value or name was rejected
    #[error("{message}")]
    Validation {
        /// Rejection details, one line per offending parameter
        message: String,
        /// Anything pvesh printed to stdout alongside the failure
        data: Option<Value>,
    },

    /// 405: pvesh has no handler for this verb on this path
    #[error("{message}")]
    Unsupported {
        /// The "no handler" line from stderr
        message: String,
    },

    /// 500 (or any other status): unclassified failure
    #[error("{message}")]
    Unexpected {
        /// Status code of the response
        status: u16,
        /// Full stderr
        message: String,
        /// Raw stdout, kept for diagnostics
        data: Option<Value>,
    },

    /// A resource path failed validation before any command ran
    #[error("invalid resource path '{path}': {reason}")]
    InvalidPath {
        /// The path as given by the caller
        path: String,
        /// Why it was rejected
        reason: String,
    },

    /// The pvesh process could not be started
    #[error("failed to execute {program}: {source}")]
    Spawn {
        /// Program that was invoked
        program: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Convert a non-200 response into an error.
    pub fn from_response(response: Response) -> Self {
        let message = response.message.unwrap_or_default();
        match response.status {
            404 => Self::NotFound { message },
            400 => Self::Validation {
                message,
                data: response.data,
            },
            405 => Self::Unsupported { message },
            status => Self::Unexpected {
                status,
                message,
                data: response.data,
            },
        }
    }

    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::Unsupported { .. } => ErrorCategory::Unsupported,
            Self::Unexpected { .. } => ErrorCategory::Unexpected,
            Self::InvalidPath { .. } | Self::Spawn { .. } => ErrorCategory::Invocation,
        }
    }

    /// Status code of the response this error came from, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NotFound { .. } => Some(404),
            Self::Validation { .. } => Some(400),
            Self::Unsupported { .. } => Some(405),
            Self::Unexpected { status, .. } => Some(*status),
            Self::InvalidPath { .. } | Self::Spawn { .. } => None,
        }
    }

    /// Data attached to the failed response, if any.
    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Validation { data, .. } | Self::Unexpected { data, .. } => data.as_ref(),
            _ => None,
        }
    }
}

/// Result type for pvesh operations.
pub type Result<T> = std::result::Result<T, Error>;
