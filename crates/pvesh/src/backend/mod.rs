//! Backend abstraction for pvesh invocations.
//!
//! The [`Backend`] trait is the single seam between the reconciler and the
//! outside world, allowing for different implementations (real CLI, mock for
//! testing).

pub mod mock;
pub mod pvesh;

use crate::error::Result;
use crate::types::{Params, ResourcePath, Response, Verb};
use std::sync::Arc;

/// Backend trait for pvesh operations.
///
/// Implementations run exactly one command per call and never retry.
/// `Err` is reserved for failures to run the command at all; anything pvesh
/// itself reports comes back as a non-200 [`Response`].
pub trait Backend: Send + Sync {
    /// Run one verb against one path.
    fn execute(&self, verb: Verb, path: &ResourcePath, params: &Params) -> Result<Response>;
}

impl<B: Backend + ?Sized> Backend for Arc<B> {
    fn execute(&self, verb: Verb, path: &ResourcePath, params: &Params) -> Result<Response> {
        (**self).execute(verb, path, params)
    }
}

/// Get the default backend (real pvesh CLI).
pub fn default_backend() -> pvesh::PveshBackend {
    pvesh::PveshBackend::default()
}
