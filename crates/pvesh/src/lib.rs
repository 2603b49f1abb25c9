//! # pvesh
//!
//! Thin, typed wrapper around the Proxmox VE `pvesh` command-line tool.
//!
//! Every call runs exactly one `pvesh` process and turns whatever it printed
//! into a normalized [`Response`]:
//! - `200` with decoded JSON (or raw text) on success
//! - `400` when a parameter was rejected
//! - `404` when a GET names an entity that does not exist
//! - `405` when the path has no handler for the verb
//! - `500` for anything else
//!
//! ## Example
//!
//! ```no_run
//! use pvesh::{Client, ResourcePath};
//!
//! let client = Client::new();
//! let path = ResourcePath::new("pools/dev").unwrap();
//!
//! match client.get(&path).unwrap() {
//!     Some(pool) => println!("{pool}"),
//!     None => println!("pool does not exist"),
//! }
//! ```
//!
//! ## Testing
//!
//! [`backend::mock::MockBackend`] records every invocation and serves scripted
//! responses, so reconciliation logic can be exercised without a node.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod classify;
pub mod error;
pub mod types;

pub use error::{Error, ErrorCategory, Result};
pub use types::{Params, ResourcePath, Response, Verb};

use backend::{Backend, pvesh::PveshBackend};
use serde_json::Value;
use std::path::PathBuf;

/// High-level client for pvesh operations.
///
/// The client wraps a backend and maps non-200 responses onto [`Error`].
pub struct Client {
    backend: Box<dyn Backend>,
}

impl Client {
    /// Create a client that runs `/usr/bin/pvesh`.
    pub fn new() -> Self {
        Self::with_backend(Box::new(backend::default_backend()))
    }

    /// Create a client that runs a different pvesh executable.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self::with_backend(Box::new(PveshBackend::new(program)))
    }

    /// Create a client with a custom backend (useful for testing).
    pub fn with_backend(backend: Box<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Run one verb and return the raw response, whatever its status.
    pub fn execute(&self, verb: Verb, path: &ResourcePath, params: &Params) -> Result<Response> {
        self.backend.execute(verb, path, params)
    }

    /// Fetch an entity.
    ///
    /// Returns `Ok(None)` when pvesh reports it does not exist. A successful
    /// call with no output yields `Some(Value::Null)`.
    pub fn get(&self, path: &ResourcePath) -> Result<Option<Value>> {
        let response = self.execute(Verb::Get, path, &Params::new())?;
        match response.status {
            200 => Ok(Some(response.data.unwrap_or(Value::Null))),
            404 => Ok(None),
            _ => Err(Error::from_response(response)),
        }
    }

    /// Fetch an entity that must exist.
    pub fn get_required(&self, path: &ResourcePath) -> Result<Value> {
        let response = self.execute(Verb::Get, path, &Params::new())?;
        Self::check(response).map(|data| data.unwrap_or(Value::Null))
    }

    /// Create an entity.
    pub fn create(&self, path: &ResourcePath, params: &Params) -> Result<Option<Value>> {
        let response = self.execute(Verb::Create, path, params)?;
        Self::check(response)
    }

    /// Update an existing entity.
    pub fn set(&self, path: &ResourcePath, params: &Params) -> Result<Option<Value>> {
        let response = self.execute(Verb::Set, path, params)?;
        Self::check(response)
    }

    /// Remove an entity.
    pub fn delete(&self, path: &ResourcePath, params: &Params) -> Result<Option<Value>> {
        let response = self.execute(Verb::Delete, path, params)?;
        Self::check(response)
    }

    fn check(response: Response) -> Result<Option<Value>> {
        if response.is_success() {
            Ok(response.data)
        } else {
            Err(Error::from_response(response))
        }
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}
