//! Test-double backend that records invocations and serves scripted responses.

use crate::backend::Backend;
use crate::error::Result;
use crate::types::{Params, ResourcePath, Response, Verb};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Verb used
    pub verb: Verb,
    /// Normalized path
    pub path: String,
    /// Parameters in the order they were passed
    pub params: Params,
}

impl Invocation {
    /// Look up a parameter value by key.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Default)]
struct Script {
    queued: HashMap<(Verb, String), VecDeque<Response>>,
    sticky: HashMap<(Verb, String), Response>,
    invocations: Vec<Invocation>,
}

/// Backend for tests.
///
/// Responses queued with [`MockBackend::push`] are served once, in order.
/// Responses set with [`MockBackend::always`] are served whenever the queue for
/// that verb and path is empty. Anything else gets a bare 200.
#[derive(Debug, Default)]
pub struct MockBackend {
    script: Mutex<Script>,
}

impl MockBackend {
    /// Create an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Queue a one-shot response.
    pub fn push(&self, verb: Verb, path: &str, response: Response) -> &Self {
        self.script()
            .queued
            .entry((verb, path.trim_matches('/').to_string()))
            .or_default()
            .push_back(response);
        self
    }

    /// Set a response served every time the queue is empty.
    pub fn always(&self, verb: Verb, path: &str, response: Response) -> &Self {
        self.script()
            .sticky
            .insert((verb, path.trim_matches('/').to_string()), response);
        self
    }

    /// Shorthand for a GET that returns `data`.
    pub fn get_returns(&self, path: &str, data: Value) -> &Self {
        self.always(Verb::Get, path, Response::ok(Some(data)))
    }

    /// Shorthand for a GET that returns 404.
    pub fn get_not_found(&self, path: &str) -> &Self {
        self.always(
            Verb::Get,
            path,
            Response::error(404, format!("'{path}' does not exist"), None),
        )
    }

    /// Every call made so far, in order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.script().invocations.clone()
    }

    /// Calls made with create, set or delete.
    pub fn mutating_invocations(&self) -> Vec<Invocation> {
        self.invocations()
            .into_iter()
            .filter(|i| i.verb.is_mutating())
            .collect()
    }

    /// Forget recorded calls, keeping scripted responses.
    pub fn clear_invocations(&self) {
        self.script().invocations.clear();
    }
}

impl Backend for MockBackend {
    fn execute(&self, verb: Verb, path: &ResourcePath, params: &Params) -> Result<Response> {
        let mut script = self.script();
        script.invocations.push(Invocation {
            verb,
            path: path.to_string(),
            params: params.clone(),
        });

        let key = (verb, path.to_string());
        if let Some(response) = script.queued.get_mut(&key).and_then(VecDeque::pop_front) {
            return Ok(response);
        }
        Ok(script
            .sticky
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Response::ok(None)))
    }
}
