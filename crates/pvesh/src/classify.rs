//! Turn raw pvesh output into a [`Response`].
//!
//! pvesh exits non-zero for some successes and zero for some failures, so the
//! exit code is ignored here. stderr content is the only failure signal.

use crate::types::{ResourcePath, Response, Verb};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// First stderr line when a parameter value is rejected.
pub const PARAMETER_VERIFICATION_FAILED: &str = "400 Parameter verification failed.";

/// Prefix of the second-to-last stderr line when a parameter name is rejected.
pub const UNABLE_TO_PARSE: &str = "400 unable to parse";

/// Message used when pvesh failed without saying anything.
pub const NO_ERROR_MESSAGE: &str =
    "Unexpected result occurred but no error message was provided by pvesh.";

static NOT_FOUND_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^no such user \('.{3,64}?'\)$",
        r"^(group|role|pool) '[A-Za-z0-9.\-_]+' does not exist$",
        r"^domain '[A-Za-z][A-Za-z0-9.\-_]+' does not exist$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("hardcoded regex pattern is valid"))
    .collect()
});

/// Classify the captured output of one pvesh invocation.
pub fn classify(verb: Verb, path: &ResourcePath, stdout: &str, stderr: &str) -> Response {
    let lines: Vec<&str> = stderr.lines().collect();

    let Some(first) = lines.first() else {
        return success(stdout);
    };

    if *first == PARAMETER_VERIFICATION_FAILED {
        let details = lines.get(1..lines.len().saturating_sub(1)).unwrap_or_default();
        return Response::error(400, details.join("\n"), None);
    }

    if *first == format!("no '{verb}' handler for '{path}'") {
        return Response::error(405, *first, None);
    }

    if verb == Verb::Get && NOT_FOUND_PATTERNS.iter().any(|re| re.is_match(first)) {
        return Response::error(404, *first, None);
    }

    if lines.len() >= 2 && lines[lines.len() - 2].starts_with(UNABLE_TO_PARSE) {
        return Response::error(400, lines[..lines.len() - 1].join("\n"), None);
    }

    let message = lines.join("\n");
    if message.trim().is_empty() && stdout.trim().is_empty() {
        return Response::error(500, NO_ERROR_MESSAGE, None);
    }

    let data = (!stdout.is_empty()).then(|| Value::String(stdout.to_string()));
    Response::error(500, message, data)
}

fn success(stdout: &str) -> Response {
    if stdout.trim().is_empty() {
        return Response::ok(None);
    }

    match serde_json::from_str::<Value>(stdout) {
        Ok(data) => Response::ok(Some(data)),
        Err(_) => Response::ok(Some(Value::String(stdout.to_string()))),
    }
}
