//! Real backend that runs `/usr/bin/pvesh`.

use crate::backend::Backend;
use crate::classify::classify;
use crate::error::{Error, Result};
use crate::types::{Params, ResourcePath, Response, Verb};
use std::path::PathBuf;
use std::process::Command;

/// Default location of pvesh on a Proxmox VE node.
pub const DEFAULT_PROGRAM: &str = "/usr/bin/pvesh";

/// Backend that executes real `pvesh` commands.
#[derive(Debug, Clone)]
pub struct PveshBackend {
    /// Path to the pvesh executable
    program: PathBuf,
}

impl PveshBackend {
    /// Create a backend that runs the given program.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Build the argument vector for one invocation.
    pub fn command_args(verb: Verb, path: &ResourcePath, params: &Params) -> Vec<String> {
        let mut args = vec![
            verb.as_str().to_string(),
            path.to_string(),
            "--output=json".to_string(),
        ];
        for (key, value) in params {
            args.push(format!("-{key}"));
            args.push(value.clone());
        }
        args
    }
}

impl Default for PveshBackend {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl Backend for PveshBackend {
    fn execute(&self, verb: Verb, path: &ResourcePath, params: &Params) -> Result<Response> {
        let args = Self::command_args(verb, path, params);
        log::debug!("{} {}", self.program.display(), args.join(" "));

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|source| Error::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        log::trace!("pvesh exited with {}", output.status);

        let response = classify(verb, path, &stdout, &stderr);
        log::trace!("{verb} {path} -> {}", response.status);
        Ok(response)
    }
}
