//! Reconcile the manifest against the node
//!
//! - `apply` - Make the node match the manifest
//! - `plan` - Preview what apply would change

use anyhow::{Result, bail};
use declarative::ExecutionPlan;
use std::path::PathBuf;
use std::sync::Arc;

use crate::Context;
use crate::config::{self, Manifest};
use crate::engine::{self, RunOptions};
use crate::resource::build_plan;
use crate::ui;

/// Flags shared by `apply` and `plan`
#[derive(Debug, Clone, Default)]
pub struct ApplyFlags {
    pub dry_run: bool,
    pub diff: bool,
    pub yes: bool,
    pub json: bool,
}

/// Manifest named on the command line, or the default location
pub fn manifest_path(ctx: &Context) -> Result<PathBuf> {
    match &ctx.manifest {
        Some(path) => config::expand_path(&path.to_string_lossy()),
        None => config::default_manifest_path(),
    }
}

/// Client for the configured pvesh executable
pub fn client(ctx: &Context, settings: &config::Settings) -> Result<Arc<pvesh::Client>> {
    let program = config::resolve_pvesh(ctx.pvesh.as_deref(), settings)?;
    log::debug!("using {}", program.display());
    Ok(Arc::new(pvesh::Client::with_program(program)))
}

/// Load the manifest and build the plan, narrowed to `target`
fn load_plan(ctx: &Context, target: Option<&str>) -> Result<ExecutionPlan> {
    let path = manifest_path(ctx)?;
    let manifest = Manifest::load(&path)?;
    if manifest.is_empty() {
        log::warn!("{} declares no resources", path.display());
    } else {
        log::info!("loaded {} resources from {}", manifest.len(), path.display());
    }

    let client = client(ctx, &manifest.settings)?;
    let plan = build_plan(&manifest, &client).filter_by_target(target);

    if let Some(target) = target
        && plan.is_empty()
    {
        bail!("No resources match '{target}'");
    }
    Ok(plan)
}

pub fn run(ctx: &Context, target: Option<&str>, flags: &ApplyFlags) -> Result<()> {
    let plan = load_plan(ctx, target)?;
    if plan.is_empty() {
        if !flags.json {
            ui::info("Manifest declares no resources");
        }
        return Ok(());
    }

    let opts = RunOptions {
        dry_run: flags.dry_run,
        diff: flags.diff,
        yes: flags.yes,
        json: flags.json,
        quiet: ctx.quiet,
    };
    let execution = engine::run(&plan, &opts)?;

    let failed = execution.summary.failed;
    if failed > 0 {
        bail!("{} failed", ui::count(failed, "resource"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn ctx(manifest: Option<PathBuf>) -> Context {
        Context {
            verbose: 0,
            quiet: true,
            pvesh: Some(PathBuf::from("/nonexistent/pvesh")),
            manifest,
        }
    }

    #[test]
    fn test_manifest_path_prefers_flag() {
        let path = manifest_path(&ctx(Some(PathBuf::from("/etc/pvesync.toml")))).unwrap();
        assert_eq!(path, PathBuf::from("/etc/pvesync.toml"));

        let default = manifest_path(&ctx(None)).unwrap();
        assert!(default.ends_with(".config/pvesync/manifest.toml"));
    }

    #[test]
    fn test_unknown_target_is_an_error() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(b"[[pools]]\nname = \"dev\"\n").unwrap();

        let err = load_plan(&ctx(Some(file.path().to_path_buf())), Some("storage"))
            .err()
            .expect("unknown target must fail");
        assert!(err.to_string().contains("No resources match 'storage'"));

        let plan = load_plan(&ctx(Some(file.path().to_path_buf())), Some("pool.dev")).unwrap();
        assert_eq!(plan.total_resources(), 1);
    }
}
