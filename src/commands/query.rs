//! Read-only GET of a single API path

use anyhow::{Context as _, Result};
use pvesh::{Client, ResourcePath};

use crate::Context;
use crate::commands::apply::{client, manifest_path};
use crate::config::{Manifest, Settings};
use crate::ui;

/// Manifest settings when a manifest exists, defaults otherwise
fn settings(ctx: &Context) -> Result<Settings> {
    let path = manifest_path(ctx)?;
    if ctx.manifest.is_none() && !path.exists() {
        return Ok(Settings::default());
    }
    Ok(Manifest::load(&path)?.settings)
}

/// GET `raw` and render the result as pretty JSON
pub fn fetch(client: &Client, raw: &str) -> Result<Option<String>> {
    let path = ResourcePath::new(raw)?;
    let data = client
        .get(&path)
        .with_context(|| format!("failed to read {path}"))?;
    data.map(|value| serde_json::to_string_pretty(&value).map_err(Into::into))
        .transpose()
}

pub fn run(ctx: &Context, raw: &str) -> Result<()> {
    let client = client(ctx, &settings(ctx)?)?;
    match fetch(&client, raw)? {
        Some(json) => println!("{json}"),
        None => {
            if !ctx.quiet {
                ui::warn(&format!("'{raw}' does not exist"));
            }
        }
    }
    Ok(())
}
