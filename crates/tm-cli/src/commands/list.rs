//! List command implementation

use anyhow::{Context, Result};

use crate::cli::GlobalArgs;
use crate::commands::common::print_json;
use crate::context::RuntimeContext;

/// Execute the list command
pub(crate) async fn execute(global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global).await?;
    let versions = ctx.engine.list().await.context("Failed to list stored versions")?;
    let versions: Vec<String> = versions.iter().map(|v| v.to_string()).collect();

    if ctx.json {
        return print_json(&versions);
    }
    if versions.is_empty() {
        println!("No artifacts stored under {}", ctx.config.artifact_path(&ctx.root).display());
        return Ok(());
    }
    for version in &versions {
        println!("{}", version);
    }
    Ok(())
}
