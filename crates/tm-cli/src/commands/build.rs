//! Build command implementation - packages migrations into a stored artifact

use anyhow::{Context, Result};
use tm_core::{discover_migration_files, BumpKind, CoreResult, ManifestMetadata, Version};
use tm_engine::BuildInfo;

use crate::cli::{BuildArgs, GlobalArgs};
use crate::commands::common::print_json;
use crate::context::RuntimeContext;

/// Execute the build command
pub(crate) async fn execute(args: &BuildArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global).await?;

    let migrations_dir = ctx.config.migrations_path(&ctx.root);
    let files = discover_migration_files(&migrations_dir).with_context(|| {
        format!(
            "Failed to read migrations from {}",
            migrations_dir.display()
        )
    })?;
    if files.is_empty() {
        anyhow::bail!("No .sql files found under {}", migrations_dir.display());
    }
    log::debug!("Discovered {} migration files", files.len());

    let known = ctx.engine.list().await.context("Failed to list stored versions")?;
    let version = match (&args.artifact_version, args.bump) {
        (Some(explicit), _) => Version::parse(explicit).context("Invalid --version")?,
        (None, Some(bump)) => {
            next_version(known.last(), bump.into()).context("Cannot bump version")?
        }
        (None, None) => anyhow::bail!("Either --version or --bump is required"),
    };

    let dependencies = args
        .depends_on
        .iter()
        .map(|v| Version::parse(v.trim()).with_context(|| format!("Invalid --depends-on '{}'", v)))
        .collect::<Result<Vec<_>>>()?;

    let actor = ctx.config.actor();
    let metadata = ManifestMetadata {
        previous_version: known.iter().filter(|v| **v < version).max().cloned(),
        notes: args.notes.clone(),
        author: Some(args.author.clone().unwrap_or_else(|| actor.clone())),
        dependencies,
    };
    let build = BuildInfo {
        builder: actor,
        source_revision: args.source_revision.clone(),
    };

    let report = ctx
        .engine
        .publish(&version.to_string(), &files, metadata, &build)
        .await
        .with_context(|| format!("Failed to publish {}", version))?;

    if ctx.json {
        return print_json(&report);
    }
    println!("Built {} from {} file(s)", report.version, report.files);
    println!("  checksum: {}", report.checksum);
    println!("  signed:   {}", if report.signed { "yes" } else { "no" });
    println!("  stored:   {}", report.location);
    Ok(())
}

/// Bump the highest stored version, or start from 0.0.0
fn next_version(highest: Option<&Version>, bump: BumpKind) -> CoreResult<Version> {
    match highest {
        Some(v) => v.next(bump),
        None => Version::new(0, 0, 0).next(bump),
    }
}

#[cfg(test)]
#[path = "build_test.rs"]
mod tests;
