//! Init command implementation - scaffolds a new Tidemark project

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tm_core::config::CONFIG_FILE_NAME;
use tm_engine::{Ed25519Provider, SecurityProvider};

use crate::cli::{GlobalArgs, InitArgs};

/// Seed file written by `init --signing`, relative to the project root
const SIGNING_KEY_FILE: &str = ".tidemark/signing.key";

/// Execute the init command
pub(crate) async fn execute(args: &InitArgs, global: &GlobalArgs) -> Result<()> {
    let project_dir = Path::new(&global.project_dir);
    let config_path = project_dir.join(CONFIG_FILE_NAME);

    if config_path.exists() {
        anyhow::bail!(
            "'{}' already exists. Remove it first or pick another --project-dir.",
            config_path.display()
        );
    }

    let name = match &args.name {
        Some(name) => name.clone(),
        None => default_name(project_dir),
    };
    if name.trim().is_empty() {
        anyhow::bail!("Project name must not be empty");
    }

    let dirs = [
        "",
        "migrations/schema",
        "migrations/custom",
        "migrations/seed",
        "migrations/rollback",
    ];
    for dir in &dirs {
        let path = project_dir.join(dir);
        fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    }

    let signing = if args.signing {
        let provider = Ed25519Provider::generate().context("Failed to generate signing key")?;
        write_signing_key(project_dir, &provider)?;
        Some(provider.public_key())
    } else {
        None
    };

    let safe_name = name.replace('"', "\\\"");
    let mut config_content = format!(
        r#"name: "{safe_name}"
migrations_dir: migrations
artifact_dir: .tidemark/artifacts

database:
  path: tidemark.duckdb

lock:
  key: tidemark_migration_lock
  acquire_timeout_ms: 5000
  lease_secs: 3600

execution:
  parallel: false
  max_parallel: 4
  # timeout_secs: 300
"#
    );
    if let Some(public_key) = &signing {
        config_content.push_str(&format!(
            r#"
signing:
  key_path: {SIGNING_KEY_FILE}
  # Share this key with environments that only verify:
  # public_key: {public_key}
"#
        ));
    }
    fs::write(&config_path, config_content)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    if global.json {
        crate::commands::common::print_json(&serde_json::json!({
            "name": name,
            "config": config_path.display().to_string(),
            "signing_public_key": signing,
        }))?;
        return Ok(());
    }

    println!("Initialized Tidemark project: {}\n", name);
    println!("  Created {}", config_path.display());
    for dir in &dirs[1..] {
        println!("  Created {}/", project_dir.join(dir).display());
    }
    if let Some(public_key) = &signing {
        println!("  Created {}", project_dir.join(SIGNING_KEY_FILE).display());
        println!("\nSigning public key: {}", public_key);
    }
    println!("\nNext: add SQL files under migrations/ and run `tidemark build --version 0.1.0`");
    Ok(())
}

fn default_name(project_dir: &Path) -> String {
    let absolute = project_dir
        .canonicalize()
        .unwrap_or_else(|_| project_dir.to_path_buf());
    absolute
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("tidemark")
        .to_string()
}

fn write_signing_key(project_dir: &Path, provider: &Ed25519Provider) -> Result<()> {
    let seed = provider
        .seed_base58()
        .context("Generated provider has no signing key")?;
    let path = project_dir.join(SIGNING_KEY_FILE);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(&path, seed).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
