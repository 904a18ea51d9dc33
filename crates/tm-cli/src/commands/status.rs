//! Status command implementation

use anyhow::{Context, Result};

use crate::cli::GlobalArgs;
use crate::commands::common::print_json;
use crate::context::RuntimeContext;

/// Execute the status command
pub(crate) async fn execute(global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global).await?;
    let report = ctx.engine.status().await.context("Failed to read status")?;

    if ctx.json {
        return print_json(&report);
    }

    println!(
        "Current version: {}",
        report.current.as_deref().unwrap_or("(none)")
    );
    if report.pending.is_empty() {
        println!("Pending: none");
    } else {
        println!("Pending: {}", report.pending.join(", "));
    }

    if report.history.is_empty() {
        println!("\nNo migrations recorded");
        return Ok(());
    }

    println!("\n{:<12} {:<10} {:<26} {:<16} DETAIL", "VERSION", "RESULT", "AT", "BY");
    for record in &report.history {
        let result = match (record.success, record.is_rollback()) {
            (true, true) => "rolled back",
            (true, false) => "applied",
            (false, _) => "failed",
        };
        println!(
            "{:<12} {:<10} {:<26} {:<16} {}",
            record.version,
            result,
            record.applied_at.to_rfc3339(),
            record.applied_by,
            record.error.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
