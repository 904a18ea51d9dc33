//! Verify command implementation

use anyhow::{Context, Result};

use crate::cli::{GlobalArgs, VerifyArgs};
use crate::commands::common::{print_json, print_verification, ExitCode};
use crate::context::RuntimeContext;

/// Execute the verify command; exits 1 when the artifact has problems
pub(crate) async fn execute(args: &VerifyArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global).await?;
    let report = ctx
        .engine
        .verify(&args.version)
        .await
        .with_context(|| format!("Failed to verify {}", args.version))?;

    if ctx.json {
        print_json(&report)?;
    } else {
        println!("Verified {}", report.version);
        if let Some(checksum) = &report.checksum {
            println!("  checksum: {}", checksum);
        }
        print_verification(&report);
    }

    if !report.is_ok() {
        return Err(ExitCode(1).into());
    }
    Ok(())
}
