//! Rollback command implementation

use anyhow::{Context, Result};

use crate::cli::{GlobalArgs, RollbackArgs};
use crate::commands::common::{print_apply_report, print_json};
use crate::context::RuntimeContext;

/// Execute the rollback command
pub(crate) async fn execute(args: &RollbackArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global).await?;

    let mut options = ctx.apply_options();
    options.dry_run |= args.dry_run;
    options.force |= args.force;

    let report = ctx
        .engine
        .rollback(&args.version, &options)
        .await
        .with_context(|| format!("Failed to roll back {}", args.version))?;

    if ctx.json {
        return print_json(&report);
    }
    print_apply_report(&report);
    Ok(())
}
