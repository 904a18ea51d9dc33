//! Apply command implementation

use anyhow::{Context, Result};
use std::time::Duration;

use crate::cli::{ApplyArgs, GlobalArgs};
use crate::commands::common::{print_apply_report, print_json};
use crate::context::RuntimeContext;

/// Execute the apply command
pub(crate) async fn execute(args: &ApplyArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global).await?;

    let mut options = ctx.apply_options();
    options.dry_run |= args.dry_run;
    options.force |= args.force;
    if args.parallel && !options.parallel {
        options = options.with_parallel(ctx.config.execution.max_parallel);
    }
    if let Some(secs) = args.timeout_secs {
        options = options.with_timeout(Duration::from_secs(secs));
    }
    if options.force {
        log::warn!("Forcing apply of {}: verification problems will not stop it", args.version);
    }

    let report = ctx
        .engine
        .apply(&args.version, &options)
        .await
        .with_context(|| format!("Failed to apply {}", args.version))?;

    if ctx.json {
        return print_json(&report);
    }
    print_apply_report(&report);
    Ok(())
}
