//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt;
use tm_engine::{ApplyReport, VerificationReport};

/// Error type representing a non-zero process exit code.
///
/// Use `return Err(ExitCode(N).into())` instead of `std::process::exit(N)`
/// so that RAII destructors run and cleanup happens properly.
#[derive(Debug)]
pub(crate) struct ExitCode(pub(crate) i32);

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Control flow only; main exits with the code and prints nothing.
        write!(f, "")
    }
}

impl std::error::Error for ExitCode {}

/// Print a value as pretty JSON on stdout
pub(crate) fn print_json<T: Serialize + ?Sized>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

/// Print verification problems, one per line
pub(crate) fn print_verification(report: &VerificationReport) {
    if report.is_ok() {
        let signature = if report.signature_checked {
            "signature ok"
        } else {
            "unsigned"
        };
        println!("  verification: ok ({})", signature);
        return;
    }
    println!("  verification: {} problem(s)", report.errors.len());
    for error in &report.errors {
        println!("    - {}", error);
    }
}

/// Human-readable summary of an apply or rollback
pub(crate) fn print_apply_report(report: &ApplyReport) {
    let verb = if report.dry_run { "Planned" } else { "Finished" };
    println!(
        "{} {} of {} ({})",
        verb, report.operation, report.version, report.state
    );
    print_verification(&report.verification);

    for (stage, units) in report.planned.iter().enumerate() {
        for unit in units {
            println!(
                "  [{}] {:<8} {}",
                stage + 1,
                unit.category.to_string(),
                unit.path
            );
        }
    }

    if report.dry_run {
        println!("\n{} unit(s) planned, nothing executed", report.planned_units().count());
    } else {
        println!(
            "\n{} unit(s) executed in {:.2}s",
            report.executed, report.duration_secs
        );
    }
}
