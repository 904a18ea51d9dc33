//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand, ValueEnum};
use tm_core::BumpKind;

/// Tidemark - checksummed, signed database migration artifacts
#[derive(Parser, Debug)]
#[command(name = "tidemark")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Path to project directory
    #[arg(short = 'p', long, global = true, default_value = ".")]
    pub project_dir: String,

    /// Override config file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scaffold tidemark.yml and the migrations directory
    Init(InitArgs),

    /// Package the migrations directory into a versioned artifact
    Build(BuildArgs),

    /// Apply a stored version to the database
    Apply(ApplyArgs),

    /// Roll back an applied version using its rollback files
    Rollback(RollbackArgs),

    /// Show the current version, pending versions and ledger history
    Status,

    /// Verify a stored artifact's checksums and signature
    Verify(VerifyArgs),

    /// List stored versions
    List,
}

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Project name (defaults to the project directory name)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Generate an Ed25519 signing key and enable signing
    #[arg(long)]
    pub signing: bool,
}

/// Version bump kinds accepted on the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BumpArg {
    Patch,
    Minor,
    Major,
}

impl From<BumpArg> for BumpKind {
    fn from(arg: BumpArg) -> Self {
        match arg {
            BumpArg::Patch => BumpKind::Patch,
            BumpArg::Minor => BumpKind::Minor,
            BumpArg::Major => BumpKind::Major,
        }
    }
}

/// Arguments for the build command
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Explicit version for the artifact
    #[arg(long = "version", conflicts_with = "bump", required_unless_present = "bump")]
    pub artifact_version: Option<String>,

    /// Derive the version by bumping the highest stored version
    #[arg(short, long, value_enum)]
    pub bump: Option<BumpArg>,

    /// Release notes
    #[arg(long, default_value = "")]
    pub notes: String,

    /// Author recorded in the manifest (defaults to the configured actor)
    #[arg(long)]
    pub author: Option<String>,

    /// Versions that must be applied first (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub depends_on: Vec<String>,

    /// Source control revision recorded in the provenance
    #[arg(long)]
    pub source_revision: Option<String>,
}

/// Arguments for the apply command
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Version to apply
    pub version: String,

    /// Verify and plan without touching the database
    #[arg(long)]
    pub dry_run: bool,

    /// Proceed past verification problems and out-of-order checks
    #[arg(long)]
    pub force: bool,

    /// Run units of the same category concurrently
    #[arg(long)]
    pub parallel: bool,

    /// Bound on the executing phase in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

/// Arguments for the rollback command
#[derive(Args, Debug)]
pub struct RollbackArgs {
    /// Version to roll back
    pub version: String,

    /// Verify and plan without touching the database
    #[arg(long)]
    pub dry_run: bool,

    /// Proceed past verification problems and roll back a non-current version
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the verify command
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Version to verify
    pub version: String,
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
