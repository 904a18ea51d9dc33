//! Tidemark CLI - package, sign and apply database migration artifacts

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod context;

use cli::Cli;
use commands::common::ExitCode;
use commands::{apply, build, init, list, rollback, status, verify};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose when set
    let default_filter = if cli.global.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();

    let result = match &cli.command {
        cli::Commands::Init(args) => init::execute(args, &cli.global).await,
        cli::Commands::Build(args) => build::execute(args, &cli.global).await,
        cli::Commands::Apply(args) => apply::execute(args, &cli.global).await,
        cli::Commands::Rollback(args) => rollback::execute(args, &cli.global).await,
        cli::Commands::Status => status::execute(&cli.global).await,
        cli::Commands::Verify(args) => verify::execute(args, &cli.global).await,
        cli::Commands::List => list::execute(&cli.global).await,
    };

    match result {
        Err(err) => match err.downcast_ref::<ExitCode>() {
            Some(ExitCode(code)) => std::process::exit(*code),
            None => Err(err),
        },
        Ok(()) => Ok(()),
    }
}
