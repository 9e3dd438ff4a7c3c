//! winlaunch CLI binary
//!
//! Launches a program with explicit control over which handles it inherits,
//! pumps its piped streams and exits with its exit code.

#![allow(unused_crate_dependencies)]

use anyhow::Context;
use clap::Parser;
use cli::{dry_run_report, quote, resolve, Cli, CliError, Commands, Resolved};
use tracing::error;
use winlaunch_core::utils::init_tracing;

const DEFAULT_LOG_LEVEL: &str = "warn";

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Quote { args } => {
            init_tracing(cli.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL))?;
            println!("{}", quote(&args));
            Ok(())
        }
        Commands::Run(opts) => {
            let resolved = match resolve(&opts) {
                Ok(resolved) => resolved,
                Err(e) => {
                    init_tracing(cli.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL))?;
                    error!("[{}] {}", e.code(), e);
                    return Err(e).context("failed to resolve launch request");
                }
            };
            let level = cli
                .log_level
                .clone()
                .unwrap_or_else(|| resolved.settings.log_level.clone());
            init_tracing(&level)?;

            if opts.dry_run {
                println!("{}", dry_run_report(&resolved.spec)?);
                return Ok(());
            }

            match launch(resolved) {
                Ok(code) => std::process::exit(code as i32),
                Err(e) => {
                    error!("[{}] {}", e.code(), e);
                    Err(e).context("launch failed")
                }
            }
        }
    }
}

#[cfg(windows)]
fn launch(resolved: Resolved) -> Result<u32, CliError> {
    use cli::{run_child, Pumps};
    use winlaunch_core::WindowsApi;

    let launcher = resolved.settings.launcher(WindowsApi::new());
    run_child(
        &launcher,
        resolved.spec,
        Pumps {
            input: std::io::stdin(),
            output: std::io::stdout(),
            error: std::io::stderr(),
        },
    )
}

#[cfg(not(windows))]
fn launch(resolved: Resolved) -> Result<u32, CliError> {
    Err(CliError::CommandFailed(format!(
        "cannot launch '{}': process launching is only supported on Windows",
        resolved.spec.program().unwrap_or_default()
    )))
}
