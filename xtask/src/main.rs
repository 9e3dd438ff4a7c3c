//! xtask automation tool for winlaunch
//!
//! This tool provides development automation tasks like schema generation.

mod gen_schemas;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Development automation tool for winlaunch")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate JSON schemas for launch specs and profile files
    GenSchemas {
        /// Output directory (defaults to `schemas/` in the workspace root)
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::GenSchemas { out_dir } => gen_schemas::run(out_dir),
    }
}
