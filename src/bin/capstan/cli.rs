//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Capstan - capability dependency resolution and scan execution
#[derive(Parser)]
#[command(name = "capstan")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a random scan described by a scan config
    Run(RunArgs),

    /// Resolve a scan config and display the execution graph
    Graph(GraphArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Path to the scan config (TOML)
    pub config: PathBuf,

    /// Override the number of points to sample
    #[arg(long)]
    pub points: Option<usize>,

    /// Override the RNG seed
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args)]
pub struct GraphArgs {
    /// Path to the scan config (TOML)
    pub config: PathBuf,
}
