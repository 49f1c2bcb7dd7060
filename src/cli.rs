//! Command-line interface for the tessera driver.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Intrinsic matching and profiling passes over lowered pipelines", long_about = None)]
pub struct Cli {
    /// Log pass decisions (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the demo pipelines
    List,
    /// Print a demo pipeline after each enabled pass
    Show(ShowArgs),
}

#[derive(Args)]
pub struct ShowArgs {
    /// Name of the demo pipeline
    pub demo: String,

    /// Skip intrinsic raising
    #[arg(long)]
    pub no_raise: bool,

    /// Lower intrinsics the target does not implement natively
    #[arg(long)]
    pub lower: bool,

    /// Inject profiling instrumentation
    #[arg(long)]
    pub profile: bool,

    /// Target triple to compile for (defaults to the host)
    #[arg(long, value_name = "TRIPLE", conflicts_with = "config")]
    pub target: Option<String>,

    /// JSON target configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Execute the final pipeline on the simulated profiler runtime
    #[arg(long)]
    pub run: bool,

    /// Image width for --run (defaults to the demo's size)
    #[arg(long, requires = "run")]
    pub width: Option<i64>,

    /// Image height for --run (defaults to the demo's size)
    #[arg(long, requires = "run")]
    pub height: Option<i64>,
}
