//! Proofline CLI.
//!
//! A thin wrapper over the engine: commands open the workspace database
//! directly, and `serve` runs the HTTP server. Exit code 0 on success;
//! errors print to stderr and exit non-zero.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{attest, config, init, iteration, log, serve, task};

/// Proofline - policy-gated project workflow
#[derive(Parser)]
#[command(
    name = "proofline",
    version,
    about = "Proofline - tasks, iterations, attestations and leases over an embedded store",
    propagate_version = true
)]
pub struct Cli {
    /// Workspace directory holding .proofline/
    #[arg(long, global = true, default_value = ".")]
    pub workspace: PathBuf,

    /// Project id
    #[arg(long, global = true, env = "PROOFLINE_PROJECT", default_value = "proofline")]
    pub project: String,

    /// Acting identity sent with every mutation
    #[arg(long, global = true, env = "PROOFLINE_ACTOR")]
    pub actor: Option<String>,

    /// Machine-readable output on listing commands
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn actor(&self) -> String {
        self.actor
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "tester".to_string())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the workspace and project
    Init(init::InitArgs),

    /// Task operations
    #[command(subcommand)]
    Task(task::TaskCommands),

    /// Iteration operations
    #[command(subcommand)]
    Iteration(iteration::IterationCommands),

    /// Attestation operations
    #[command(subcommand)]
    Attest(attest::AttestCommands),

    /// Event journal operations
    #[command(subcommand)]
    Log(log::LogCommands),

    /// Configuration operations
    #[command(subcommand)]
    Config(config::ConfigCommands),

    /// Run the HTTP server
    Serve(serve::ServeArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Init(args) => init::execute(&cli, args).await,
        Commands::Task(cmd) => task::execute(&cli, cmd).await,
        Commands::Iteration(cmd) => iteration::execute(&cli, cmd).await,
        Commands::Attest(cmd) => attest::execute(&cli, cmd).await,
        Commands::Log(cmd) => log::execute(&cli, cmd).await,
        Commands::Config(cmd) => config::execute(&cli, cmd).await,
        Commands::Serve(args) => serve::execute(&cli, args).await,
    };

    if let Err(err) = result {
        output::print_error(&format!("{err:#}"));
        std::process::exit(1);
    }
    Ok(())
}
