//! `proofline iteration ...`

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};

use proofline_core::api::dto::IterationResponse;
use proofline_core::domain::IterationStatus;

use crate::{commands, output, Cli};

#[derive(Subcommand)]
pub enum IterationCommands {
    /// Create an iteration
    Create(CreateArgs),
    /// Drive an iteration along its state machine
    SetStatus(SetStatusArgs),
}

#[derive(Args)]
pub struct CreateArgs {
    #[arg(long)]
    id: String,
    #[arg(long, default_value = "")]
    goal: String,
}

#[derive(Args)]
pub struct SetStatusArgs {
    id: String,
    /// pending | running | delivered | validated | rejected
    status: String,
}

pub async fn execute(cli: &Cli, cmd: &IterationCommands) -> Result<()> {
    let engine = commands::open_engine(cli).await?;
    let actor = cli.actor();

    match cmd {
        IterationCommands::Create(args) => {
            let iteration = engine
                .create_iteration(&actor, &cli.project, &args.id, &args.goal)
                .await?;
            if cli.json {
                output::print_json(&IterationResponse::from(iteration))?;
            } else {
                output::print_ok(&format!("created iteration {}", iteration.id));
            }
        }
        IterationCommands::SetStatus(args) => {
            let status = IterationStatus::parse(&args.status)
                .ok_or_else(|| anyhow!("unknown iteration status {}", args.status))?;
            let iteration = engine
                .set_iteration_status(&actor, &cli.project, &args.id, status)
                .await?;
            if cli.json {
                output::print_json(&IterationResponse::from(iteration))?;
            } else {
                output::print_ok(&format!(
                    "iteration {} is now {}",
                    iteration.id,
                    iteration.status.as_str()
                ));
            }
        }
    }
    Ok(())
}
