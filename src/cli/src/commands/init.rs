//! `proofline init`

use anyhow::Result;
use clap::Args;

use crate::{commands, output, Cli};

#[derive(Args)]
pub struct InitArgs {
    /// Project description
    #[arg(long, default_value = "")]
    description: String,
}

pub async fn execute(cli: &Cli, args: &InitArgs) -> Result<()> {
    let engine = commands::open_engine(cli).await?;
    let config = commands::load_workspace_config(cli)?;
    let project = engine
        .init_project(&cli.actor(), &cli.project, &args.description, Some(config))
        .await?;
    output::print_ok(&format!(
        "initialized project {} (kind {}) in {}",
        project.id,
        project.kind,
        cli.workspace.display()
    ));
    Ok(())
}
