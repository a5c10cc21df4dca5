//! `proofline config ...`

use anyhow::{Context, Result};
use clap::Subcommand;

use proofline_core::config::ProjectConfig;
use proofline_core::db;

use crate::{commands, output, Cli};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective project configuration
    Show,
    /// Validate the workspace YAML configuration
    Validate,
}

pub async fn execute(cli: &Cli, cmd: &ConfigCommands) -> Result<()> {
    match cmd {
        ConfigCommands::Show => {
            // Prefer the config stored with the project; fall back to
            // the workspace document for uninitialized workspaces.
            let config = match db::db_path(&cli.workspace).exists() {
                true => {
                    let engine = commands::open_engine(cli).await?;
                    match engine.get_config(&cli.project).await {
                        Ok(config) => config,
                        Err(_) => commands::load_workspace_config(cli)?,
                    }
                }
                false => commands::load_workspace_config(cli)?,
            };
            if cli.json {
                output::print_json(&config)?;
            } else {
                print!("{}", serde_yaml::to_string(&config)?);
            }
        }
        ConfigCommands::Validate => {
            let path = db::config_path(&cli.workspace);
            if !path.exists() {
                output::print_ok(&format!(
                    "no workspace config at {}; built-in defaults apply",
                    path.display()
                ));
                return Ok(());
            }
            let config = ProjectConfig::load_yaml(&path)
                .with_context(|| format!("load {}", path.display()))?;
            config.validate().context("invalid configuration")?;
            output::print_ok(&format!("{} is valid", path.display()));
        }
    }
    Ok(())
}
