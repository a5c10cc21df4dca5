//! CLI subcommands.

pub mod attest;
pub mod config;
pub mod init;
pub mod iteration;
pub mod log;
pub mod serve;
pub mod task;

use anyhow::{Context, Result};
use std::sync::Arc;

use proofline_core::config::ProjectConfig;
use proofline_core::db::{self, Store};
use proofline_core::engine::Engine;

use crate::Cli;

/// Open the workspace store and build an engine around it.
pub async fn open_engine(cli: &Cli) -> Result<Arc<Engine>> {
    let default_config = load_workspace_config(cli)?;
    let store = Store::open(&cli.workspace)
        .await
        .with_context(|| format!("open workspace {}", cli.workspace.display()))?;
    Ok(Arc::new(Engine::new(store, default_config)))
}

/// The workspace YAML config when present, else built-in defaults for
/// the selected project.
pub fn load_workspace_config(cli: &Cli) -> Result<ProjectConfig> {
    let path = db::config_path(&cli.workspace);
    if path.exists() {
        let config = ProjectConfig::load_yaml(&path)
            .with_context(|| format!("load {}", path.display()))?;
        Ok(config)
    } else {
        Ok(ProjectConfig::default_for(&cli.project))
    }
}
