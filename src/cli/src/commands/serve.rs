//! `proofline serve`

use anyhow::{Context, Result};
use clap::Args;
use std::net::SocketAddr;
use std::sync::Arc;

use proofline_core::api::{self, AppState};
use proofline_core::db::Store;
use proofline_core::engine::Engine;
use proofline_core::telemetry::{self, LogFormat};

use crate::{commands, Cli};

#[derive(Args)]
pub struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    #[arg(long, default_value = "7171")]
    port: u16,
    #[arg(long = "base-path", default_value = "/v0")]
    base_path: String,
    #[arg(long, default_value = "info")]
    log: String,
    /// pretty | json
    #[arg(long = "log-format", default_value = "pretty")]
    log_format: String,
}

pub async fn execute(cli: &Cli, args: &ServeArgs) -> Result<()> {
    telemetry::init(&args.log, LogFormat::parse(&args.log_format));

    let default_config = commands::load_workspace_config(cli)?;
    let store = Store::open(&cli.workspace)
        .await
        .with_context(|| format!("open workspace {}", cli.workspace.display()))?;
    let engine = Arc::new(Engine::new(store, default_config));
    let app = api::build_app(AppState { engine }, &args.base_path);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .context("invalid host/port")?;
    crate::output::print_ok(&format!("listening on {addr}{}", args.base_path));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
