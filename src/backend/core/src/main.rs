//! Proofline server binary.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use proofline_core::api::{self, AppState};
use proofline_core::config::ProjectConfig;
use proofline_core::db::{self, Store};
use proofline_core::engine::Engine;
use proofline_core::telemetry::{self, LogFormat};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let workspace = PathBuf::from(env_or("PROOFLINE_WORKSPACE", "."));
    let host = env_or("PROOFLINE_HOST", "127.0.0.1");
    let port: u16 = env_or("PROOFLINE_PORT", "7171").parse()?;
    let base_path = env_or("PROOFLINE_BASE_PATH", "/v0");
    let log_level = env_or("PROOFLINE_LOG", "info");
    let log_format = LogFormat::parse(&env_or("PROOFLINE_LOG_FORMAT", "pretty"));

    telemetry::init(&log_level, log_format);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        workspace = %workspace.display(),
        "starting proofline server"
    );

    let config_path = db::config_path(&workspace);
    let default_config = if config_path.exists() {
        let cfg = ProjectConfig::load_yaml(&config_path)
            .map_err(|e| anyhow::anyhow!("workspace config: {e}"))?;
        tracing::info!(path = %config_path.display(), "loaded workspace config");
        cfg
    } else {
        ProjectConfig::default_for("proofline")
    };

    let store = Store::open(&workspace)
        .await
        .map_err(|e| anyhow::anyhow!("open store: {e}"))?;
    tracing::info!(path = %db::db_path(&workspace).display(), "store open, migrations applied");

    let engine = Arc::new(Engine::new(store.clone(), default_config));
    let app = api::build_app(AppState { engine }, &base_path);

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    tracing::info!(address = %addr, base_path = %base_path, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close().await;
    tracing::info!("server shutdown complete");
    Ok(())
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Wait for SIGINT/SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
