use std::path::PathBuf;

use clap::Parser;
use kbase_core::config::AppConfig;
use kbase_server::{build_app, build_state};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kbase-server", about = "Hybrid semantic retrieval engine")]
struct Args {
    /// Configuration file (TOML); KBASE_* env vars override it.
    #[arg(long, default_value = "kbase.toml")]
    config: PathBuf,

    /// Override the configured bind address.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = AppConfig::load_from(&args.config)?;
    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());

    let state = build_state(&config).await?;
    if state.backend.is_degraded() {
        info!("starting with the in-memory fallback backend (degraded)");
    }
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("listening on {bind}");
    axum::serve(listener, app).await?;
    Ok(())
}
