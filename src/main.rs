use anyhow::{Context, Result};
use clap::Parser;
use policyvault::{JsonFileHistoryStore, PolicyStore, RegistryConfig, web};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "policyvault")]
#[command(about = "Serve a versioned security policy over HTTP")]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:3000")]
    bind: SocketAddr,

    /// Initial policy document
    #[arg(long, default_value = "./policy.json")]
    policy_file: PathBuf,

    /// Durable version history
    #[arg(long, default_value = "db/policies-history.json")]
    history_file: PathBuf,

    /// Number of versions kept for rollback
    #[arg(long, default_value_t = 10)]
    max_history: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = RegistryConfig::new().max_history_size(cli.max_history);
    let history = Arc::new(JsonFileHistoryStore::new(&cli.history_file));
    let store = PolicyStore::load_from_file(&cli.policy_file, config, history)
        .await
        .context("failed to initialize policy store")?;

    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("failed to bind {}", cli.bind))?;
    info!(addr = %cli.bind, "policy server listening");

    axum::serve(listener, web::router(Arc::new(store)))
        .await
        .context("server terminated")?;
    Ok(())
}
