use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod game;
mod http;
mod hub;
mod persistence;
mod registry;
mod session;

use config::Config;
use persistence::SnapshotStore;
use registry::Registry;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing();

    let store = SnapshotStore::new(&config.data_dir)
        .with_context(|| format!("create snapshot directory {}", config.data_dir.display()))?;
    let registry = Registry::new(store, config.session_tuning());
    let restored = registry
        .restore_all()
        .await
        .context("restore table snapshots")?;
    if restored > 0 {
        info!(restored, "tables restored from disk");
    }

    let app = http::router(http::AppState {
        registry,
        static_dir: config.static_dir.clone(),
    });

    let addr = SocketAddr::new(config.listen_addr, config.listen_port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on http://{addr}/play9");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
