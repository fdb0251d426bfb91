#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use mailin::{
    config::Config,
    handler::LogHandler,
    internal,
    server::{Server, Signal},
};
use tokio::{net::TcpListener, sync::broadcast};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mailin::log::init();

    let config_path = find_config_file()?;
    let config = Config::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.listen))?;

    let (sender, receiver) = broadcast::channel(16);
    let server = Server::new(config.session, Arc::new(LogHandler));

    tokio::select! {
        result = server.serve(listener, receiver) => result?,
        result = shutdown(sender) => result?,
    }

    internal!(level = INFO, "Shut down");
    Ok(())
}

/// Wait for CTRL+C and broadcast a shutdown. A second CTRL+C stops waiting
/// for open sessions.
async fn shutdown(sender: broadcast::Sender<Signal>) -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    internal!(level = INFO, "CTRL+C entered -- Enter it again to force shutdown");

    sender
        .send(Signal::Shutdown)
        .context("Unable to broadcast shutdown")?;

    tokio::signal::ctrl_c().await?;
    Ok(())
}

/// Find the configuration file using the following precedence:
/// 1. `MAILIN_CONFIG` environment variable
/// 2. ./mailin.toml (current working directory)
/// 3. /etc/mailin/mailin.toml (system-wide config)
fn find_config_file() -> anyhow::Result<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILIN_CONFIG") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "MAILIN_CONFIG points to non-existent file: {}",
            path.display()
        );
    }

    let default_paths = vec![
        PathBuf::from("./mailin.toml"),
        PathBuf::from("/etc/mailin/mailin.toml"),
    ];

    for path in &default_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - MAILIN_CONFIG environment variable\n{paths_tried}"
    )
}
