//! icbd-ng - ICB chat daemon
//!
//! A session/group chat server speaking the ICB binary packet protocol,
//! built on tokio.

mod config;
mod db;
mod error;
mod handlers;
mod network;
mod state;
mod timers;

use crate::config::Config;
use crate::db::NickDb;
use crate::handlers::Registry;
use crate::network::Gateway;
use crate::state::Switchboard;
use icb_proto::Packet;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let (config_path, working_dir) = parse_args()?;

    if let Some(dir) = working_dir {
        std::env::set_current_dir(&dir)
            .map_err(|e| anyhow::anyhow!("cannot enter working dir {dir}: {e}"))?;
    }

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(
        server = %config.server.name,
        listen = %config.listen.address,
        "Starting icbd-ng"
    );

    // Open the nickname database; without one configured, accounts and
    // mailboxes live in memory and vanish on restart.
    let db = match config.database.as_ref() {
        Some(db_config) => NickDb::open(&db_config.path).await?,
        None => {
            warn!("No database configured; accounts will not persist");
            NickDb::open_in_memory().await?
        }
    };

    let board = Arc::new(Switchboard::new(config, db));
    let registry = Arc::new(Registry::new());

    // Single periodic loop for ping/idle/moderator timers.
    timers::spawn_sweeper(Arc::clone(&board));
    info!("Timer sweep started");

    let gateway = Gateway::bind(board.config.listen.address, Arc::clone(&board), registry).await?;

    tokio::select! {
        result = gateway.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            let core = board.core.lock().await;
            core.broker.broadcast(Packet::status("Shutdown", "Server going down."));
            core.broker.broadcast(Packet::exit());
            Ok(())
        }
    }
}

/// `--config <path>` and `--working-dir <path>`, with a bare path accepted
/// as the config for convenience.
fn parse_args() -> anyhow::Result<(String, Option<String>)> {
    let mut config_path = "config.toml".to_string();
    let mut working_dir = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                config_path = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--config requires a path"))?;
            }
            "--working-dir" => {
                working_dir = Some(
                    args.next()
                        .ok_or_else(|| anyhow::anyhow!("--working-dir requires a path"))?,
                );
            }
            other if !other.starts_with('-') => {
                config_path = other.to_string();
            }
            other => {
                anyhow::bail!("unknown argument: {other}");
            }
        }
    }

    Ok((config_path, working_dir))
}
