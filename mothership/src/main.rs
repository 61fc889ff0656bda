// src/main.rs
mod config;
mod demo;
mod dispatch;
mod events;
mod missions;
mod receiver;

use anyhow::Result;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dispatch::{Dispatcher, Registry};
use missions::MissionTable;

#[tokio::main]
async fn main() -> Result<()> {
    // -------- logging ----------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("mothership=info".parse()?)
                .add_directive("fleet_protocol=info".parse()?)
                .add_directive("tokio=warn".parse()?),
        )
        .compact()
        .init();

    // -------- config ----------
    let cfg = config::Cli::parse_and_build_config()?;
    info!(?cfg, "Mothership starting");

    // -------- socket ----------
    // tokio::net::UdpSocket has no try_clone(); share via Arc
    let socket = Arc::new(UdpSocket::bind(&cfg.bind_addr).await?);
    info!(addr = %socket.local_addr()?, "listening");

    // -------- event sink ----------
    events::init();

    // -------- shared state ----------
    let registry = Arc::new(Registry::new());
    let table = Arc::new(MissionTable::new());
    let (queue_tx, queue_rx) = mpsc::channel(cfg.queue_capacity);
    let dispatcher = Arc::new(Dispatcher::new(
        socket.clone(),
        registry,
        table,
        queue_tx.clone(),
        queue_rx,
        cfg.retry_policy(),
    ));

    // -------- background services ----------
    demo::spawn(&cfg, queue_tx);

    // -------- listener ----------
    let listener = {
        let socket = socket.clone();
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            if let Err(e) = receiver::run(socket, dispatcher).await {
                warn!(%e, "listener stopped");
            }
        })
    };

    info!("Mothership running. Press Ctrl+C to stop");

    // -------- graceful shutdown ----------
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(?e, "failed to install Ctrl+C handler");
    }
    listener.abort();
    info!("shutdown signal received; exiting.");
    Ok(())
}
