// src/main.rs
mod config;
mod devices;
mod exec;
mod link;
mod motion;
mod queue;
mod reports;

use anyhow::Result;
use std::sync::Arc;
use tokio::net::{lookup_host, UdpSocket};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use link::Link;
use queue::MissionQueue;

#[tokio::main]
async fn main() -> Result<()> {
    // -------- logging ----------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("rover=info".parse()?)
                .add_directive("fleet_protocol=info".parse()?)
                .add_directive("tokio=warn".parse()?),
        )
        .compact()
        .init();

    // -------- config ----------
    let cfg = config::Cli::parse_and_build_config()?;
    info!(?cfg, "Rover starting");

    // -------- link ----------
    let socket = Arc::new(UdpSocket::bind(&cfg.bind_addr).await?);
    let mothership = lookup_host(&cfg.mothership_addr)
        .await?
        .next()
        .ok_or_else(|| anyhow::anyhow!("cannot resolve {}", cfg.mothership_addr))?;
    info!(local = %socket.local_addr()?, %mothership, "link up");

    let queue = Arc::new(MissionQueue::new());
    let link = Link::new(
        socket,
        mothership,
        cfg.rover_id,
        queue.clone(),
        cfg.retry_policy(),
    );
    link.spawn_receiver();

    // -------- devices + background services ----------
    let devices = Arc::new(devices::sim::devices_from_config(&cfg));
    let executor = exec::Executor::new(cfg.clone(), link, queue, devices.clone());
    exec::spawn_battery_monitor(
        &cfg,
        &devices,
        executor.executing_flag(),
        executor.suspended_flag(),
    );

    // -------- mission loop ----------
    tokio::select! {
        _ = executor.run() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(?e, "failed to install Ctrl+C handler");
            }
            info!("shutdown signal received; exiting.");
        }
    }
    Ok(())
}
