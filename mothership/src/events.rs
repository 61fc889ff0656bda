//! Event sink boundary.
//!
//! Everything noteworthy the coordinator does is published here as a typed
//! name plus a JSON payload. The sole consumer today is a logger task; an
//! external push surface would subscribe at this same boundary.

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::info;

pub const ROVER_CONNECTED: &str = "rover_connected";
pub const MISSION_CREATED: &str = "mission_created";
pub const MISSION_UPDATE: &str = "mission_update";

#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: &'static str,
    pub at: DateTime<Utc>,
    pub payload: Value,
}

static SINK: OnceCell<mpsc::UnboundedSender<Event>> = OnceCell::new();

/// Install the process-wide sink and spawn the consumer task. Later calls are
/// no-ops, matching the one-shot install of the teacher channels.
pub fn init() {
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    if SINK.set(tx).is_err() {
        return;
    }
    tokio::spawn(async move {
        while let Some(ev) = rx.recv().await {
            info!(
                target: "mothership::events",
                event = ev.event_type,
                at = %ev.at.format("%H:%M:%S%.3f"),
                payload = %ev.payload,
            );
        }
    });
}

/// Publish one event. Silently dropped when no sink is installed, so library
/// paths stay usable from tests without runtime setup.
pub fn publish(event_type: &'static str, payload: Value) {
    if let Some(tx) = SINK.get() {
        let _ = tx.send(Event {
            event_type,
            at: Utc::now(),
            payload,
        });
    }
}
