//! Built-in mission generator.
//!
//! Stand-in producer for the out-of-scope operator API: feeds the intake
//! queue a configurable number of randomized missions so the fleet has work
//! to pull. Disabled with `--demo-missions 0`.

use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tracing::{info, warn};

use fleet_protocol::mission::{Coordinate, MissionPayload, TaskType};

use crate::config::Config;

static NEXT_MISSION_ID: AtomicU16 = AtomicU16::new(1);

const TASK_TYPES: [TaskType; 6] = [
    TaskType::ImageCapture,
    TaskType::SampleCollection,
    TaskType::EnvAnalysis,
    TaskType::RepairRescue,
    TaskType::TopoMapping,
    TaskType::Installation,
];

fn random_mission() -> MissionPayload {
    let mut rng = rand::rng();
    MissionPayload {
        mission_id: NEXT_MISSION_ID.fetch_add(1, Ordering::Relaxed),
        coordinate: Coordinate {
            latitude: rng.random_range(-1.0..=1.0),
            longitude: rng.random_range(-1.0..=1.0),
        },
        task_type: TASK_TYPES[rng.random_range(0..TASK_TYPES.len())],
        duration_secs: rng.random_range(10..=40),
        update_freq_secs: rng.random_range(0..=10),
        priority: rng.random_range(1..=3),
    }
}

pub fn spawn(cfg: &Config, queue_tx: mpsc::Sender<MissionPayload>) {
    if cfg.demo_missions == 0 {
        return;
    }
    let count = cfg.demo_missions;
    let interval = Duration::from_millis(cfg.demo_interval_ms);
    tokio::spawn(async move {
        info!(count, "mission generator running");
        for _ in 0..count {
            let mission = random_mission();
            info!(
                mission = mission.mission_id,
                task = %mission.task_type,
                priority = mission.priority,
                "mission queued"
            );
            if let Err(e) = queue_tx.send(mission).await {
                warn!(%e, "intake queue closed, generator stopping");
                return;
            }
            tokio::time::sleep(interval).await;
        }
        info!("mission generator done");
    });
}
