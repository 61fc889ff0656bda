//! Movement simulation on the normalized plane.
//!
//! One step per second at the configured maximum speed, snapping to the
//! target when a full step would overshoot. Battery drain is proportional to
//! the distance actually covered.

use std::time::Duration;

use tracing::{debug, info};

use fleet_protocol::mission::Coordinate;

use crate::devices::{Battery, Gps};

#[derive(Debug, Clone, Copy)]
pub struct MotionTuning {
    /// Plane units covered per step.
    pub max_speed: f64,
    /// Battery percent per plane unit.
    pub drain_per_unit: f64,
    /// Distance at which the rover counts as arrived.
    pub arrival_threshold: f64,
}

fn distance(a: Coordinate, b: Coordinate) -> f64 {
    (b.latitude - a.latitude).hypot(b.longitude - a.longitude)
}

/// Drive to `target`, one timed step at a time. Returns the number of steps
/// taken.
pub async fn move_to(
    gps: &dyn Gps,
    battery: &dyn Battery,
    target: Coordinate,
    tuning: &MotionTuning,
) -> u32 {
    let mut steps = 0;
    info!(from = %gps.position(), to = %target, "moving out");
    loop {
        let pos = gps.position();
        let dist = distance(pos, target);
        if dist <= tuning.arrival_threshold {
            break;
        }

        let step_len = tuning.max_speed.min(dist);
        let next = if step_len >= dist {
            target
        } else {
            Coordinate {
                latitude: pos.latitude + (target.latitude - pos.latitude) / dist * step_len,
                longitude: pos.longitude + (target.longitude - pos.longitude) / dist * step_len,
            }
        };
        gps.set_position(next);
        battery.drain(step_len * tuning.drain_per_unit);
        steps += 1;
        debug!(pos = %next, remaining = dist - step_len, "movement step");
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    info!(steps, at = %gps.position(), "arrived");
    steps
}
