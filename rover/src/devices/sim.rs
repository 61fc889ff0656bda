//! Simulated device implementations.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, info};

use fleet_protocol::mission::Coordinate;
use fleet_protocol::report::Component;

use super::{Battery, Camera, ChemicalAnalyzer, DeviceError, Devices, Gps, Rechargeable, Thermometer};
use crate::config::Config;

pub struct SimBattery {
    level: Mutex<f64>,
    recharge_per_sec: f64,
}

impl SimBattery {
    pub fn new(level: f64, recharge_per_sec: f64) -> Self {
        Self {
            level: Mutex::new(level.clamp(0.0, 100.0)),
            recharge_per_sec,
        }
    }
}

impl Battery for SimBattery {
    fn level(&self) -> f64 {
        *self.level.lock()
    }

    fn drain(&self, amount_pct: f64) {
        let mut level = self.level.lock();
        *level = (*level - amount_pct).max(0.0);
        debug!(level = *level, drained = amount_pct, "battery drained");
    }
}

#[async_trait]
impl Rechargeable for SimBattery {
    async fn recharge_to(&self, target_pct: f64) -> f64 {
        let target = target_pct.clamp(0.0, 100.0);
        info!(from = self.level(), to = target, "recharging");
        loop {
            {
                let mut level = self.level.lock();
                if *level >= target {
                    return *level;
                }
                *level = (*level + self.recharge_per_sec).min(100.0);
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}

pub struct SimGps {
    position: Mutex<Coordinate>,
}

impl SimGps {
    pub fn new(position: Coordinate) -> Self {
        Self {
            position: Mutex::new(position),
        }
    }
}

impl Gps for SimGps {
    fn position(&self) -> Coordinate {
        *self.position.lock()
    }

    fn set_position(&self, pos: Coordinate) {
        *self.position.lock() = pos;
    }
}

pub struct SimCamera {
    image_bytes: usize,
    fail_chance: f64,
}

impl SimCamera {
    pub fn new(image_bytes: usize, fail_chance: f64) -> Self {
        Self {
            image_bytes,
            fail_chance,
        }
    }
}

impl Camera for SimCamera {
    fn capture(&self) -> Result<Vec<u8>, DeviceError> {
        let mut rng = rand::rng();
        if rng.random_bool(self.fail_chance.clamp(0.0, 1.0)) {
            return Err(DeviceError::CameraLoad);
        }
        Ok((0..self.image_bytes).map(|_| rng.random()).collect())
    }
}

const MINERALS: [&str; 6] = ["SiO2", "Fe2O3", "MgO", "CaSO4", "H2O", "ClO4"];

pub struct SimAnalyzer;

impl ChemicalAnalyzer for SimAnalyzer {
    fn analyze_sample(&self) -> Vec<Component> {
        let mut rng = rand::rng();
        let count = rng.random_range(2..=4);
        let mut remaining = 100.0f32;
        MINERALS
            .iter()
            .take(count)
            .map(|name| {
                let pct = rng.random_range(0.0..remaining);
                remaining -= pct;
                Component {
                    name: (*name).to_owned(),
                    percentage: pct,
                }
            })
            .collect()
    }
}

pub struct SimThermometer;

impl Thermometer for SimThermometer {
    fn temperature(&self) -> f32 {
        rand::rng().random_range(-80.0..-20.0)
    }
}

/// Wire up the full simulated complement from config. The battery handle is
/// shared between the `Battery` view and the `Rechargeable` capability.
pub fn devices_from_config(cfg: &Config) -> Devices {
    let battery = Arc::new(SimBattery::new(100.0, cfg.battery_recharge_per_sec));
    Devices {
        battery: battery.clone(),
        recharge: Some(battery),
        gps: Arc::new(SimGps::new(Coordinate::default())),
        camera: Arc::new(SimCamera::new(cfg.camera_image_bytes, cfg.camera_fail_chance)),
        analyzer: Arc::new(SimAnalyzer),
        thermometer: Arc::new(SimThermometer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn battery_drain_saturates_at_zero() {
        let b = SimBattery::new(5.0, 1.0);
        b.drain(3.0);
        assert_eq!(b.level(), 2.0);
        b.drain(10.0);
        assert_eq!(b.level(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn recharge_stops_at_target() {
        let b = SimBattery::new(10.0, 25.0);
        let level = b.recharge_to(80.0).await;
        assert!(level >= 80.0);
        assert!(b.level() <= 100.0);
    }

    #[test]
    fn camera_failure_chance_bounds() {
        let always = SimCamera::new(16, 1.0);
        assert!(always.capture().is_err());
        let never = SimCamera::new(16, 0.0);
        assert_eq!(never.capture().unwrap().len(), 16);
    }

    #[test]
    fn sample_percentages_stay_under_total() {
        let components = SimAnalyzer.analyze_sample();
        assert!(!components.is_empty());
        let total: f32 = components.iter().map(|c| c.percentage).sum();
        assert!(total <= 100.0);
    }
}
