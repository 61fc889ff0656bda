//! Onboard device interfaces.
//!
//! The execution loop only ever talks to these traits, so hardware can be
//! swapped for the simulations in [`sim`] (or test doubles) without touching
//! mission logic. Recharging is a separate capability trait: a rover whose
//! battery cannot recharge simply carries no [`Rechargeable`] handle, and no
//! code ever needs to downcast to find out.

pub mod sim;

use async_trait::async_trait;
use thiserror::Error;

use fleet_protocol::mission::Coordinate;
use fleet_protocol::report::Component;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("camera failed to load image")]
    CameraLoad,
}

pub trait Battery: Send + Sync {
    /// Charge level in percent, 0 to 100.
    fn level(&self) -> f64;
    fn drain(&self, amount_pct: f64);
}

/// Capability of batteries that can be recharged in place.
#[async_trait]
pub trait Rechargeable: Send + Sync {
    /// Charge until the level reaches `target_pct`. Returns the final level.
    async fn recharge_to(&self, target_pct: f64) -> f64;
}

pub trait Gps: Send + Sync {
    fn position(&self) -> Coordinate;
    fn set_position(&self, pos: Coordinate);
}

pub trait Camera: Send + Sync {
    /// Load one full image from the sensor.
    fn capture(&self) -> Result<Vec<u8>, DeviceError>;
}

pub trait ChemicalAnalyzer: Send + Sync {
    fn analyze_sample(&self) -> Vec<Component>;
}

pub trait Thermometer: Send + Sync {
    fn temperature(&self) -> f32;
}

/// The full device complement the execution loop works against.
pub struct Devices {
    pub battery: std::sync::Arc<dyn Battery>,
    /// Present only when the battery hardware supports recharging.
    pub recharge: Option<std::sync::Arc<dyn Rechargeable>>,
    pub gps: std::sync::Arc<dyn Gps>,
    pub camera: std::sync::Arc<dyn Camera>,
    pub analyzer: std::sync::Arc<dyn ChemicalAnalyzer>,
    pub thermometer: std::sync::Arc<dyn Thermometer>,
}
