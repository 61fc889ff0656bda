//! Builds report bodies from the onboard devices, one source per mission.
//!
//! Image missions load the full image up front and feed it out chunk by
//! chunk; a load failure aborts the mission before any report is sent.
//! Every other task samples its device (or the environment) at report time.

use std::sync::Arc;

use rand::Rng;

use fleet_protocol::mission::TaskType;
use fleet_protocol::report::{Report, ReportBody};

use crate::devices::{DeviceError, Devices};

pub struct ReportSource {
    devices: Arc<Devices>,
    mission_id: u16,
    task_type: TaskType,
    install_base_chance: f64,
    chunks: Vec<Vec<u8>>,
    next_chunk: usize,
}

impl ReportSource {
    /// Prepare the source for one mission. For image capture this loads and
    /// chunks the media immediately, so a camera failure surfaces before the
    /// rover commits to the mission.
    pub fn new(
        devices: Arc<Devices>,
        mission_id: u16,
        task_type: TaskType,
        chunk_bytes: usize,
        install_base_chance: f64,
    ) -> Result<Self, DeviceError> {
        let chunks = if task_type == TaskType::ImageCapture {
            let image = devices.camera.capture()?;
            image
                .chunks(chunk_bytes.max(1))
                .map(<[u8]>::to_vec)
                .collect()
        } else {
            Vec::new()
        };
        Ok(Self {
            devices,
            mission_id,
            task_type,
            install_base_chance,
            chunks,
            next_chunk: 0,
        })
    }

    /// Image missions are done once every chunk has been sent.
    pub fn exhausted(&self) -> bool {
        self.task_type == TaskType::ImageCapture && self.next_chunk >= self.chunks.len()
    }

    pub fn next_report(&mut self, is_last: bool) -> Report {
        Report {
            mission_id: self.mission_id,
            is_last,
            body: self.build_body(),
        }
    }

    fn build_body(&mut self) -> ReportBody {
        let mut rng = rand::rng();
        match self.task_type {
            TaskType::ImageCapture => {
                // Sending past the end repeats the final chunk.
                let idx = self.next_chunk.min(self.chunks.len().saturating_sub(1));
                let data = self.chunks.get(idx).cloned().unwrap_or_default();
                self.next_chunk = idx + 1;
                ReportBody::Image {
                    chunk_id: idx as u16,
                    data,
                }
            }
            TaskType::SampleCollection => ReportBody::Sample {
                components: self.devices.analyzer.analyze_sample(),
            },
            TaskType::EnvAnalysis => ReportBody::Environment {
                temperature: self.devices.thermometer.temperature(),
                oxygen: rng.random_range(0.0..0.5),
                pressure: rng.random_range(5.0..12.0),
                humidity: rng.random_range(0.0..0.1),
                wind_speed: rng.random_range(0.0..30.0),
                radiation: rng.random_range(0.01..0.3),
            },
            TaskType::RepairRescue => ReportBody::Repair {
                problem_id: rng.random_range(1..=20),
                repairable: rng.random_bool(0.8),
            },
            TaskType::TopoMapping => {
                let pos = self.devices.gps.position();
                ReportBody::Topographic {
                    latitude: pos.latitude as f32,
                    longitude: pos.longitude as f32,
                    height: rng.random_range(-8000.0..21000.0),
                }
            }
            TaskType::Installation => {
                // Success odds scale with remaining charge.
                let chance = self.install_base_chance * self.devices.battery.level() / 100.0;
                ReportBody::Installation {
                    success: rng.random_bool(chance.clamp(0.0, 1.0)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::sim::{SimAnalyzer, SimBattery, SimCamera, SimGps, SimThermometer};
    use fleet_protocol::mission::Coordinate;

    fn devices(battery_level: f64, camera_fail: f64) -> Arc<Devices> {
        let battery = Arc::new(SimBattery::new(battery_level, 1.0));
        Arc::new(Devices {
            battery: battery.clone(),
            recharge: Some(battery),
            gps: Arc::new(SimGps::new(Coordinate {
                latitude: 0.25,
                longitude: -0.5,
            })),
            camera: Arc::new(SimCamera::new(100, camera_fail)),
            analyzer: Arc::new(SimAnalyzer),
            thermometer: Arc::new(SimThermometer),
        })
    }

    #[test]
    fn image_source_chunks_sequentially() {
        let mut src = ReportSource::new(devices(100.0, 0.0), 1, TaskType::ImageCapture, 40, 0.9)
            .unwrap();
        // 100 bytes in 40-byte chunks: 40 + 40 + 20.
        let mut sizes = Vec::new();
        let mut ids = Vec::new();
        while !src.exhausted() {
            let is_last = false;
            match src.next_report(is_last).body {
                ReportBody::Image { chunk_id, data } => {
                    ids.push(chunk_id);
                    sizes.push(data.len());
                }
                other => panic!("unexpected body {other:?}"),
            }
        }
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(sizes, vec![40, 40, 20]);
    }

    #[test]
    fn camera_failure_aborts_source_creation() {
        let err = ReportSource::new(devices(100.0, 1.0), 1, TaskType::ImageCapture, 40, 0.9);
        assert!(matches!(err, Err(DeviceError::CameraLoad)));
    }

    #[test]
    fn non_image_tasks_never_touch_the_camera() {
        // Camera always fails; every other task still builds its source.
        for task in [
            TaskType::SampleCollection,
            TaskType::EnvAnalysis,
            TaskType::RepairRescue,
            TaskType::TopoMapping,
            TaskType::Installation,
        ] {
            let src = ReportSource::new(devices(100.0, 1.0), 1, task, 40, 0.9);
            assert!(src.is_ok(), "{task} should not need the camera");
        }
    }

    #[test]
    fn installation_success_scales_with_battery() {
        // Full battery and certain base chance always succeeds.
        let mut src =
            ReportSource::new(devices(100.0, 0.0), 1, TaskType::Installation, 40, 1.0).unwrap();
        assert_eq!(
            src.next_report(true).body,
            ReportBody::Installation { success: true }
        );
        // Dead battery never succeeds, whatever the base chance.
        let mut src =
            ReportSource::new(devices(0.0, 0.0), 1, TaskType::Installation, 40, 1.0).unwrap();
        assert_eq!(
            src.next_report(true).body,
            ReportBody::Installation { success: false }
        );
    }

    #[test]
    fn topographic_report_uses_current_position() {
        let mut src =
            ReportSource::new(devices(100.0, 0.0), 4, TaskType::TopoMapping, 40, 0.9).unwrap();
        match src.next_report(false).body {
            ReportBody::Topographic {
                latitude,
                longitude,
                ..
            } => {
                assert_eq!(latitude, 0.25);
                assert_eq!(longitude, -0.5);
            }
            other => panic!("unexpected body {other:?}"),
        }
    }
}
