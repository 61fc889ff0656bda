//! Mission assignment payload carried inside MISSION packets.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::packet::CodecError;

/// Point on the normalized Cartesian plane the rovers operate on.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// Kinds of field work a rover can be assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TaskType {
    ImageCapture = 0,
    SampleCollection = 1,
    EnvAnalysis = 2,
    RepairRescue = 3,
    TopoMapping = 4,
    Installation = 5,
}

impl TryFrom<u8> for TaskType {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, CodecError> {
        match value {
            0 => Ok(TaskType::ImageCapture),
            1 => Ok(TaskType::SampleCollection),
            2 => Ok(TaskType::EnvAnalysis),
            3 => Ok(TaskType::RepairRescue),
            4 => Ok(TaskType::TopoMapping),
            5 => Ok(TaskType::Installation),
            other => Err(CodecError::UnknownTaskType(other)),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskType::ImageCapture => "image_capture",
            TaskType::SampleCollection => "sample_collection",
            TaskType::EnvAnalysis => "env_analysis",
            TaskType::RepairRescue => "repair_rescue",
            TaskType::TopoMapping => "topo_mapping",
            TaskType::Installation => "installation",
        };
        f.write_str(name)
    }
}

/// Fixed payload length: id(2) + lat(8) + lon(8) + task(1) + duration(4) +
/// update frequency(4) + priority(1).
pub const MISSION_PAYLOAD_LEN: usize = 28;

/// Wire form of one mission assignment.
///
/// `priority` is 1 (highest) to 3 (lowest); receivers treat anything else as
/// 3. Durations and frequencies are whole seconds; an `update_freq_secs` of 0
/// disables intermediate reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionPayload {
    pub mission_id: u16,
    pub coordinate: Coordinate,
    pub task_type: TaskType,
    pub duration_secs: u32,
    pub update_freq_secs: u32,
    pub priority: u8,
}

impl MissionPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MISSION_PAYLOAD_LEN);
        buf.extend_from_slice(&self.mission_id.to_be_bytes());
        buf.extend_from_slice(&self.coordinate.latitude.to_be_bytes());
        buf.extend_from_slice(&self.coordinate.longitude.to_be_bytes());
        buf.push(self.task_type as u8);
        buf.extend_from_slice(&self.duration_secs.to_be_bytes());
        buf.extend_from_slice(&self.update_freq_secs.to_be_bytes());
        buf.push(self.priority);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < MISSION_PAYLOAD_LEN {
            return Err(CodecError::Truncated {
                need: MISSION_PAYLOAD_LEN,
                got: buf.len(),
            });
        }
        Ok(Self {
            mission_id: u16::from_be_bytes([buf[0], buf[1]]),
            coordinate: Coordinate {
                latitude: f64::from_be_bytes(buf[2..10].try_into().unwrap()),
                longitude: f64::from_be_bytes(buf[10..18].try_into().unwrap()),
            },
            task_type: TaskType::try_from(buf[18])?,
            duration_secs: u32::from_be_bytes(buf[19..23].try_into().unwrap()),
            update_freq_secs: u32::from_be_bytes(buf[23..27].try_into().unwrap()),
            priority: buf[27],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MissionPayload {
        MissionPayload {
            mission_id: 513,
            coordinate: Coordinate {
                latitude: 0.728431,
                longitude: -0.412097,
            },
            task_type: TaskType::TopoMapping,
            duration_secs: 30,
            update_freq_secs: 5,
            priority: 2,
        }
    }

    #[test]
    fn roundtrip_is_bit_exact() {
        let m = sample();
        let back = MissionPayload::decode(&m.encode()).unwrap();
        assert_eq!(back, m);
        assert_eq!(
            back.coordinate.latitude.to_bits(),
            m.coordinate.latitude.to_bits()
        );
        assert_eq!(
            back.coordinate.longitude.to_bits(),
            m.coordinate.longitude.to_bits()
        );
    }

    #[test]
    fn encoded_length_is_fixed() {
        assert_eq!(sample().encode().len(), MISSION_PAYLOAD_LEN);
    }

    #[test]
    fn short_payload_is_rejected() {
        let mut bytes = sample().encode();
        bytes.truncate(MISSION_PAYLOAD_LEN - 1);
        assert!(matches!(
            MissionPayload::decode(&bytes),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn unknown_task_type_is_rejected() {
        let mut bytes = sample().encode();
        bytes[18] = 200;
        assert_eq!(
            MissionPayload::decode(&bytes),
            Err(CodecError::UnknownTaskType(200))
        );
    }

    #[test]
    fn negative_coordinates_survive() {
        let mut m = sample();
        m.coordinate = Coordinate {
            latitude: -1.0,
            longitude: f64::MIN_POSITIVE,
        };
        assert_eq!(MissionPayload::decode(&m.encode()).unwrap(), m);
    }
}
