//! Rover → mothership report payloads carried inside REPORT packets.
//!
//! Every report starts with the generic header
//! `taskType:u8, missionId:u16, isLast:u8` ([`REPORT_HEADER_LEN`] bytes)
//! followed by a task-specific body. Payloads shorter than the header are
//! rejected before any state change.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::mission::TaskType;
use crate::packet::CodecError;

/// Generic header length: task type(1) + mission id(2) + is-last flag(1).
pub const REPORT_HEADER_LEN: usize = 4;

const ENV_BODY_LEN: usize = 24;
const REPAIR_BODY_LEN: usize = 2;
const TOPO_BODY_LEN: usize = 12;
const INSTALL_BODY_LEN: usize = 1;
const IMAGE_BODY_MIN: usize = 2;

/// One chemical component of a collected sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub percentage: f32,
}

/// Task-specific report body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportBody {
    Image { chunk_id: u16, data: Vec<u8> },
    Sample { components: Vec<Component> },
    Environment {
        temperature: f32,
        oxygen: f32,
        pressure: f32,
        humidity: f32,
        wind_speed: f32,
        radiation: f32,
    },
    Repair { problem_id: u8, repairable: bool },
    Topographic {
        latitude: f32,
        longitude: f32,
        height: f32,
    },
    Installation { success: bool },
}

impl ReportBody {
    pub fn task_type(&self) -> TaskType {
        match self {
            ReportBody::Image { .. } => TaskType::ImageCapture,
            ReportBody::Sample { .. } => TaskType::SampleCollection,
            ReportBody::Environment { .. } => TaskType::EnvAnalysis,
            ReportBody::Repair { .. } => TaskType::RepairRescue,
            ReportBody::Topographic { .. } => TaskType::TopoMapping,
            ReportBody::Installation { .. } => TaskType::Installation,
        }
    }
}

/// A decoded rover report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub mission_id: u16,
    pub is_last: bool,
    pub body: ReportBody,
}

impl Report {
    pub fn task_type(&self) -> TaskType {
        self.body.task_type()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(REPORT_HEADER_LEN + 8);
        buf.push(self.task_type() as u8);
        buf.extend_from_slice(&self.mission_id.to_be_bytes());
        buf.push(u8::from(self.is_last));

        match &self.body {
            ReportBody::Image { chunk_id, data } => {
                buf.extend_from_slice(&chunk_id.to_be_bytes());
                buf.extend_from_slice(data);
            }
            ReportBody::Sample { components } => {
                buf.push(components.len() as u8);
                for c in components {
                    buf.push(c.name.len() as u8);
                    buf.extend_from_slice(c.name.as_bytes());
                    buf.extend_from_slice(&c.percentage.to_be_bytes());
                }
            }
            ReportBody::Environment {
                temperature,
                oxygen,
                pressure,
                humidity,
                wind_speed,
                radiation,
            } => {
                for v in [temperature, oxygen, pressure, humidity, wind_speed, radiation] {
                    buf.extend_from_slice(&v.to_be_bytes());
                }
            }
            ReportBody::Repair {
                problem_id,
                repairable,
            } => {
                buf.push(*problem_id);
                buf.push(u8::from(*repairable));
            }
            ReportBody::Topographic {
                latitude,
                longitude,
                height,
            } => {
                buf.extend_from_slice(&latitude.to_be_bytes());
                buf.extend_from_slice(&longitude.to_be_bytes());
                buf.extend_from_slice(&height.to_be_bytes());
            }
            ReportBody::Installation { success } => buf.push(u8::from(*success)),
        }
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < REPORT_HEADER_LEN {
            return Err(CodecError::Truncated {
                need: REPORT_HEADER_LEN,
                got: buf.len(),
            });
        }
        let task_type = TaskType::try_from(buf[0])?;
        let mission_id = u16::from_be_bytes([buf[1], buf[2]]);
        let is_last = buf[3] == 1;
        let body = decode_body(task_type, &buf[REPORT_HEADER_LEN..])?;
        Ok(Self {
            mission_id,
            is_last,
            body,
        })
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            ReportBody::Image { chunk_id, data } => write!(
                f,
                "[image] mission {} chunk {} ({} bytes)",
                self.mission_id,
                chunk_id,
                data.len()
            ),
            ReportBody::Sample { components } => {
                write!(f, "[sample] mission {} - {} components", self.mission_id, components.len())
            }
            ReportBody::Environment {
                temperature,
                oxygen,
                ..
            } => write!(
                f,
                "[environment] mission {} - T={temperature:.2}C O2={oxygen:.2}%",
                self.mission_id
            ),
            ReportBody::Repair {
                problem_id,
                repairable,
            } => write!(
                f,
                "[repair] mission {} - problem {problem_id} ({})",
                self.mission_id,
                if *repairable { "repaired" } else { "not repairable" }
            ),
            ReportBody::Topographic {
                latitude,
                longitude,
                height,
            } => write!(
                f,
                "[topography] mission {} - ({latitude:.4}, {longitude:.4}) h={height:.2}m",
                self.mission_id
            ),
            ReportBody::Installation { success } => write!(
                f,
                "[installation] mission {} - {}",
                self.mission_id,
                if *success { "succeeded" } else { "failed" }
            ),
        }
    }
}

fn need(body: &[u8], len: usize) -> Result<(), CodecError> {
    if body.len() < len {
        return Err(CodecError::Truncated {
            need: REPORT_HEADER_LEN + len,
            got: REPORT_HEADER_LEN + body.len(),
        });
    }
    Ok(())
}

fn decode_body(task_type: TaskType, body: &[u8]) -> Result<ReportBody, CodecError> {
    match task_type {
        TaskType::ImageCapture => {
            need(body, IMAGE_BODY_MIN)?;
            Ok(ReportBody::Image {
                chunk_id: u16::from_be_bytes([body[0], body[1]]),
                data: body[2..].to_vec(),
            })
        }
        TaskType::SampleCollection => {
            need(body, 1)?;
            let count = body[0] as usize;
            let mut components = Vec::with_capacity(count);
            let mut idx = 1;
            for _ in 0..count {
                need(body, idx + 1)?;
                let name_len = body[idx] as usize;
                idx += 1;
                need(body, idx + name_len + 4)?;
                let name = String::from_utf8_lossy(&body[idx..idx + name_len]).into_owned();
                idx += name_len;
                let percentage =
                    f32::from_be_bytes(body[idx..idx + 4].try_into().unwrap());
                idx += 4;
                components.push(Component { name, percentage });
            }
            Ok(ReportBody::Sample { components })
        }
        TaskType::EnvAnalysis => {
            need(body, ENV_BODY_LEN)?;
            let f = |i: usize| f32::from_be_bytes(body[i..i + 4].try_into().unwrap());
            Ok(ReportBody::Environment {
                temperature: f(0),
                oxygen: f(4),
                pressure: f(8),
                humidity: f(12),
                wind_speed: f(16),
                radiation: f(20),
            })
        }
        TaskType::RepairRescue => {
            need(body, REPAIR_BODY_LEN)?;
            Ok(ReportBody::Repair {
                problem_id: body[0],
                repairable: body[1] == 1,
            })
        }
        TaskType::TopoMapping => {
            need(body, TOPO_BODY_LEN)?;
            let f = |i: usize| f32::from_be_bytes(body[i..i + 4].try_into().unwrap());
            Ok(ReportBody::Topographic {
                latitude: f(0),
                longitude: f(4),
                height: f(8),
            })
        }
        TaskType::Installation => {
            need(body, INSTALL_BODY_LEN)?;
            Ok(ReportBody::Installation {
                success: body[0] == 1,
            })
        }
    }
}
