//! Coordinator-side mission bookkeeping.
//!
//! The table is the source of truth for every mission ever dispatched. The
//! protocol layer only ever adds to it and advances lifecycles; nothing here
//! deletes a mission.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;

use fleet_protocol::mission::{Coordinate, MissionPayload, TaskType};
use fleet_protocol::report::{Report, ReportBody};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Pending,
    MovingTo,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize)]
pub struct MissionState {
    pub mission_id: u16,
    pub rover_id: u8,
    pub task_type: TaskType,
    pub coordinate: Coordinate,
    pub duration_secs: u32,
    pub update_freq_secs: u32,
    pub priority: u8,
    pub lifecycle: Lifecycle,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub reports: Vec<Report>,
}

/// Outcome of folding one report into the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOutcome {
    pub rover_id: u8,
    pub lifecycle: Lifecycle,
}

#[derive(Debug, Default)]
pub struct MissionTable {
    inner: Mutex<HashMap<u16, MissionState>>,
}

impl MissionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly assigned mission in `Pending` state.
    pub fn assign(&self, payload: &MissionPayload, rover_id: u8) {
        let now = Utc::now();
        let state = MissionState {
            mission_id: payload.mission_id,
            rover_id,
            task_type: payload.task_type,
            coordinate: payload.coordinate,
            duration_secs: payload.duration_secs,
            update_freq_secs: payload.update_freq_secs,
            priority: payload.priority,
            lifecycle: Lifecycle::Pending,
            created_at: now,
            updated_at: now,
            reports: Vec::new(),
        };
        self.inner.lock().insert(payload.mission_id, state);
    }

    pub fn set_lifecycle(&self, mission_id: u16, lifecycle: Lifecycle) {
        if let Some(m) = self.inner.lock().get_mut(&mission_id) {
            m.lifecycle = lifecycle;
            m.updated_at = Utc::now();
        }
    }

    /// Append a report and advance the lifecycle. Returns `None` for a
    /// mission id the table has never seen.
    pub fn record_report(&self, report: Report) -> Option<ReportOutcome> {
        let mut inner = self.inner.lock();
        let m = inner.get_mut(&report.mission_id)?;
        m.lifecycle = if report.is_last {
            Lifecycle::Completed
        } else {
            Lifecycle::InProgress
        };
        m.updated_at = Utc::now();
        m.reports.push(report);
        Some(ReportOutcome {
            rover_id: m.rover_id,
            lifecycle: m.lifecycle,
        })
    }

    pub fn get(&self, mission_id: u16) -> Option<MissionState> {
        self.inner.lock().get(&mission_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Stitch an image mission's chunks back together in chunk-id order.
    /// Retransmitted and repeated chunk ids count once, first arrival wins.
    /// Returns `None` until at least one image chunk has arrived.
    pub fn assemble_image(&self, mission_id: u16) -> Option<Vec<u8>> {
        let inner = self.inner.lock();
        let m = inner.get(&mission_id)?;
        let mut chunks: Vec<(u16, &[u8])> = m
            .reports
            .iter()
            .filter_map(|r| match &r.body {
                ReportBody::Image { chunk_id, data } => Some((*chunk_id, data.as_slice())),
                _ => None,
            })
            .collect();
        if chunks.is_empty() {
            return None;
        }
        chunks.sort_by_key(|(id, _)| *id);
        chunks.dedup_by_key(|(id, _)| *id);
        let mut out = Vec::with_capacity(chunks.iter().map(|(_, d)| d.len()).sum());
        for (_, d) in chunks {
            out.extend_from_slice(d);
        }
        Some(out)
    }
}
