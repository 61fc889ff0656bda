//! Local mission queue: three FIFO priority buckets.

use parking_lot::Mutex;
use std::collections::VecDeque;

use fleet_protocol::mission::MissionPayload;

/// Priorities run 1 (highest) to 3; anything outside that range lands in the
/// lowest bucket.
#[derive(Debug, Default)]
pub struct MissionQueue {
    buckets: Mutex<[VecDeque<MissionPayload>; 3]>,
}

impl MissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, mission: MissionPayload) {
        let bucket = match mission.priority {
            1..=3 => mission.priority as usize - 1,
            _ => 2,
        };
        self.buckets.lock()[bucket].push_back(mission);
    }

    /// Highest-priority mission, FIFO within a bucket.
    pub fn pop(&self) -> Option<MissionPayload> {
        let mut buckets = self.buckets.lock();
        buckets.iter_mut().find_map(|b| b.pop_front())
    }

    pub fn len(&self) -> usize {
        self.buckets.lock().iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
