//! Mission dispatch: answers rover REQUESTs from the intake queue and folds
//! REPORTs into the mission table.
//!
//! Placement is load-balanced, not requester-pinned: each popped mission goes
//! to the least-loaded eligible rover, which may or may not be the one that
//! asked. The requester always gets an answer, MISSION or NO_MISSION, and
//! that answer carries the acknowledgment of its REQUEST.

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::json;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use fleet_protocol::mission::MissionPayload;
use fleet_protocol::packet::{MsgType, Packet};
use fleet_protocol::report::Report;
use fleet_protocol::send::{send_packet, RetryPolicy};
use fleet_protocol::session::PeerSession;
use fleet_protocol::wire::Wire;
use fleet_protocol::COORDINATOR_ID;

use crate::events;
use crate::missions::{Lifecycle, MissionTable};

/// A rover executing this many missions is not offered more.
pub const MAX_ACTIVE_PER_ROVER: u8 = 3;

pub type Registry = DashMap<u8, Arc<PeerSession>>;

pub struct Dispatcher {
    wire: Arc<dyn Wire>,
    registry: Arc<Registry>,
    table: Arc<MissionTable>,
    queue_tx: mpsc::Sender<MissionPayload>,
    queue_rx: Mutex<mpsc::Receiver<MissionPayload>>,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub fn new(
        wire: Arc<dyn Wire>,
        registry: Arc<Registry>,
        table: Arc<MissionTable>,
        queue_tx: mpsc::Sender<MissionPayload>,
        queue_rx: mpsc::Receiver<MissionPayload>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            wire,
            registry,
            table,
            queue_tx,
            queue_rx: Mutex::new(queue_rx),
            retry,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn table(&self) -> &Arc<MissionTable> {
        &self.table
    }

    /// Least-loaded rover still under the mission cap; ties break toward the
    /// lowest rover id so placement is deterministic.
    fn least_loaded(&self) -> Option<Arc<PeerSession>> {
        self.registry
            .iter()
            .filter(|entry| entry.value().active_missions() < MAX_ACTIVE_PER_ROVER)
            .min_by_key(|entry| (entry.value().active_missions(), *entry.key()))
            .map(|entry| entry.value().clone())
    }

    /// Serve one REQUEST: up to `batch` placement rounds, stopping at the
    /// first round that cannot produce a MISSION for the requester's queue.
    pub async fn handle_request(&self, requester: Arc<PeerSession>, request_seq: u16, batch: u8) {
        let request_ack = request_seq.wrapping_add(1);
        let rounds = batch.max(1);
        debug!(rover = requester.id(), batch = rounds, "serving mission request");

        for _ in 0..rounds {
            let popped = self.queue_rx.lock().await.try_recv().ok();
            let Some(mission) = popped else {
                self.send_no_mission(&requester, request_ack).await;
                return;
            };

            let Some(target) = self.least_loaded() else {
                // Every rover is saturated. The mission is not lost.
                warn!(mission = mission.mission_id, "all rovers at capacity, requeueing");
                self.requeue(mission);
                self.send_no_mission(&requester, request_ack).await;
                return;
            };

            self.place(mission, &target, &requester, request_ack).await;
        }
    }

    async fn place(
        &self,
        mission: MissionPayload,
        target: &Arc<PeerSession>,
        requester: &Arc<PeerSession>,
        request_ack: u16,
    ) {
        let active = target.mission_started();
        self.table.assign(&mission, target.id());
        events::publish(
            events::MISSION_CREATED,
            json!({
                "mission_id": mission.mission_id,
                "rover_id": target.id(),
                "task_type": mission.task_type,
                "priority": mission.priority,
            }),
        );
        info!(
            mission = mission.mission_id,
            rover = target.id(),
            active,
            task = %mission.task_type,
            "mission assigned"
        );

        // Only the requester's own REQUEST gets retired by this packet.
        let ack = if target.id() == requester.id() {
            request_ack
        } else {
            0
        };
        let pkt = Packet::new(
            COORDINATOR_ID,
            MsgType::Mission,
            target.next_seq(),
            ack,
            mission.encode(),
        );
        match send_packet(&*self.wire, target.addr(), pkt, target.window(), self.retry).await {
            Ok(()) => {
                self.table.set_lifecycle(mission.mission_id, Lifecycle::MovingTo);
                self.publish_update(mission.mission_id);
            }
            Err(e) => {
                warn!(
                    mission = mission.mission_id,
                    rover = target.id(),
                    %e,
                    "mission delivery failed, requeueing"
                );
                target.mission_finished();
                self.requeue(mission);
            }
        }
    }

    async fn send_no_mission(&self, requester: &Arc<PeerSession>, request_ack: u16) {
        debug!(rover = requester.id(), "no mission available");
        let pkt = Packet::new(
            COORDINATOR_ID,
            MsgType::NoMission,
            requester.next_seq(),
            request_ack,
            Vec::new(),
        );
        if let Err(e) = send_packet(
            &*self.wire,
            requester.addr(),
            pkt,
            requester.window(),
            self.retry,
        )
        .await
        {
            warn!(rover = requester.id(), %e, "NO_MISSION delivery failed");
        }
    }

    fn requeue(&self, mission: MissionPayload) {
        if let Err(e) = self.queue_tx.try_send(mission) {
            warn!(%e, "intake queue full, mission dropped");
        }
    }

    /// Fold one decoded report into the table and the owner's load count.
    pub fn handle_report(&self, from: u8, report: Report) {
        info!(rover = from, report = %report, "report received");
        let Some(outcome) = self.table.record_report(report) else {
            warn!(rover = from, "report for unknown mission, dropping");
            return;
        };
        if outcome.lifecycle == Lifecycle::Completed {
            if let Some(owner) = self.registry.get(&outcome.rover_id) {
                let remaining = owner.mission_finished();
                debug!(rover = outcome.rover_id, remaining, "mission slot freed");
            }
        }
        self.publish_update_for(outcome.rover_id, outcome.lifecycle);
    }

    fn publish_update(&self, mission_id: u16) {
        if let Some(m) = self.table.get(mission_id) {
            events::publish(
                events::MISSION_UPDATE,
                json!({
                    "mission_id": m.mission_id,
                    "rover_id": m.rover_id,
                    "lifecycle": m.lifecycle,
                    "reports": m.reports.len(),
                }),
            );
        }
    }

    fn publish_update_for(&self, rover_id: u8, lifecycle: Lifecycle) {
        events::publish(
            events::MISSION_UPDATE,
            json!({ "rover_id": rover_id, "lifecycle": lifecycle }),
        );
    }

    /// Register the peer on first contact, refreshing its address either way.
    pub fn session_for(&self, rover_id: u8, addr: SocketAddr) -> Arc<PeerSession> {
        use dashmap::mapref::entry::Entry;
        let session = match self.registry.entry(rover_id) {
            Entry::Occupied(e) => e.get().clone(),
            Entry::Vacant(v) => {
                info!(rover = rover_id, %addr, "rover connected");
                events::publish(
                    events::ROVER_CONNECTED,
                    json!({ "rover_id": rover_id, "addr": addr.to_string() }),
                );
                v.insert(Arc::new(PeerSession::suppressing_request_acks(rover_id, addr)))
                    .clone()
            }
        };
        session.update_addr(addr);
        session
    }
}
