//! The rover's side of the fleet link.
//!
//! One receiver task owns the socket's read half and feeds two places: the
//! local mission queue (MISSION) and the batch slot channel (one boolean per
//! MISSION/NO_MISSION, so a prefetch knows when to stop waiting). Outgoing
//! REQUEST and REPORT packets go through the reliable send engine; their
//! acknowledgments come back either as pure ACKs or piggybacked on the
//! coordinator's responses. Piggybacked acks use 0 as "none carried", which
//! swallows the legitimate cumulative ack 0 once per sequence wrap (a
//! REQUEST sent with seq 0xffff); that send is retired one retransmission
//! later by the stale path's pure ACK.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use fleet_protocol::mission::MissionPayload;
use fleet_protocol::packet::{MsgType, Packet};
use fleet_protocol::reorder::Accept;
use fleet_protocol::report::Report;
use fleet_protocol::send::{send_ack, send_packet, RetryPolicy, SendError};
use fleet_protocol::session::PeerSession;
use fleet_protocol::{COORDINATOR_ID, MAX_DATAGRAM};

use crate::queue::MissionQueue;

pub struct Link {
    socket: Arc<UdpSocket>,
    mothership: SocketAddr,
    session: PeerSession,
    retry: RetryPolicy,
    rover_id: u8,
    queue: Arc<MissionQueue>,
    slot_tx: mpsc::UnboundedSender<bool>,
    slot_rx: Mutex<mpsc::UnboundedReceiver<bool>>,
}

impl Link {
    pub fn new(
        socket: Arc<UdpSocket>,
        mothership: SocketAddr,
        rover_id: u8,
        queue: Arc<MissionQueue>,
        retry: RetryPolicy,
    ) -> Arc<Self> {
        let (slot_tx, slot_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            socket,
            mothership,
            session: PeerSession::new(COORDINATOR_ID, mothership),
            retry,
            rover_id,
            queue,
            slot_tx,
            slot_rx: Mutex::new(slot_rx),
        })
    }

    pub fn spawn_receiver(self: &Arc<Self>) -> JoinHandle<()> {
        let link = self.clone();
        tokio::spawn(async move {
            if let Err(e) = link.receive_loop().await {
                warn!(%e, "link receiver stopped");
            }
        })
    }

    async fn receive_loop(&self) -> io::Result<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (n, from) = self.socket.recv_from(&mut buf).await?;
            let pkt = match Packet::decode(&buf[..n]) {
                Ok(pkt) => pkt,
                Err(e) => {
                    warn!(%from, %e, "undecodable datagram, dropping");
                    continue;
                }
            };

            if pkt.msg_type == MsgType::Ack {
                let retired = self.session.window().apply_ack(pkt.ack);
                debug!(ack = pkt.ack, retired, "rx ack");
                continue;
            }
            // Responses piggyback the ack of the REQUEST that provoked them;
            // 0 carries no acknowledgment.
            if pkt.ack != 0 {
                self.session.window().apply_ack(pkt.ack);
            }

            match self.session.accept(pkt) {
                Accept::Deliver { packets, acks } => {
                    for ack in acks {
                        send_ack(&*self.socket, self.mothership, self.rover_id, ack).await;
                    }
                    for pkt in packets {
                        self.deliver(pkt);
                    }
                }
                Accept::Buffered { ack } | Accept::Stale { ack } => {
                    send_ack(&*self.socket, self.mothership, self.rover_id, ack).await;
                }
                Accept::Corrupt => {}
            }
        }
    }

    fn deliver(&self, pkt: Packet) {
        match pkt.msg_type {
            MsgType::Mission => match MissionPayload::decode(&pkt.payload) {
                Ok(mission) => {
                    info!(
                        mission = mission.mission_id,
                        task = %mission.task_type,
                        priority = mission.priority,
                        "mission received"
                    );
                    self.queue.push(mission);
                    let _ = self.slot_tx.send(true);
                }
                Err(e) => warn!(%e, "malformed mission payload, dropping"),
            },
            MsgType::NoMission => {
                debug!("coordinator has no work");
                let _ = self.slot_tx.send(false);
            }
            other => warn!(msg_type = ?other, "unexpected message from coordinator"),
        }
    }

    /// Ask for up to `batch` missions and wait for the answers. Returns how
    /// many missions were enqueued. A slot timeout or a NO_MISSION ends the
    /// wait early.
    pub async fn request_missions(&self, batch: u8, slot_wait: Duration) -> usize {
        let pkt = Packet::new(
            self.rover_id,
            MsgType::Request,
            self.session.next_seq(),
            0,
            vec![batch],
        );
        if let Err(e) = send_packet(
            &*self.socket,
            self.mothership,
            pkt,
            self.session.window(),
            self.retry,
        )
        .await
        {
            warn!(%e, "mission request not acknowledged");
            return 0;
        }

        let mut got = 0;
        let mut slot_rx = self.slot_rx.lock().await;
        for _ in 0..batch.max(1) {
            match tokio::time::timeout(slot_wait, slot_rx.recv()).await {
                Ok(Some(true)) => got += 1,
                // NO_MISSION, a closed channel, and a slot timeout all mean
                // the batch is over.
                Ok(Some(false)) | Ok(None) => break,
                Err(_elapsed) => {
                    debug!(got, "batch slot wait timed out");
                    break;
                }
            }
        }
        got
    }

    pub async fn send_report(&self, report: &Report) -> Result<(), SendError> {
        let pkt = Packet::new(
            self.rover_id,
            MsgType::Report,
            self.session.next_seq(),
            0,
            report.encode(),
        );
        send_packet(
            &*self.socket,
            self.mothership,
            pkt,
            self.session.window(),
            self.retry,
        )
        .await
    }
}
