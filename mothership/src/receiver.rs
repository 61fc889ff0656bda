//! UDP listener loop.
//!
//! One long-lived task reads datagrams, routes acknowledgments to the send
//! windows, runs everything else through the per-peer ordering state, and
//! spawns an independent task per delivered packet so a slow handler never
//! stalls the socket.

use std::sync::Arc;

use anyhow::Result;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use fleet_protocol::packet::{MsgType, Packet};
use fleet_protocol::reorder::Accept;
use fleet_protocol::report::Report;
use fleet_protocol::send::send_ack;
use fleet_protocol::session::PeerSession;
use fleet_protocol::{COORDINATOR_ID, MAX_DATAGRAM};

use crate::dispatch::Dispatcher;

pub async fn run(socket: Arc<UdpSocket>, dispatcher: Arc<Dispatcher>) -> Result<()> {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (n, from) = socket.recv_from(&mut buf).await?;
        let pkt = match Packet::decode(&buf[..n]) {
            Ok(pkt) => pkt,
            Err(e) => {
                warn!(%from, %e, "undecodable datagram, dropping");
                continue;
            }
        };

        let session = dispatcher.session_for(pkt.rover_id, from);

        if pkt.msg_type == MsgType::Ack {
            let retired = session.window().apply_ack(pkt.ack);
            debug!(rover = pkt.rover_id, ack = pkt.ack, retired, "rx ack");
            continue;
        }
        // Data packets may piggyback an acknowledgment; 0 carries none. A
        // real cumulative ack of 0 (peer seq space just wrapped) is skipped
        // here and recovered by the retransmit plus stale-path re-ack.
        if pkt.ack != 0 {
            session.window().apply_ack(pkt.ack);
        }

        match session.accept(pkt) {
            Accept::Deliver { packets, acks } => {
                for ack in acks {
                    send_ack(&*socket, from, COORDINATOR_ID, ack).await;
                }
                for pkt in packets {
                    let dispatcher = dispatcher.clone();
                    let session = session.clone();
                    tokio::spawn(async move {
                        handle_delivered(&dispatcher, &session, pkt).await;
                    });
                }
            }
            Accept::Buffered { ack } | Accept::Stale { ack } => {
                send_ack(&*socket, from, COORDINATOR_ID, ack).await;
            }
            Accept::Corrupt => {}
        }
    }
}

async fn handle_delivered(dispatcher: &Dispatcher, session: &Arc<PeerSession>, pkt: Packet) {
    match pkt.msg_type {
        MsgType::Request => {
            // Payload carries the requested batch size; absent means 1.
            let batch = pkt.payload.first().copied().unwrap_or(1);
            dispatcher
                .handle_request(session.clone(), pkt.seq, batch)
                .await;
        }
        MsgType::Report => match Report::decode(&pkt.payload) {
            Ok(report) => dispatcher.handle_report(pkt.rover_id, report),
            Err(e) => warn!(rover = pkt.rover_id, %e, "malformed report, dropping"),
        },
        other => {
            warn!(rover = pkt.rover_id, msg_type = ?other, "unexpected message from rover");
        }
    }
}
