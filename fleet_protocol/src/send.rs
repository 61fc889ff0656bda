//! Reliable send engine: transmit one packet, retry on timeout until
//! acknowledged or the retry budget runs out.
//!
//! Pure ACK packets bypass the window entirely: sent once, never retried.
//! Everything else registers a completion signal under its sequence number,
//! transmits, and parks until the ordered receive engine applies a matching
//! cumulative acknowledgment or the per-attempt timeout fires.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::packet::{MsgType, Packet};
use crate::window::AckWindow;
use crate::wire::Wire;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Fixed wait for an acknowledgment before each retransmission.
    pub timeout: Duration,
    /// Retransmissions after the initial send.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1000),
            max_retries: 5,
        }
    }
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("transmit failed: {0}")]
    Io(#[from] io::Error),
    #[error("no ack for seq {seq} after {attempts} attempts")]
    RetriesExhausted { seq: u16, attempts: u32 },
}

/// Send `pkt` to `to`, retransmitting until acknowledged.
///
/// Returns once the packet's sequence number has been covered by a
/// cumulative acknowledgment, or with [`SendError::RetriesExhausted`] after
/// the retry budget is spent. The caller decides what an unresponsive peer
/// means for that message; it is never fatal here.
pub async fn send_packet(
    wire: &dyn Wire,
    to: SocketAddr,
    pkt: Packet,
    window: &AckWindow,
    policy: RetryPolicy,
) -> Result<(), SendError> {
    let bytes = pkt.encode();

    if pkt.msg_type == MsgType::Ack {
        debug!(ack = pkt.ack, %to, "tx ack");
        wire.transmit(&bytes, to).await?;
        return Ok(());
    }

    let Some(mut signal) = window.register(pkt.seq) else {
        // Same sequence number already in flight; the duplicate is a no-op.
        debug!(seq = pkt.seq, "duplicate submission ignored");
        return Ok(());
    };

    let attempts = policy.max_retries + 1;
    for attempt in 1..=attempts {
        wire.transmit(&bytes, to).await?;
        debug!(seq = pkt.seq, msg_type = ?pkt.msg_type, attempt, %to, "tx");

        match timeout(policy.timeout, &mut signal).await {
            Ok(_) => {
                debug!(seq = pkt.seq, "acked");
                return Ok(());
            }
            Err(_elapsed) if attempt < attempts => {
                warn!(seq = pkt.seq, attempt, "ack timeout, retransmitting");
            }
            Err(_elapsed) => break,
        }
    }

    window.remove(pkt.seq);
    warn!(seq = pkt.seq, attempts, "abandoning send, peer unresponsive");
    Err(SendError::RetriesExhausted {
        seq: pkt.seq,
        attempts,
    })
}

/// Fire-and-forget a pure acknowledgment for "next expected seq" `ack`.
pub async fn send_ack(wire: &dyn Wire, to: SocketAddr, rover_id: u8, ack: u16) {
    let pkt = Packet::pure_ack(rover_id, ack);
    if let Err(e) = wire.transmit(&pkt.encode(), to).await {
        warn!(?e, ack, "failed to send ack");
    }
}
