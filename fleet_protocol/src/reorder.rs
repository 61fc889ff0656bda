//! Ordered receive engine: per-peer reassembly of in-order delivery from
//! out-of-order datagrams.
//!
//! The buffer is a pure state machine over decoded packets. Callers feed it
//! each arriving packet and act on the returned [`Accept`] value: deliver the
//! listed packets upward, transmit the listed acknowledgments, or drop. Doing
//! the I/O outside keeps every ordering rule testable without sockets.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::packet::{MsgType, Packet};
use crate::window::seq_before;

/// Outcome of offering one packet to the buffer.
#[derive(Debug, PartialEq)]
pub enum Accept {
    /// The packet (and possibly buffered successors) are ready, in order.
    /// `acks` holds the "next expected seq" value to confirm after each
    /// delivered packet; it is empty when the packet needs no direct ack.
    Deliver { packets: Vec<Packet>, acks: Vec<u16> },
    /// Arrived early; held until the gap fills. Re-confirm the current
    /// expectation so the sender can retire everything before it.
    Buffered { ack: u16 },
    /// Already delivered. Re-confirm past it, do not deliver again.
    Stale { ack: u16 },
    /// Failed checksum verification. Dropped silently, no ack.
    Corrupt,
}

/// Per-peer receive-side ordering state.
///
/// `suppress_request_ack` covers the coordinator's handshake style: a REQUEST
/// is not acknowledged directly because the response it provokes carries the
/// acknowledgment piggybacked.
#[derive(Debug, Default)]
pub struct ReorderBuffer {
    /// Next sequence number owed to the application; seeded by the first
    /// packet seen from this peer.
    expected: Option<u16>,
    held: HashMap<u16, Packet>,
    suppress_request_ack: bool,
}

impl ReorderBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ordering state that never directly acks REQUEST packets.
    pub fn suppressing_request_acks() -> Self {
        Self {
            suppress_request_ack: true,
            ..Self::default()
        }
    }

    /// Next sequence number this peer is expected to send, if known.
    pub fn expected(&self) -> Option<u16> {
        self.expected
    }

    pub fn held(&self) -> usize {
        self.held.len()
    }

    /// Offer one packet. Pure ACKs never reach here; route them to the send
    /// window instead.
    pub fn accept(&mut self, pkt: Packet) -> Accept {
        if !pkt.checksum_ok() {
            warn!(seq = pkt.seq, rover = pkt.rover_id, "checksum mismatch, dropping");
            return Accept::Corrupt;
        }

        // First packet from this peer seeds the expectation.
        let expected = *self.expected.get_or_insert(pkt.seq);

        if pkt.seq == expected {
            let mut packets = Vec::new();
            let mut acks = Vec::new();
            let mut next = pkt.seq.wrapping_add(1);
            self.push_delivery(pkt, next, &mut packets, &mut acks);

            // Drain any buffered successors the gap was holding back.
            while let Some(held) = self.held.remove(&next) {
                next = next.wrapping_add(1);
                self.push_delivery(held, next, &mut packets, &mut acks);
            }
            self.expected = Some(next);
            Accept::Deliver { packets, acks }
        } else if seq_before(expected, pkt.seq) {
            debug!(seq = pkt.seq, expected, "early packet, buffering");
            self.held.insert(pkt.seq, pkt);
            Accept::Buffered { ack: expected }
        } else {
            // Duplicate of something already delivered. The ack confirming it
            // was lost; repeat it without redelivering.
            debug!(seq = pkt.seq, expected, "stale packet, re-acking");
            Accept::Stale {
                ack: pkt.seq.wrapping_add(1),
            }
        }
    }

    fn push_delivery(&self, pkt: Packet, ack: u16, packets: &mut Vec<Packet>, acks: &mut Vec<u16>) {
        let suppress = self.suppress_request_ack && pkt.msg_type == MsgType::Request;
        packets.push(pkt);
        if !suppress {
            acks.push(ack);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pkt(seq: u16) -> Packet {
        Packet::new(1, MsgType::Report, seq, 0, vec![seq as u8, 0xaa])
    }

    fn request(seq: u16) -> Packet {
        Packet::new(1, MsgType::Request, seq, 0, vec![])
    }

    fn delivered(accept: Accept) -> (Vec<u16>, Vec<u16>) {
        match accept {
            Accept::Deliver { packets, acks } => {
                (packets.into_iter().map(|p| p.seq).collect(), acks)
            }
            other => panic!("expected delivery, got {other:?}"),
        }
    }

    #[test]
    fn in_order_packets_deliver_immediately() {
        let mut buf = ReorderBuffer::new();
        assert_eq!(delivered(buf.accept(pkt(10))), (vec![10], vec![11]));
        assert_eq!(delivered(buf.accept(pkt(11))), (vec![11], vec![12]));
        assert_eq!(buf.expected(), Some(12));
    }

    #[test]
    fn gap_buffers_until_filled() {
        let mut buf = ReorderBuffer::new();
        let _ = buf.accept(pkt(0));
        // 2 arrives before 1: held, expectation re-acked.
        assert_eq!(buf.accept(pkt(2)), Accept::Buffered { ack: 1 });
        assert_eq!(buf.held(), 1);
        // 1 fills the gap and flushes 2 with it.
        assert_eq!(delivered(buf.accept(pkt(1))), (vec![1, 2], vec![2, 3]));
        assert_eq!(buf.held(), 0);
        assert_eq!(buf.expected(), Some(3));
    }

    #[test]
    fn stale_packet_is_reacked_not_redelivered() {
        let mut buf = ReorderBuffer::new();
        let _ = buf.accept(pkt(5));
        let _ = buf.accept(pkt(6));
        assert_eq!(buf.accept(pkt(5)), Accept::Stale { ack: 6 });
        assert_eq!(buf.expected(), Some(7));
    }

    #[test]
    fn corrupted_packet_is_dropped_without_state_change() {
        let mut buf = ReorderBuffer::new();
        let mut bad = pkt(0);
        bad.checksum = bad.checksum.wrapping_add(1);
        assert_eq!(buf.accept(bad), Accept::Corrupt);
        // Expectation not seeded by garbage.
        assert_eq!(buf.expected(), None);
        assert_eq!(delivered(buf.accept(pkt(3))), (vec![3], vec![4]));
    }

    #[test]
    fn expectation_seeds_from_first_packet() {
        let mut buf = ReorderBuffer::new();
        assert_eq!(delivered(buf.accept(pkt(0x8000))), (vec![0x8000], vec![0x8001]));
    }

    #[test]
    fn sequence_wraps_across_ffff() {
        let mut buf = ReorderBuffer::new();
        let _ = buf.accept(pkt(0xffff));
        assert_eq!(delivered(buf.accept(pkt(0))), (vec![0], vec![1]));
        assert_eq!(buf.expected(), Some(1));
    }

    #[test]
    fn request_ack_suppression_skips_only_requests() {
        let mut buf = ReorderBuffer::suppressing_request_acks();
        let (seqs, acks) = delivered(buf.accept(request(0)));
        assert_eq!(seqs, vec![0]);
        assert!(acks.is_empty());
        // Non-request traffic still gets confirmed directly.
        let (seqs, acks) = delivered(buf.accept(pkt(1)));
        assert_eq!(seqs, vec![1]);
        assert_eq!(acks, vec![2]);
    }

    proptest! {
        /// Any arrival order of a contiguous burst delivers each packet
        /// exactly once, in sequence order, as long as the lowest sequence
        /// number arrives (it does: the burst is a permutation).
        #[test]
        fn any_permutation_delivers_in_order(order in Just((0u16..12).collect::<Vec<_>>()).prop_shuffle()) {
            let mut buf = ReorderBuffer::new();
            // Pin the expectation so a shuffled first packet is not treated
            // as the session start.
            let _ = buf.accept(pkt(u16::MAX));
            let mut out = vec![u16::MAX];
            for seq in order {
                if let Accept::Deliver { packets, .. } = buf.accept(pkt(seq)) {
                    out.extend(packets.into_iter().map(|p| p.seq));
                }
            }
            let mut want = vec![u16::MAX];
            want.extend(0u16..12);
            prop_assert_eq!(out, want);
            prop_assert_eq!(buf.held(), 0);
        }
    }
}
