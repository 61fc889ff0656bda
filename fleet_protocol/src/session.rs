//! Per-peer transport state shared by both ends of the fleet link.
//!
//! A [`PeerSession`] bundles the pieces one peer needs to talk reliably to
//! one other peer: a sequence counter for outgoing packets, the ack window
//! tracking in-flight sends, the reorder buffer for arriving traffic, and the
//! coordinator-side count of missions the peer is executing.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, AtomicU16, Ordering};

use parking_lot::Mutex;

use crate::reorder::{Accept, ReorderBuffer};
use crate::packet::Packet;
use crate::window::AckWindow;

#[derive(Debug)]
pub struct PeerSession {
    id: u8,
    addr: Mutex<SocketAddr>,
    next_seq: AtomicU16,
    window: AckWindow,
    reorder: Mutex<ReorderBuffer>,
    active_missions: AtomicU8,
}

impl PeerSession {
    pub fn new(id: u8, addr: SocketAddr) -> Self {
        Self::with_reorder(id, addr, ReorderBuffer::new())
    }

    /// Session whose receive side never directly acks REQUEST packets; the
    /// response carries the acknowledgment instead.
    pub fn suppressing_request_acks(id: u8, addr: SocketAddr) -> Self {
        Self::with_reorder(id, addr, ReorderBuffer::suppressing_request_acks())
    }

    fn with_reorder(id: u8, addr: SocketAddr, reorder: ReorderBuffer) -> Self {
        Self {
            id,
            addr: Mutex::new(addr),
            next_seq: AtomicU16::new(0),
            window: AckWindow::new(),
            reorder: Mutex::new(reorder),
            active_missions: AtomicU8::new(0),
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        *self.addr.lock()
    }

    /// Track the peer's most recent source address; rovers can rebind.
    pub fn update_addr(&self, addr: SocketAddr) {
        *self.addr.lock() = addr;
    }

    /// Claim the next outgoing sequence number, wrapping at u16::MAX.
    pub fn next_seq(&self) -> u16 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    pub fn window(&self) -> &AckWindow {
        &self.window
    }

    /// Run the arriving packet through the ordering state machine.
    pub fn accept(&self, pkt: Packet) -> Accept {
        self.reorder.lock().accept(pkt)
    }

    /// Next sequence number expected from the peer, once seeded.
    pub fn expected_seq(&self) -> Option<u16> {
        self.reorder.lock().expected()
    }

    pub fn active_missions(&self) -> u8 {
        self.active_missions.load(Ordering::Relaxed)
    }

    pub fn mission_started(&self) -> u8 {
        self.active_missions.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Saturating decrement: a duplicate completion report never underflows
    /// the load count.
    pub fn mission_finished(&self) -> u8 {
        self.active_missions
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            })
            .map(|prev| prev.saturating_sub(1))
            .unwrap_or(0)
    }
}
