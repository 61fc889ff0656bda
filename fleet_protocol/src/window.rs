//! Per-peer record of in-flight, unacknowledged packets.
//!
//! Each reliable send parks on a oneshot receiver registered here under its
//! sequence number. Acknowledgments are cumulative: applying ack `n` fires
//! and removes every entry whose sequence number precedes `n` in 16-bit
//! wrapping order, so a single ACK can retire many outstanding sends.

use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::oneshot;

/// True when `a` precedes `b` in the wrapping u16 sequence space.
pub fn seq_before(a: u16, b: u16) -> bool {
    b.wrapping_sub(a).wrapping_sub(1) < 0x8000
}

#[derive(Debug, Default)]
struct Inner {
    /// Highest cumulative ack applied, as "last confirmed seq"; `None` until
    /// the first acknowledgment arrives.
    last_ack: Option<u16>,
    in_flight: HashMap<u16, oneshot::Sender<()>>,
}

/// Acknowledgment window for one direction of a peer session.
#[derive(Debug, Default)]
pub struct AckWindow {
    inner: Mutex<Inner>,
}

impl AckWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `seq` as in flight. Returns `None` if that sequence number is
    /// already pending; the duplicate submission is a no-op.
    pub fn register(&self, seq: u16) -> Option<oneshot::Receiver<()>> {
        let mut inner = self.inner.lock();
        if inner.in_flight.contains_key(&seq) {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        inner.in_flight.insert(seq, tx);
        Some(rx)
    }

    /// Drop the window entry for `seq` without signaling it (retry budget
    /// exhausted).
    pub fn remove(&self, seq: u16) {
        self.inner.lock().in_flight.remove(&seq);
    }

    /// Apply a cumulative acknowledgment: complete every pending send with a
    /// sequence number before `ack`. Returns how many entries were retired.
    pub fn apply_ack(&self, ack: u16) -> usize {
        let mut inner = self.inner.lock();
        let confirmed: Vec<u16> = inner
            .in_flight
            .keys()
            .copied()
            .filter(|seq| seq_before(*seq, ack))
            .collect();
        for seq in &confirmed {
            if let Some(tx) = inner.in_flight.remove(seq) {
                let _ = tx.send(());
            }
        }
        let last = ack.wrapping_sub(1);
        match inner.last_ack {
            Some(prev) if !seq_before(prev, last) => {}
            _ => inner.last_ack = Some(last),
        }
        confirmed.len()
    }

    pub fn last_ack(&self) -> Option<u16> {
        self.inner.lock().last_ack
    }

    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_order_handles_wraparound() {
        assert!(seq_before(0, 1));
        assert!(seq_before(5, 100));
        assert!(!seq_before(5, 5));
        assert!(!seq_before(100, 5));
        assert!(seq_before(0xfffe, 0xffff));
        assert!(seq_before(0xffff, 1));
    }

    #[tokio::test]
    async fn cumulative_ack_retires_everything_below() {
        let w = AckWindow::new();
        let mut waiters: Vec<_> = (0..5u16).map(|s| w.register(s).unwrap()).collect();
        let rx_above = w.register(7).unwrap();

        // Ack 5 confirms seqs 0..=4, nothing at or above 5.
        assert_eq!(w.apply_ack(5), 5);
        for rx in waiters.drain(..) {
            rx.await.expect("signaled");
        }
        assert_eq!(w.in_flight(), 1);
        assert_eq!(w.last_ack(), Some(4));
        drop(rx_above);
    }

    #[tokio::test]
    async fn entry_at_or_above_ack_is_untouched() {
        let w = AckWindow::new();
        let mut rx = w.register(5).unwrap();
        assert_eq!(w.apply_ack(5), 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(w.in_flight(), 1);
    }

    #[test]
    fn duplicate_registration_is_a_no_op() {
        let w = AckWindow::new();
        let _rx = w.register(9).unwrap();
        assert!(w.register(9).is_none());
        assert_eq!(w.in_flight(), 1);
    }

    #[test]
    fn remove_discards_without_signal() {
        let w = AckWindow::new();
        let mut rx = w.register(3).unwrap();
        w.remove(3);
        assert_eq!(w.in_flight(), 0);
        // Sender side dropped: the waiter observes closure, not completion.
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn stale_ack_does_not_move_last_ack_backwards() {
        let w = AckWindow::new();
        w.apply_ack(10);
        assert_eq!(w.last_ack(), Some(9));
        w.apply_ack(4);
        assert_eq!(w.last_ack(), Some(9));
    }
}
