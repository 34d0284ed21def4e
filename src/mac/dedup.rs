//! Per-peer sequence tracking for duplicate suppression.
//!
//! Receivers record the last accepted sequence number per source address
//! and only deliver strictly increasing sequences upward; retransmitted
//! duplicates and stale frames are dropped, not reordered.

use log::warn;

use crate::frame::Address;

/// Maximum number of tracked peers
pub const MAX_PEERS: usize = 32;

/// Last-accepted sequence number per peer, linear scan.
///
/// Entries are created lazily on first contact and never removed. The
/// table is bounded; once full, frames from further new peers are
/// accepted but not tracked.
#[derive(Debug, Default)]
pub struct SeqTable {
    entries: heapless::Vec<(Address, u16), MAX_PEERS>,
}

impl SeqTable {
    pub fn new() -> Self {
        Self {
            entries: heapless::Vec::new(),
        }
    }

    /// Check and record an incoming (peer, sequence) pair.
    ///
    /// Returns true for the first frame ever seen from a peer and for any
    /// strictly greater sequence; equal or lesser sequences are
    /// duplicates.
    pub fn is_new(&mut self, peer: Address, seq: u16) -> bool {
        for (addr, last) in self.entries.iter_mut() {
            if *addr == peer {
                if seq > *last {
                    *last = seq;
                    return true;
                }
                return false;
            }
        }

        if self.entries.push((peer, seq)).is_err() {
            warn!("sequence table full, not tracking peer {}", peer);
        }
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const A: Address = Address([0, 0, 0, 0, 0, 1]);
    const B: Address = Address([0, 0, 0, 0, 0, 2]);

    #[test]
    fn first_contact_accepted() {
        let mut table = SeqTable::new();

        assert!(table.is_new(A, 5));
        assert!(table.is_new(B, 0));
    }

    #[test]
    fn duplicates_rejected() {
        let mut table = SeqTable::new();

        assert!(table.is_new(A, 5));
        assert!(!table.is_new(A, 5));
        assert!(!table.is_new(A, 4));
        assert!(table.is_new(A, 6));
    }

    #[test]
    fn peers_tracked_independently() {
        let mut table = SeqTable::new();

        assert!(table.is_new(A, 10));
        assert!(table.is_new(B, 3));
        assert!(!table.is_new(B, 3));
        assert!(!table.is_new(A, 10));
        assert!(table.is_new(B, 4));
    }

    #[test]
    fn full_table_still_accepts() {
        let mut table = SeqTable::new();

        for i in 0..MAX_PEERS {
            let peer = Address([1, 0, 0, 0, 0, i as u8]);
            assert!(table.is_new(peer, 1));
        }

        // Untracked peer is accepted on every frame
        let extra = Address([2, 0, 0, 0, 0, 0]);
        assert!(table.is_new(extra, 1));
        assert!(table.is_new(extra, 1));
    }
}
