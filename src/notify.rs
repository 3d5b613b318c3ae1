//! Size-announcement handshake used by the consistency checker.
//!
//! One handshake round lets every rank declare, out of band, how many items
//! it believes each of its interface partners shares with it. The checker
//! compares the declarations against its own partner table.

use std::sync::{Arc, Barrier};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::coupling::Rank;
use crate::replica_error::ReplicaError;

/// One counterpart declaration received during a handshake.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct SizeAnnouncement {
    pub from: Rank,
    pub items: usize,
}

/// Notify-handshake contract.
///
/// Usage is strictly `begin` → `announce`* → `complete` → `end`, one session
/// at a time per process. `complete` blocks until every counterpart
/// announcement of the round has arrived and is collective across all
/// participating ranks.
pub trait NotifyService {
    /// Open a handshake that will announce to `expected` partners.
    fn begin(&self, expected: usize) -> Result<(), ReplicaError>;

    /// Declare `items` shared items towards rank `to`.
    fn announce(&self, to: Rank, items: usize) -> Result<(), ReplicaError>;

    /// Block until the round is over; returns the announcements addressed to
    /// the local rank, ordered by sender rank.
    fn complete(&self) -> Result<Vec<SizeAnnouncement>, ReplicaError>;

    /// Close the session.
    fn end(&self);
}

// --- In-memory world for simulated ranks ---

#[derive(Debug)]
struct MemBoard {
    /// (to, from) -> items
    posted: DashMap<(Rank, Rank), usize>,
    gate: Barrier,
}

/// In-process notify backend. `complete` rendezvouses all ranks of the world
/// twice: once so every announcement is on the board before anyone reads it,
/// once so the board is drained before the next round may post.
#[derive(Debug)]
pub struct MemNotify {
    rank: Rank,
    board: Arc<MemBoard>,
    session: Mutex<Option<usize>>,
}

impl MemNotify {
    /// One endpoint per simulated rank. Every rank of the world must take
    /// part in every round or `complete` deadlocks.
    pub fn world(n: usize) -> Vec<MemNotify> {
        let board = Arc::new(MemBoard {
            posted: DashMap::new(),
            gate: Barrier::new(n),
        });
        (0..n)
            .map(|rank| MemNotify {
                rank,
                board: Arc::clone(&board),
                session: Mutex::new(None),
            })
            .collect()
    }
}

impl NotifyService for MemNotify {
    fn begin(&self, expected: usize) -> Result<(), ReplicaError> {
        let mut session = self.session.lock();
        if session.is_some() {
            return Err(ReplicaError::Notify(
                "a handshake session is already open".into(),
            ));
        }
        *session = Some(expected);
        Ok(())
    }

    fn announce(&self, to: Rank, items: usize) -> Result<(), ReplicaError> {
        if self.session.lock().is_none() {
            return Err(ReplicaError::Notify("announce outside a session".into()));
        }
        self.board.posted.insert((to, self.rank), items);
        Ok(())
    }

    fn complete(&self) -> Result<Vec<SizeAnnouncement>, ReplicaError> {
        if self.session.lock().is_none() {
            return Err(ReplicaError::Notify("complete outside a session".into()));
        }
        // Round barrier: all announcements are posted past this point.
        self.board.gate.wait();
        let mut replies: Vec<SizeAnnouncement> = self
            .board
            .posted
            .iter()
            .filter(|e| e.key().0 == self.rank)
            .map(|e| SizeAnnouncement {
                from: e.key().1,
                items: *e.value(),
            })
            .collect();
        for r in &replies {
            self.board.posted.remove(&(self.rank, r.from));
        }
        replies.sort_unstable_by_key(|r| r.from);
        // Drain barrier: nobody starts the next round on a half-read board.
        self.board.gate.wait();
        Ok(replies)
    }

    fn end(&self) {
        *self.session.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn two_rank_handshake() {
        let mut world = MemNotify::world(2);
        let n1 = world.pop().unwrap();
        let n0 = world.pop().unwrap();

        thread::scope(|s| {
            let h0 = s.spawn(move || {
                n0.begin(1).unwrap();
                n0.announce(1, 10).unwrap();
                let got = n0.complete().unwrap();
                n0.end();
                got
            });
            let h1 = s.spawn(move || {
                n1.begin(1).unwrap();
                n1.announce(0, 10).unwrap();
                let got = n1.complete().unwrap();
                n1.end();
                got
            });
            let r0 = h0.join().unwrap();
            let r1 = h1.join().unwrap();
            assert_eq!(r0, vec![SizeAnnouncement { from: 1, items: 10 }]);
            assert_eq!(r1, vec![SizeAnnouncement { from: 0, items: 10 }]);
        });
    }

    #[test]
    fn nested_session_rejected() {
        let world = MemNotify::world(1);
        world[0].begin(0).unwrap();
        assert!(matches!(world[0].begin(0), Err(ReplicaError::Notify(_))));
        world[0].end();
        world[0].begin(0).unwrap();
        world[0].end();
    }

    #[test]
    fn announce_outside_session_rejected() {
        let world = MemNotify::world(1);
        assert!(matches!(
            world[0].announce(0, 1),
            Err(ReplicaError::Notify(_))
        ));
    }
}
