//! Transport adapter: non-blocking, poll-driven byte messaging between ranks.
//!
//! Messages are contiguous byte slices with no framing of their own; the
//! interface layer correlates payloads purely by position, so the transport
//! only has to deliver whole messages in order per (peer, tag) pair.
//!
//! The backend is chosen at construction time through the registry's type
//! parameter. [`MemTransport`] is the in-process backend for simulated
//! multi-rank tests; an MPI-backed implementation lives with the application,
//! not here.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;

use crate::coupling::Rank;
use crate::replica_error::ReplicaError;

/// Tri-state result of polling an in-flight operation.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CommPoll {
    Pending,
    Ready,
    Failed,
}

/// Non-blocking transport contract.
///
/// `isend`/`irecv` return opaque in-flight tokens; callers drive them with
/// `poll_send`/`poll_recv` and never block. A receive token whose poll
/// returned [`CommPoll::Ready`] is consumed with [`Transport::complete_recv`].
pub trait Transport {
    type Channel: Clone + std::fmt::Debug;
    type SendToken;
    type RecvToken;

    /// Rank of the local process.
    fn rank(&self) -> Rank;

    /// Resolve channels for a batch of partner ranks in one call.
    fn connect(&self, peers: &[Rank]) -> Result<Vec<Self::Channel>, ReplicaError>;

    fn isend(
        &self,
        chan: &Self::Channel,
        tag: u16,
        buf: &[u8],
    ) -> Result<Self::SendToken, ReplicaError>;

    /// Post a receive for a message of exactly `len` bytes.
    fn irecv(
        &self,
        chan: &Self::Channel,
        tag: u16,
        len: usize,
    ) -> Result<Self::RecvToken, ReplicaError>;

    fn poll_send(&self, tok: &mut Self::SendToken) -> CommPoll;

    fn poll_recv(&self, tok: &mut Self::RecvToken) -> CommPoll;

    /// Consume a token whose last poll returned `Ready` and take the payload.
    ///
    /// # Errors
    /// `Transport` if the token was not ready or the payload length does not
    /// match the posted receive length.
    fn complete_recv(&self, tok: Self::RecvToken) -> Result<Vec<u8>, ReplicaError>;
}

// --- In-memory world for simulated ranks ---

type MailKey = (Rank, Rank, u16); // (src, dst, tag)

#[derive(Debug, Default)]
struct MemNet {
    mail: DashMap<MailKey, VecDeque<Bytes>>,
}

/// Channel handle of the in-memory backend: just the peer rank.
#[derive(Clone, Debug)]
pub struct MemChannel {
    peer: Rank,
}

/// In-process transport endpoint. All endpoints of one world share a mailbox
/// board keyed by (src, dst, tag); the board is held through an explicit
/// `Arc` so independent worlds can coexist in one test process.
#[derive(Clone, Debug)]
pub struct MemTransport {
    rank: Rank,
    net: Arc<MemNet>,
}

impl MemTransport {
    /// One endpoint per simulated rank, all sharing one mailbox board.
    pub fn world(n: usize) -> Vec<MemTransport> {
        let net = Arc::new(MemNet::default());
        (0..n)
            .map(|rank| MemTransport {
                rank,
                net: Arc::clone(&net),
            })
            .collect()
    }
}

pub struct MemSendToken;

pub struct MemRecvToken {
    key: MailKey,
    len: usize,
    data: Option<Bytes>,
}

impl Transport for MemTransport {
    type Channel = MemChannel;
    type SendToken = MemSendToken;
    type RecvToken = MemRecvToken;

    fn rank(&self) -> Rank {
        self.rank
    }

    fn connect(&self, peers: &[Rank]) -> Result<Vec<MemChannel>, ReplicaError> {
        Ok(peers.iter().map(|&peer| MemChannel { peer }).collect())
    }

    fn isend(
        &self,
        chan: &MemChannel,
        tag: u16,
        buf: &[u8],
    ) -> Result<MemSendToken, ReplicaError> {
        self.net
            .mail
            .entry((self.rank, chan.peer, tag))
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
        Ok(MemSendToken)
    }

    fn irecv(
        &self,
        chan: &MemChannel,
        tag: u16,
        len: usize,
    ) -> Result<MemRecvToken, ReplicaError> {
        Ok(MemRecvToken {
            key: (chan.peer, self.rank, tag),
            len,
            data: None,
        })
    }

    fn poll_send(&self, _tok: &mut MemSendToken) -> CommPoll {
        // Mailbox delivery is buffered; a send completes as soon as posted.
        CommPoll::Ready
    }

    fn poll_recv(&self, tok: &mut MemRecvToken) -> CommPoll {
        if tok.data.is_some() {
            return CommPoll::Ready;
        }
        if let Some(mut queue) = self.net.mail.get_mut(&tok.key) {
            if let Some(msg) = queue.pop_front() {
                tok.data = Some(msg);
                return CommPoll::Ready;
            }
        }
        CommPoll::Pending
    }

    fn complete_recv(&self, tok: MemRecvToken) -> Result<Vec<u8>, ReplicaError> {
        let data = tok.data.ok_or_else(|| {
            ReplicaError::Transport("receive completed before it was ready".into())
        })?;
        if data.len() != tok.len {
            return Err(ReplicaError::Transport(format!(
                "message of {} bytes does not match posted receive of {} bytes",
                data.len(),
                tok.len
            )));
        }
        Ok(data.to_vec())
    }
}
