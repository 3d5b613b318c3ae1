//! ReplicaError: unified error type for mesh-replica public APIs.
//!
//! Every fallible operation in the crate reports through this enum. The
//! communication-layer variants (`CommTimeout`, `CommError`, `Transport`) are
//! fatal for a batch HPC run: the caller is expected to log and terminate, not
//! to retry. Consistency-check results are *not* errors; the checker returns
//! a mismatch count instead (see [`crate::check`]).

use thiserror::Error;

use crate::coupling::Rank;
use crate::registry::InterfaceId;

/// Unified error type for mesh-replica operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReplicaError {
    /// The bounded interface registry has no free slot left.
    #[error("interface registry is full ({capacity} definitions); raise CommConfig::max_interfaces")]
    RegistryFull { capacity: usize },
    /// An interface definition needs at least one priority on each side.
    #[error("interface definition rejected: priority sets A and B must both be non-empty")]
    EmptyPrioritySet,
    /// Object type ids must fit the 64-bit membership mask.
    #[error("object type {0} out of range (at most {max} object types)", max = crate::coupling::MAX_OBJECT_TYPES)]
    TypeOutOfRange(u8),
    /// Lookup with an id the registry never handed out.
    #[error("no interface with id {0}")]
    UnknownInterface(InterfaceId),
    /// Attempted to construct a GlobalId with the reserved zero value.
    #[error("global id must be non-zero (0 is reserved as invalid/sentinel)")]
    InvalidGlobalId,
    /// A replica may exist at most once per (object, rank) pair.
    #[error("object {gid} already has a replica on rank {rank}")]
    DuplicateReplica { gid: u64, rank: Rank },
    /// A partner block without a channel means the interface was never
    /// rebuilt after the transport topology changed.
    #[error("no channel to rank {0}; interface was not rebuilt after a topology change")]
    MissingChannel(Rank),
    /// The bounded poll loop ran out of rounds with operations still in
    /// flight. Fatal: there is no retry-with-backoff and no partial result.
    #[error(
        "communication timeout on interface {interface} during {context}: \
         {pending} operation(s) still pending after {rounds} poll round(s)"
    )]
    CommTimeout {
        interface: InterfaceId,
        context: &'static str,
        pending: usize,
        rounds: usize,
    },
    /// A send or receive to one partner failed outright.
    #[error("communication with rank {partner} failed: {detail}")]
    CommError { partner: Rank, detail: String },
    /// A completed receive carried the wrong number of bytes. Both ends must
    /// have rebuilt the same interface from the same coupling set; a size
    /// mismatch means they did not.
    #[error("received {got} bytes from rank {partner}, expected {expected}")]
    PayloadSize {
        partner: Rank,
        got: usize,
        expected: usize,
    },
    /// Fault raised by the transport backend itself.
    #[error("transport error: {0}")]
    Transport(String),
    /// Fault raised by the notify-handshake backend.
    #[error("notify handshake failed: {0}")]
    Notify(String),
    /// An internal structural invariant does not hold (see
    /// `InterfaceInstance::validate_invariants`).
    #[error("interface invariant violated: {0}")]
    Invariant(String),
}
