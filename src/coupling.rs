//! Identity types and coupling records shared between the interface
//! subsystem and the object/coupling registry that feeds it.
//!
//! The registry itself lives outside this crate; [`CouplingSource`] is the
//! contract it must satisfy. [`InMemoryCouplings`] is a plain in-memory
//! implementation used by tests and simulated multi-rank setups.

use std::fmt;
use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

use crate::replica_error::ReplicaError;

/// Rank of a cooperating process.
pub type Rank = usize;

/// Upper bound on distinct object types; membership tests use a `u64` mask.
pub const MAX_OBJECT_TYPES: usize = 64;

/// Object type id, `< MAX_OBJECT_TYPES`.
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize,
)]
pub struct ObjectType(pub u8);

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Replica priority. Interface membership and transfer direction are decided
/// by which priority set (A or B) a replica's priority falls into.
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize,
)]
pub struct Priority(pub u8);

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User-assigned tag further partitioning an interface within one partner.
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Default, Serialize, Deserialize,
)]
pub struct Attr(pub u32);

impl fmt::Display for Attr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Globally unique object id. 0 is reserved as invalid/sentinel.
///
/// Global ids exist for deterministic ordering only and are never used to
/// address an object. Every replica of an object carries the same id.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct GlobalId(NonZeroU64);

impl GlobalId {
    /// # Errors
    /// Returns `Err(InvalidGlobalId)` if `raw == 0`.
    #[inline]
    pub fn new(raw: u64) -> Result<Self, ReplicaError> {
        NonZeroU64::new(raw)
            .map(GlobalId)
            .ok_or(ReplicaError::InvalidGlobalId)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GlobalId").field(&self.get()).finish()
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// Cheap, copyable handle to one replicated object.
///
/// `slot` is the object's *current* storage slot and goes stale whenever the
/// owning registry compacts or moves object storage for that type; the
/// shortcut cache exists to re-resolve it lazily. Everything else is stable
/// for the object's lifetime.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Current storage slot; volatile under compaction.
    pub slot: u32,
    pub type_id: ObjectType,
    pub prio: Priority,
    pub attr: Attr,
    pub gid: GlobalId,
}

impl ObjectRef {
    pub fn new(slot: u32, type_id: ObjectType, prio: Priority, attr: Attr, gid: GlobalId) -> Self {
        Self {
            slot,
            type_id,
            prio,
            attr,
            gid,
        }
    }
}

/// One remote replica of a local object.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct RemoteCopy {
    pub rank: Rank,
    pub prio: Priority,
}

/// Direction class of a coupling.
///
/// The declaration order is load-bearing: `Outgoing < Incoming < Both` is
/// part of the cross-process sort contract (see [`crate::build`]).
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize,
)]
pub enum Direction {
    /// Local object in set A, remote replica in set B.
    Outgoing = 0,
    /// Local object in set B, remote replica in set A.
    Incoming = 1,
    /// Both of the above hold at once.
    Both = 2,
}

impl Direction {
    pub const COUNT: usize = 3;
    pub const ALL: [Direction; 3] = [Direction::Outgoing, Direction::Incoming, Direction::Both];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Outgoing => "out",
            Direction::Incoming => "in",
            Direction::Both => "both",
        };
        f.write_str(s)
    }
}

/// A (local object, remote replica) pair plus its computed direction.
///
/// Couplings are built by the interface builder from [`CouplingSource`] data;
/// the source never supplies direction flags.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Coupling {
    /// Stable index of the owning object in the coupling source.
    pub obj: usize,
    pub gid: GlobalId,
    pub attr: Attr,
    /// Rank holding the remote replica.
    pub rank: Rank,
    /// Priority of the remote replica.
    pub prio: Priority,
    pub dir: Direction,
}

/// Contract the external object/coupling registry must satisfy.
///
/// Objects are addressed by a stable index in `0..object_count()`; the index
/// survives storage compaction even though [`ObjectRef::slot`] does not.
pub trait CouplingSource {
    fn object_count(&self) -> usize;

    /// Total number of (object, remote replica) pairs across all objects.
    fn coupling_count(&self) -> usize;

    /// Resolve the current handle for the object at `index`.
    ///
    /// # Panics
    /// Implementations may panic on an out-of-range index; the builder only
    /// passes indices below `object_count()`.
    fn object(&self, index: usize) -> ObjectRef;

    /// All remote replicas of the object at `index`.
    fn copies_of(&self, index: usize) -> &[RemoteCopy];
}

/// Plain in-memory coupling registry for tests and simulated ranks.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCouplings {
    objects: Vec<ObjectRef>,
    copies: Vec<Vec<RemoteCopy>>,
    n_couplings: usize,
}

impl InMemoryCouplings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a local object; returns its stable index.
    pub fn add_object(&mut self, obj: ObjectRef) -> usize {
        self.objects.push(obj);
        self.copies.push(Vec::new());
        self.objects.len() - 1
    }

    /// Record a remote replica of the object at `index`.
    ///
    /// # Errors
    /// Returns `Err(DuplicateReplica)` if that rank already holds a replica
    /// of this object; a replica exists at most once per (object, rank).
    pub fn add_copy(&mut self, index: usize, rank: Rank, prio: Priority) -> Result<(), ReplicaError> {
        let copies = &mut self.copies[index];
        if copies.iter().any(|c| c.rank == rank) {
            return Err(ReplicaError::DuplicateReplica {
                gid: self.objects[index].gid.get(),
                rank,
            });
        }
        copies.push(RemoteCopy { rank, prio });
        self.n_couplings += 1;
        Ok(())
    }

    /// Simulate storage compaction: move the object at `index` to a new slot.
    /// Interfaces holding shortcuts to it must be invalidated afterwards.
    pub fn set_slot(&mut self, index: usize, slot: u32) {
        self.objects[index].slot = slot;
    }
}

impl CouplingSource for InMemoryCouplings {
    fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn coupling_count(&self) -> usize {
        self.n_couplings
    }

    fn object(&self, index: usize) -> ObjectRef {
        self.objects[index]
    }

    fn copies_of(&self, index: usize) -> &[RemoteCopy] {
        &self.copies[index]
    }
}
