//! # mesh-replica
//!
//! mesh-replica is the replica-interface layer of a distributed
//! finite-element/multigrid framework. It tracks which objects are
//! replicated between which pairs of cooperating processes, classifies the
//! resulting couplings into per-partner, per-direction, per-attribute groups
//! (deterministically and identically on both ends of every pair, with no
//! extra coordination) and drives bulk non-blocking communication over
//! those groups.
//!
//! ## Features
//! - Bounded, explicit [`registry::InterfaceRegistry`] of interface
//!   definitions (type set + two priority sets), with a built-in standard
//!   interface covering every replica
//! - Deterministic coupling partitioning: payloads correlate purely by
//!   position, the wire format carries no index metadata
//! - Lazily repaired object-shortcut cache for hot communication loops
//! - Exchange / oneway / attribute-restricted / local-exec / extended
//!   communication patterns over one shared episode engine
//! - Pluggable transport and notify backends (in-memory worlds for simulated
//!   multi-rank tests; MPI-class backends live with the application)
//! - Cross-process consistency checker for interface shape
//!
//! ## Determinism
//!
//! Rebuilding an interface from the same coupling set always yields
//! byte-identical coupling/shortcut arrays and identical partner boundaries;
//! the canonical sort in [`build`] is the sole correlation mechanism between
//! ranks and is covered by property-based tests.
//!
//! ## Usage
//! ```toml
//! [dependencies]
//! mesh-replica = "0.2"
//! ```

pub mod build;
pub mod coupling;
pub mod notify;
pub mod patterns;
pub mod pool;
pub mod registry;
pub mod replica_error;
pub mod transport;
pub mod wire;

mod check;
mod engine;

/// A convenient prelude to import the most-used traits & types.
pub mod prelude {
    pub use crate::build::{AttrBlock, InterfaceInstance, PartnerBlock, SubRange};
    pub use crate::coupling::{
        Attr, Coupling, CouplingSource, Direction, GlobalId, InMemoryCouplings, ObjectRef,
        ObjectType, Priority, Rank, RemoteCopy,
    };
    pub use crate::notify::{MemNotify, NotifyService, SizeAnnouncement};
    pub use crate::patterns::Sweep;
    pub use crate::registry::{CommConfig, InterfaceId, InterfaceRegistry, PrioritySet, TypeMask};
    pub use crate::replica_error::ReplicaError;
    pub use crate::transport::{CommPoll, MemTransport, Transport};
}
