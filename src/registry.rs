//! Process-wide interface registry.
//!
//! One [`InterfaceRegistry`] exists per process, created at startup and torn
//! down at shutdown. It is passed explicitly wherever it is needed so tests
//! can run several independent registries (one per simulated rank) side by
//! side.

use std::fmt;
use std::fmt::Write as _;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::build::{self, InterfaceInstance, PartnerBlock};
use crate::coupling::{CouplingSource, Direction, ObjectType, Priority, Rank};
use crate::pool::DescriptorPool;
use crate::replica_error::ReplicaError;
use crate::transport::Transport;

/// Interface names are truncated to this many bytes.
pub const IF_NAME_MAX: usize = 80;

/// Stable handle to one interface definition.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct InterfaceId(pub(crate) u16);

impl InterfaceId {
    /// The pre-registered interface covering all types and all priorities.
    pub const STANDARD: InterfaceId = InterfaceId(0);

    pub const fn get(self) -> u16 {
        self.0
    }

    /// Message tag of this interface; one tag per interface keeps episodes
    /// on different interfaces from crossing on a shared transport.
    pub(crate) const fn tag(self) -> u16 {
        self.0
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deduplicated, sorted priority set with binary-search membership.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrioritySet(Vec<Priority>);

impl PrioritySet {
    pub fn new(prios: &[Priority]) -> Self {
        let mut v = prios.to_vec();
        v.sort_unstable();
        v.dedup();
        PrioritySet(v)
    }

    #[inline]
    pub fn contains(&self, p: Priority) -> bool {
        self.0.binary_search(&p).is_ok()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Priority> + '_ {
        self.0.iter().copied()
    }
}

/// Bitmask over object types for O(1) membership checks.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct TypeMask(u64);

impl TypeMask {
    pub const ALL: TypeMask = TypeMask(u64::MAX);

    /// # Errors
    /// `TypeOutOfRange` if any type id does not fit the mask.
    pub fn new(types: &[ObjectType]) -> Result<Self, ReplicaError> {
        let mut mask = 0u64;
        for t in types {
            if t.0 as usize >= crate::coupling::MAX_OBJECT_TYPES {
                return Err(ReplicaError::TypeOutOfRange(t.0));
            }
            mask |= 1u64 << t.0;
        }
        Ok(TypeMask(mask))
    }

    #[inline]
    pub fn contains(&self, t: ObjectType) -> bool {
        (t.0 as usize) < crate::coupling::MAX_OBJECT_TYPES && self.0 & (1u64 << t.0) != 0
    }
}

/// Immutable classification of one interface (only the name may change).
#[derive(Clone, Debug)]
pub struct InterfaceDef {
    pub types: TypeMask,
    pub set_a: PrioritySet,
    pub set_b: PrioritySet,
    pub(crate) name: String,
    /// The built-in all-objects interface bypasses A/B partitioning.
    pub(crate) standard: bool,
}

impl InterfaceDef {
    fn standard() -> Self {
        InterfaceDef {
            types: TypeMask::ALL,
            set_a: PrioritySet::default(),
            set_b: PrioritySet::default(),
            name: "standard".into(),
            standard: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_standard(&self) -> bool {
        self.standard
    }
}

/// Tunables of the communication layer.
#[derive(Clone, Debug)]
pub struct CommConfig {
    /// Maximum poll passes over outstanding operations before the fatal
    /// communication timeout. Tests set this small.
    pub poll_limit: usize,
    /// Keep per-partner message buffers alive across episodes.
    pub reuse_buffers: bool,
    /// Capacity of the interface registry.
    pub max_interfaces: usize,
}

impl Default for CommConfig {
    fn default() -> Self {
        Self {
            poll_limit: 500_000,
            reuse_buffers: false,
            max_interfaces: 32,
        }
    }
}

pub(crate) struct InterfaceSlot<Ch> {
    pub(crate) def: InterfaceDef,
    pub(crate) inst: InterfaceInstance<Ch>,
}

/// The process-wide table of interface definitions plus everything the
/// communication layer needs: the transport, the config, and the descriptor
/// pool shared across all interfaces' rebuilds.
pub struct InterfaceRegistry<T: Transport> {
    transport: T,
    cfg: CommConfig,
    slots: Vec<InterfaceSlot<T::Channel>>,
    pool: DescriptorPool<PartnerBlock<T::Channel>>,
}

impl<T: Transport> InterfaceRegistry<T> {
    /// Create the registry with the standard interface pre-registered in
    /// slot 0. The standard interface is empty until the first rebuild.
    pub fn new(transport: T, cfg: CommConfig) -> Self {
        InterfaceRegistry {
            transport,
            cfg,
            slots: vec![InterfaceSlot {
                def: InterfaceDef::standard(),
                inst: InterfaceInstance::default(),
            }],
            pool: DescriptorPool::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &CommConfig {
        &self.cfg
    }

    pub fn rank(&self) -> Rank {
        self.transport.rank()
    }

    pub fn interface_count(&self) -> usize {
        self.slots.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = InterfaceId> + '_ {
        (0..self.slots.len()).map(|i| InterfaceId(i as u16))
    }

    /// Register a new interface and build it from `source`.
    ///
    /// Membership: objects whose type is in `types` and whose priority falls
    /// into set A and/or set B; a coupling qualifies when the remote
    /// replica's priority lands in the opposite set (see [`crate::build`]).
    ///
    /// # Errors
    /// `RegistryFull` when the bounded table has no free slot (a fatal
    /// configuration error), `EmptyPrioritySet`/`TypeOutOfRange` on an
    /// invalid definition.
    pub fn define<S>(
        &mut self,
        source: &S,
        types: &[ObjectType],
        set_a: &[Priority],
        set_b: &[Priority],
    ) -> Result<InterfaceId, ReplicaError>
    where
        S: CouplingSource + ?Sized,
    {
        if self.slots.len() >= self.cfg.max_interfaces {
            let err = ReplicaError::RegistryFull {
                capacity: self.cfg.max_interfaces,
            };
            log::error!("{err}");
            return Err(err);
        }
        if set_a.is_empty() || set_b.is_empty() {
            let err = ReplicaError::EmptyPrioritySet;
            log::error!("{err}");
            return Err(err);
        }
        let def = InterfaceDef {
            types: TypeMask::new(types)?,
            set_a: PrioritySet::new(set_a),
            set_b: PrioritySet::new(set_b),
            name: String::new(),
            standard: false,
        };
        let id = InterfaceId(self.slots.len() as u16);
        self.slots.push(InterfaceSlot {
            def,
            inst: InterfaceInstance::default(),
        });
        self.rebuild(source, id)?;
        Ok(id)
    }

    /// Attach a display name, truncated to [`IF_NAME_MAX`] bytes.
    pub fn set_name(&mut self, ifc: InterfaceId, name: &str) -> Result<(), ReplicaError> {
        let slot = self.slot_mut(ifc)?;
        slot.def.name = truncate_name(name);
        Ok(())
    }

    pub fn name(&self, ifc: InterfaceId) -> Result<&str, ReplicaError> {
        Ok(self.slot(ifc)?.def.name())
    }

    pub fn definition(&self, ifc: InterfaceId) -> Result<&InterfaceDef, ReplicaError> {
        Ok(&self.slot(ifc)?.def)
    }

    pub fn interface(
        &self,
        ifc: InterfaceId,
    ) -> Result<&InterfaceInstance<T::Channel>, ReplicaError> {
        Ok(&self.slot(ifc)?.inst)
    }

    /// Rebuild one interface from the coupling source.
    pub fn rebuild<S>(&mut self, source: &S, ifc: InterfaceId) -> Result<(), ReplicaError>
    where
        S: CouplingSource + ?Sized,
    {
        let slot = self
            .slots
            .get_mut(ifc.0 as usize)
            .ok_or(ReplicaError::UnknownInterface(ifc))?;
        build::rebuild(&slot.def, &mut slot.inst, source, &self.transport, &mut self.pool)
    }

    /// Rebuild every interface. The single entry point to call after any
    /// operation that changed object population, type, priority, or
    /// attribute.
    pub fn rebuild_all<S>(&mut self, source: &S) -> Result<(), ReplicaError>
    where
        S: CouplingSource + ?Sized,
    {
        for i in 0..self.slots.len() {
            self.rebuild(source, InterfaceId(i as u16))?;
        }
        Ok(())
    }

    /// Object storage for `type_id` may have moved: mark every interface
    /// whose type set includes it as stale. Lazy: the shortcut arrays are
    /// repaired by the next pattern call on each interface.
    pub fn invalidate_objects(&mut self, type_id: ObjectType) {
        for slot in &mut self.slots {
            if !slot.def.standard && slot.def.types.contains(type_id) {
                slot.inst.invalidate_shortcuts();
            }
        }
    }

    /// Render one interface: per partner the three direction-class counts,
    /// optionally broken out per attribute.
    pub fn display(&self, ifc: InterfaceId, with_attrs: bool) -> Result<String, ReplicaError> {
        let slot = self.slot(ifc)?;
        let mut out = String::new();
        let name = if slot.def.name.is_empty() {
            "<unnamed>"
        } else {
            slot.def.name()
        };
        let sets = if slot.def.standard {
            "A=* B=*".to_owned()
        } else {
            format!(
                "A={{{}}} B={{{}}}",
                slot.def.set_a.iter().join(","),
                slot.def.set_b.iter().join(",")
            )
        };
        let _ = writeln!(
            out,
            "interface {ifc} '{name}' {sets}: {} item(s), {} partner(s)",
            slot.inst.item_count(),
            slot.inst.partner_count()
        );
        for p in &slot.inst.partners {
            let _ = writeln!(
                out,
                "  partner {}: {} out, {} in, {} both ({} total)",
                p.rank,
                p.dir[Direction::Outgoing.index()].len,
                p.dir[Direction::Incoming.index()].len,
                p.dir[Direction::Both.index()].len,
                p.item_count()
            );
            if with_attrs {
                for blk in &p.attrs {
                    let _ = writeln!(
                        out,
                        "    attr {}: {} out, {} in, {} both",
                        blk.attr,
                        blk.dir[Direction::Outgoing.index()].len,
                        blk.dir[Direction::Incoming.index()].len,
                        blk.dir[Direction::Both.index()].len
                    );
                }
            }
        }
        Ok(out)
    }

    /// Render every registered interface.
    pub fn display_all(&self, with_attrs: bool) -> String {
        let mut out = String::new();
        for id in self.ids() {
            match self.display(id, with_attrs) {
                Ok(s) => out.push_str(&s),
                Err(_) => unreachable!("ids() only yields registered interfaces"),
            }
        }
        out
    }

    pub(crate) fn slot(&self, ifc: InterfaceId) -> Result<&InterfaceSlot<T::Channel>, ReplicaError> {
        self.slots
            .get(ifc.0 as usize)
            .ok_or(ReplicaError::UnknownInterface(ifc))
    }

    pub(crate) fn slot_mut(
        &mut self,
        ifc: InterfaceId,
    ) -> Result<&mut InterfaceSlot<T::Channel>, ReplicaError> {
        self.slots
            .get_mut(ifc.0 as usize)
            .ok_or(ReplicaError::UnknownInterface(ifc))
    }

    /// Split borrow used by the pattern layer: the slot table mutably, the
    /// transport and config shared.
    pub(crate) fn parts(
        &mut self,
    ) -> (
        &mut Vec<InterfaceSlot<T::Channel>>,
        &T,
        &CommConfig,
    ) {
        (&mut self.slots, &self.transport, &self.cfg)
    }
}

fn truncate_name(name: &str) -> String {
    if name.len() <= IF_NAME_MAX {
        return name.to_owned();
    }
    let mut end = IF_NAME_MAX;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_owned()
}
