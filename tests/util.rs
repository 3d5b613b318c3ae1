//! Shared helpers for the integration tests: mirrored two-rank coupling
//! sources and paired registries over one in-memory transport world.
#![allow(dead_code)]

use mesh_replica::prelude::*;

/// One object replicated between rank 0 and rank 1:
/// `(gid, attr, priority on rank 0, priority on rank 1)`.
pub type MirrorSpec = (u64, u32, u8, u8);

/// Build the two ranks' coupling sources for a set of mirrored objects.
/// Each side stores the object at its own slot with its own priority and a
/// copy on the opposite rank carrying the opposite priority.
pub fn mirrored_pair(specs: &[MirrorSpec]) -> [InMemoryCouplings; 2] {
    let mut r0 = InMemoryCouplings::new();
    let mut r1 = InMemoryCouplings::new();
    for (slot, &(gid, attr, p0, p1)) in specs.iter().enumerate() {
        let gid = GlobalId::new(gid).unwrap();
        let i = r0.add_object(ObjectRef::new(
            slot as u32,
            ObjectType(0),
            Priority(p0),
            Attr(attr),
            gid,
        ));
        r0.add_copy(i, 1, Priority(p1)).unwrap();
        let j = r1.add_object(ObjectRef::new(
            slot as u32,
            ObjectType(0),
            Priority(p1),
            Attr(attr),
            gid,
        ));
        r1.add_copy(j, 0, Priority(p0)).unwrap();
    }
    [r0, r1]
}

/// One registry per simulated rank over a shared two-rank transport world.
pub fn pair_registries(cfg: CommConfig) -> [InterfaceRegistry<MemTransport>; 2] {
    let mut world = MemTransport::world(2);
    let t1 = world.pop().unwrap();
    let t0 = world.pop().unwrap();
    [
        InterfaceRegistry::new(t0, cfg.clone()),
        InterfaceRegistry::new(t1, cfg),
    ]
}

/// Define the conventional test interface: type 0, set A = {1}, set B = {2}.
pub fn define_ab(
    reg: &mut InterfaceRegistry<MemTransport>,
    src: &InMemoryCouplings,
) -> InterfaceId {
    reg.define(src, &[ObjectType(0)], &[Priority(1)], &[Priority(2)])
        .unwrap()
}

/// Canonical scenario: 10 objects with one replica each on the other rank;
/// 6 outgoing from rank 0, 4 incoming, none both-direction.
pub fn six_four_specs() -> Vec<MirrorSpec> {
    let mut specs = Vec::new();
    for gid in 1..=6u64 {
        specs.push((gid, 0, 1, 2)); // rank 0 in A, rank 1 in B -> outgoing
    }
    for gid in 7..=10u64 {
        specs.push((gid, 0, 2, 1)); // the reverse -> incoming
    }
    specs
}

/// Gid sequence of one direction class of one partner.
pub fn class_gids(
    reg: &InterfaceRegistry<MemTransport>,
    ifc: InterfaceId,
    rank: Rank,
    dir: Direction,
) -> Vec<u64> {
    let inst = reg.interface(ifc).unwrap();
    let p = inst.partner(rank).expect("partner missing");
    inst.cpl[p.dir[dir.index()].as_range()]
        .iter()
        .map(|c| c.gid.get())
        .collect()
}
