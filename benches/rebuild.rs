//! Rebuild hot path: qualify + sort + partition + shortcut recompute over a
//! synthetic multi-rank coupling set.

use criterion::{Criterion, criterion_group, criterion_main};
use mesh_replica::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn synthetic_source(objects: u64) -> InMemoryCouplings {
    let mut rng = SmallRng::seed_from_u64(42);
    let mut src = InMemoryCouplings::new();
    for gid in 1..=objects {
        let i = src.add_object(ObjectRef::new(
            gid as u32,
            ObjectType(0),
            Priority(rng.gen_range(1..=3)),
            Attr(rng.gen_range(0..8)),
            GlobalId::new(gid).unwrap(),
        ));
        for rank in 1..=7usize {
            if rng.gen_bool(0.25) {
                src.add_copy(i, rank, Priority(rng.gen_range(1..=3))).unwrap();
            }
        }
    }
    src
}

fn bench_rebuild(c: &mut Criterion) {
    let src = synthetic_source(10_000);
    let transport = MemTransport::world(8).remove(0);
    let mut reg = InterfaceRegistry::new(transport, CommConfig::default());
    reg.define(
        &src,
        &[ObjectType(0)],
        &[Priority(1), Priority(3)],
        &[Priority(2), Priority(3)],
    )
    .unwrap();

    c.bench_function("rebuild_all_10k_objects", |b| {
        b.iter(|| reg.rebuild_all(&src).unwrap())
    });
}

criterion_group!(benches, bench_rebuild);
criterion_main!(benches);
