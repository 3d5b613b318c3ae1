//! Pattern behavior over a simulated two-rank world: exchange round trips,
//! oneway subsets, attribute restriction, local exec, extended callbacks.

mod util;

use std::thread;

use mesh_replica::prelude::*;
use mesh_replica::wire::WireU64;
use util::{define_ab, mirrored_pair, pair_registries, six_four_specs};

const ITEM: usize = WireU64::SIZE;

/// Encode "gid tagged with the gathering rank" so a scatter can tell whose
/// gather produced the value it received.
fn tagged(gid: u64, rank: usize) -> u64 {
    gid * 10 + rank as u64
}

fn gather_tagged(rank: usize) -> impl FnMut(&ObjectRef, &mut [u8]) {
    move |o, buf| WireU64::of(tagged(o.gid.get(), rank)).write(buf)
}

/// Run `f` once per rank on its own thread and return both results.
fn on_both_ranks<F, R>(
    regs: [InterfaceRegistry<MemTransport>; 2],
    srcs: [InMemoryCouplings; 2],
    f: F,
) -> [R; 2]
where
    F: Fn(usize, InterfaceRegistry<MemTransport>, InMemoryCouplings) -> R + Sync,
    R: Send,
{
    let [reg0, reg1] = regs;
    let [src0, src1] = srcs;
    let fr = &f;
    thread::scope(|s| {
        let h0 = s.spawn(move || fr(0, reg0, src0));
        let h1 = s.spawn(move || fr(1, reg1, src1));
        [h0.join().unwrap(), h1.join().unwrap()]
    })
}

#[test]
fn exchange_moves_every_item_both_ways() {
    let srcs = mirrored_pair(&six_four_specs());
    let regs = pair_registries(CommConfig::default());

    let results = on_both_ranks(regs, srcs, |rank, mut reg, src| {
        let ifc = define_ab(&mut reg, &src);
        let mut received = Vec::new();
        reg.exchange(&src, ifc, ITEM, gather_tagged(rank), |o: &ObjectRef, buf: &[u8]| {
            received.push((o.gid.get(), WireU64::read(buf).get()));
        })
        .unwrap();
        received
    });

    // 10 items × ITEM bytes each way; every item scattered exactly once,
    // carrying the value the *other* side gathered for the same gid
    for (rank, received) in results.iter().enumerate() {
        assert_eq!(received.len(), 10);
        let peer = 1 - rank;
        for &(gid, value) in received {
            assert_eq!(value, tagged(gid, peer));
        }
    }
}

#[test]
fn oneway_forward_moves_outgoing_items_only() {
    let srcs = mirrored_pair(&six_four_specs());
    let regs = pair_registries(CommConfig::default());

    let results = on_both_ranks(regs, srcs, |rank, mut reg, src| {
        let ifc = define_ab(&mut reg, &src);
        let mut received = Vec::new();
        reg.oneway(
            &src,
            ifc,
            Sweep::Forward,
            ITEM,
            gather_tagged(rank),
            |o: &ObjectRef, buf: &[u8]| {
                received.push((o.gid.get(), WireU64::read(buf).get()));
            },
        )
        .unwrap();
        received
    });

    // rank 0 has 6 outgoing / 4 incoming; forward delivers into the
    // incoming class, so rank 0 scatters 4 items and rank 1 scatters 6
    assert_eq!(results[0].len(), 4);
    assert_eq!(results[1].len(), 6);
    for (rank, received) in results.iter().enumerate() {
        let peer = 1 - rank;
        for &(gid, value) in received {
            assert_eq!(value, tagged(gid, peer));
        }
    }
}

#[test]
fn oneway_backward_reverses_the_flow() {
    let srcs = mirrored_pair(&six_four_specs());
    let regs = pair_registries(CommConfig::default());

    let results = on_both_ranks(regs, srcs, |rank, mut reg, src| {
        let ifc = define_ab(&mut reg, &src);
        let mut n = 0usize;
        reg.oneway(
            &src,
            ifc,
            Sweep::Backward,
            ITEM,
            gather_tagged(rank),
            |_: &ObjectRef, _: &[u8]| n += 1,
        )
        .unwrap();
        n
    });
    assert_eq!(results, [6, 4]);
}

#[test]
fn attr_exchange_touches_one_bucket() {
    // attrs 3 and 8; one incoming item in each bucket for rank 0
    let srcs = mirrored_pair(&[
        (1, 3, 1, 2),
        (2, 3, 1, 2),
        (3, 3, 2, 1),
        (4, 8, 1, 2),
        (5, 8, 2, 1),
    ]);
    let regs = pair_registries(CommConfig::default());

    let results = on_both_ranks(regs, srcs, |rank, mut reg, src| {
        let ifc = define_ab(&mut reg, &src);
        let mut received = Vec::new();
        reg.exchange_attr(
            &src,
            ifc,
            Attr(3),
            ITEM,
            gather_tagged(rank),
            |o: &ObjectRef, buf: &[u8]| {
                received.push((o.gid.get(), WireU64::read(buf).get()));
            },
        )
        .unwrap();
        received
    });

    for (rank, received) in results.iter().enumerate() {
        let peer = 1 - rank;
        assert_eq!(received.len(), 3, "only the attr-3 bucket moves");
        for &(gid, value) in received {
            assert!(gid <= 3);
            assert_eq!(value, tagged(gid, peer));
        }
    }
}

#[test]
fn missing_attr_skips_partner_silently() {
    let srcs = mirrored_pair(&six_four_specs()); // all attr 0
    let regs = pair_registries(CommConfig::default());

    let results = on_both_ranks(regs, srcs, |_rank, mut reg, src| {
        let ifc = define_ab(&mut reg, &src);
        let n = std::cell::Cell::new(0usize);
        reg.exchange_attr(
            &src,
            ifc,
            Attr(42),
            ITEM,
            |_: &ObjectRef, _: &mut [u8]| n.set(n.get() + 1),
            |_: &ObjectRef, _: &[u8]| n.set(n.get() + 1),
        )
        .unwrap();
        n.get()
    });
    assert_eq!(results, [0, 0]);
}

#[test]
fn extended_exchange_exposes_remote_identity() {
    let srcs = mirrored_pair(&six_four_specs());
    let regs = pair_registries(CommConfig::default());

    let results = on_both_ranks(regs, srcs, |rank, mut reg, src| {
        let ifc = define_ab(&mut reg, &src);
        let mut seen = Vec::new();
        reg.exchange_ext(
            ifc,
            ITEM,
            |c: &Coupling, r: Rank, p: Priority, buf: &mut [u8]| {
                WireU64::of(tagged(c.gid.get(), rank)).write(buf);
                assert_eq!(r, 1 - rank);
                assert_eq!(p, c.prio);
            },
            |c: &Coupling, r: Rank, _p: Priority, buf: &[u8]| {
                assert_eq!(r, 1 - rank);
                seen.push((c.gid.get(), WireU64::read(buf).get()));
            },
        )
        .unwrap();
        seen
    });

    for (rank, seen) in results.iter().enumerate() {
        assert_eq!(seen.len(), 10);
        for &(gid, value) in seen {
            assert_eq!(value, tagged(gid, 1 - rank));
        }
    }
}

#[test]
fn exec_local_visits_every_shortcut_in_coupling_order() {
    let [src, _] = mirrored_pair(&[(1, 2, 1, 2), (2, 9, 1, 2), (3, 9, 2, 1)]);
    let [mut reg, _] = pair_registries(CommConfig::default());
    let ifc = define_ab(&mut reg, &src);

    let mut gids = Vec::new();
    reg.exec_local(&src, ifc, |o| gids.push(o.gid.get())).unwrap();
    // outgoing first (attr 9 before attr 2), then incoming
    assert_eq!(gids, vec![2, 1, 3]);

    let mut gids = Vec::new();
    reg.exec_local_attr(&src, ifc, Attr(9), |o| gids.push(o.gid.get()))
        .unwrap();
    assert_eq!(gids, vec![2, 3]);

    let mut remote = Vec::new();
    reg.exec_local_ext(ifc, |c, r, p| remote.push((c.gid.get(), r, p.0)))
        .unwrap();
    assert_eq!(remote, vec![(2, 1, 2), (1, 1, 2), (3, 1, 1)]);
}

#[test]
fn buffer_reuse_policy_survives_repeated_episodes() {
    let srcs = mirrored_pair(&six_four_specs());
    let cfg = CommConfig {
        reuse_buffers: true,
        ..CommConfig::default()
    };
    let regs = pair_registries(cfg);

    let results = on_both_ranks(regs, srcs, |rank, mut reg, src| {
        let ifc = define_ab(&mut reg, &src);
        let mut total = 0usize;
        for _ in 0..3 {
            reg.exchange(&src, ifc, ITEM, gather_tagged(rank), |_: &ObjectRef, _: &[u8]| {
                total += 1;
            })
            .unwrap();
        }
        total
    });
    assert_eq!(results, [30, 30]);
}

#[test]
fn exchange_over_standard_interface_moves_everything() {
    // priority 5 belongs to no custom set; the standard interface still
    // exchanges it
    let srcs = mirrored_pair(&[(1, 0, 5, 5), (2, 0, 5, 5)]);
    let regs = pair_registries(CommConfig::default());

    let results = on_both_ranks(regs, srcs, |rank, mut reg, src| {
        reg.rebuild_all(&src).unwrap();
        let mut received = Vec::new();
        reg.exchange(
            &src,
            InterfaceId::STANDARD,
            ITEM,
            gather_tagged(rank),
            |o: &ObjectRef, buf: &[u8]| {
                received.push((o.gid.get(), WireU64::read(buf).get()));
            },
        )
        .unwrap();
        received
    });

    for (rank, received) in results.iter().enumerate() {
        assert_eq!(received.len(), 2);
        for &(gid, value) in received {
            assert_eq!(value, tagged(gid, 1 - rank));
        }
    }
}
