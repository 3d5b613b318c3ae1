//! Consistency checker over a simulated pair: symmetric interfaces pass,
//! size and partner-set asymmetries are counted but never fatal.

mod util;

use std::thread;

use mesh_replica::prelude::*;
use util::{define_ab, mirrored_pair, pair_registries, six_four_specs};

fn check_on_both(
    regs: [InterfaceRegistry<MemTransport>; 2],
    srcs: [InMemoryCouplings; 2],
    define: [bool; 2],
) -> [usize; 2] {
    let mut notify = MemNotify::world(2);
    let n1 = notify.pop().unwrap();
    let n0 = notify.pop().unwrap();
    let [reg0, reg1] = regs;
    let [src0, src1] = srcs;

    thread::scope(|s| {
        let h0 = s.spawn(move || {
            let mut reg = reg0;
            let ifc = if define[0] {
                define_ab(&mut reg, &src0)
            } else {
                // an interface with no couplings at all on this rank
                define_ab(&mut reg, &InMemoryCouplings::new())
            };
            reg.check(&n0, ifc).unwrap()
        });
        let h1 = s.spawn(move || {
            let mut reg = reg1;
            let ifc = if define[1] {
                define_ab(&mut reg, &src1)
            } else {
                define_ab(&mut reg, &InMemoryCouplings::new())
            };
            reg.check(&n1, ifc).unwrap()
        });
        [h0.join().unwrap(), h1.join().unwrap()]
    })
}

#[test]
fn symmetric_interface_has_zero_mismatches() {
    let srcs = mirrored_pair(&six_four_specs());
    let regs = pair_registries(CommConfig::default());
    assert_eq!(check_on_both(regs, srcs, [true, true]), [0, 0]);
}

#[test]
fn size_disagreement_is_counted_on_both_sides() {
    let [src0, _] = mirrored_pair(&six_four_specs());
    // rank 1 built its side from a shorter coupling set
    let [_, src1] = mirrored_pair(&six_four_specs()[..7]);
    let regs = pair_registries(CommConfig::default());
    let errors = check_on_both(regs, [src0, src1], [true, true]);
    assert_eq!(errors, [1, 1]);
}

#[test]
fn asymmetric_partner_sets_are_counted() {
    let srcs = mirrored_pair(&six_four_specs());
    let regs = pair_registries(CommConfig::default());
    // rank 1 sees no couplings: rank 0 flags the silent partner, rank 1
    // flags the unexpected announcement
    let errors = check_on_both(regs, srcs, [true, false]);
    assert_eq!(errors, [1, 1]);
}

#[test]
fn check_is_diagnostic_not_fatal() {
    let [src0, _] = mirrored_pair(&six_four_specs());
    let [_, src1] = mirrored_pair(&six_four_specs()[..5]);
    let regs = pair_registries(CommConfig::default());
    // the call returns a count instead of erroring, so the caller decides
    let errors = check_on_both(regs, [src0, src1], [true, true]);
    assert!(errors[0] > 0 && errors[1] > 0);
}
