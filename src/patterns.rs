//! The callable communication patterns.
//!
//! Every pattern runs one episode (see [`crate::engine`]) over one
//! interface. Non-extended patterns hand object shortcuts to the callbacks
//! and repair the shortcut cache first; extended (`_ext`) patterns hand the
//! couplings themselves to the callbacks (including the remote rank and
//! priority) and bypass the shortcut cache entirely.
//!
//! Gather callbacks must write exactly `item_size` bytes into their slice,
//! scatter callbacks read exactly `item_size` bytes; the engine sizes every
//! slice accordingly, so over- or under-writing is impossible by
//! construction. Payloads are flat concatenations of `item_size` records in
//! coupling order with no header or per-record tag: positional correlation
//! with the partner's build of the same interface is the whole contract.

use crate::coupling::{Attr, Coupling, CouplingSource, Direction, ObjectRef, Priority, Rank};
use crate::engine::{Plan, run_episode};
use crate::registry::{InterfaceId, InterfaceRegistry};
use crate::replica_error::ReplicaError;
use crate::transport::Transport;

/// Orientation of a oneway transfer. `Forward` moves the outgoing-class
/// items (plus, as always, the both-direction items); `Backward` moves the
/// incoming class instead.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Sweep {
    Forward,
    Backward,
}

impl<T: Transport> InterfaceRegistry<T> {
    /// Symmetric swap: both sides send and receive every item of every
    /// partner in one round trip.
    pub fn exchange<S, G, C>(
        &mut self,
        source: &S,
        ifc: InterfaceId,
        item_size: usize,
        gather: G,
        scatter: C,
    ) -> Result<(), ReplicaError>
    where
        S: CouplingSource + ?Sized,
        G: FnMut(&ObjectRef, &mut [u8]),
        C: FnMut(&ObjectRef, &[u8]),
    {
        self.object_pattern(source, ifc, None, Plan::Exchange, "exchange", item_size, gather, scatter)
    }

    /// [`exchange`](Self::exchange) restricted to one attribute bucket.
    /// Partners without that attribute are silently skipped.
    pub fn exchange_attr<S, G, C>(
        &mut self,
        source: &S,
        ifc: InterfaceId,
        attr: Attr,
        item_size: usize,
        gather: G,
        scatter: C,
    ) -> Result<(), ReplicaError>
    where
        S: CouplingSource + ?Sized,
        G: FnMut(&ObjectRef, &mut [u8]),
        C: FnMut(&ObjectRef, &[u8]),
    {
        self.object_pattern(
            source,
            ifc,
            Some(attr),
            Plan::Exchange,
            "attr-exchange",
            item_size,
            gather,
            scatter,
        )
    }

    /// One-directional transfer; halves the bandwidth of an exchange when
    /// full bidirectionality is not needed.
    pub fn oneway<S, G, C>(
        &mut self,
        source: &S,
        ifc: InterfaceId,
        sweep: Sweep,
        item_size: usize,
        gather: G,
        scatter: C,
    ) -> Result<(), ReplicaError>
    where
        S: CouplingSource + ?Sized,
        G: FnMut(&ObjectRef, &mut [u8]),
        C: FnMut(&ObjectRef, &[u8]),
    {
        self.object_pattern(
            source,
            ifc,
            None,
            Plan::Oneway(sweep),
            "oneway",
            item_size,
            gather,
            scatter,
        )
    }

    /// [`oneway`](Self::oneway) restricted to one attribute bucket.
    pub fn oneway_attr<S, G, C>(
        &mut self,
        source: &S,
        ifc: InterfaceId,
        attr: Attr,
        sweep: Sweep,
        item_size: usize,
        gather: G,
        scatter: C,
    ) -> Result<(), ReplicaError>
    where
        S: CouplingSource + ?Sized,
        G: FnMut(&ObjectRef, &mut [u8]),
        C: FnMut(&ObjectRef, &[u8]),
    {
        self.object_pattern(
            source,
            ifc,
            Some(attr),
            Plan::Oneway(sweep),
            "attr-oneway",
            item_size,
            gather,
            scatter,
        )
    }

    /// Apply `exec` to every object shortcut of the interface, in coupling
    /// order, with no communication.
    pub fn exec_local<S, F>(
        &mut self,
        source: &S,
        ifc: InterfaceId,
        exec: F,
    ) -> Result<(), ReplicaError>
    where
        S: CouplingSource + ?Sized,
        F: FnMut(&ObjectRef),
    {
        self.local_pattern(source, ifc, None, exec)
    }

    /// [`exec_local`](Self::exec_local) restricted to one attribute bucket.
    pub fn exec_local_attr<S, F>(
        &mut self,
        source: &S,
        ifc: InterfaceId,
        attr: Attr,
        exec: F,
    ) -> Result<(), ReplicaError>
    where
        S: CouplingSource + ?Sized,
        F: FnMut(&ObjectRef),
    {
        self.local_pattern(source, ifc, Some(attr), exec)
    }

    /// Extended exchange: callbacks see the coupling plus the remote rank
    /// and priority, and the shortcut cache is ignored.
    pub fn exchange_ext<G, C>(
        &mut self,
        ifc: InterfaceId,
        item_size: usize,
        gather: G,
        scatter: C,
    ) -> Result<(), ReplicaError>
    where
        G: FnMut(&Coupling, Rank, Priority, &mut [u8]),
        C: FnMut(&Coupling, Rank, Priority, &[u8]),
    {
        self.coupling_pattern(ifc, None, Plan::Exchange, "exchange-ext", item_size, gather, scatter)
    }

    /// Extended attribute-restricted exchange.
    pub fn exchange_attr_ext<G, C>(
        &mut self,
        ifc: InterfaceId,
        attr: Attr,
        item_size: usize,
        gather: G,
        scatter: C,
    ) -> Result<(), ReplicaError>
    where
        G: FnMut(&Coupling, Rank, Priority, &mut [u8]),
        C: FnMut(&Coupling, Rank, Priority, &[u8]),
    {
        self.coupling_pattern(
            ifc,
            Some(attr),
            Plan::Exchange,
            "attr-exchange-ext",
            item_size,
            gather,
            scatter,
        )
    }

    /// Extended oneway.
    pub fn oneway_ext<G, C>(
        &mut self,
        ifc: InterfaceId,
        sweep: Sweep,
        item_size: usize,
        gather: G,
        scatter: C,
    ) -> Result<(), ReplicaError>
    where
        G: FnMut(&Coupling, Rank, Priority, &mut [u8]),
        C: FnMut(&Coupling, Rank, Priority, &[u8]),
    {
        self.coupling_pattern(
            ifc,
            None,
            Plan::Oneway(sweep),
            "oneway-ext",
            item_size,
            gather,
            scatter,
        )
    }

    /// Extended attribute-restricted oneway.
    pub fn oneway_attr_ext<G, C>(
        &mut self,
        ifc: InterfaceId,
        attr: Attr,
        sweep: Sweep,
        item_size: usize,
        gather: G,
        scatter: C,
    ) -> Result<(), ReplicaError>
    where
        G: FnMut(&Coupling, Rank, Priority, &mut [u8]),
        C: FnMut(&Coupling, Rank, Priority, &[u8]),
    {
        self.coupling_pattern(
            ifc,
            Some(attr),
            Plan::Oneway(sweep),
            "attr-oneway-ext",
            item_size,
            gather,
            scatter,
        )
    }

    /// Extended local execution over couplings.
    pub fn exec_local_ext<F>(&mut self, ifc: InterfaceId, exec: F) -> Result<(), ReplicaError>
    where
        F: FnMut(&Coupling, Rank, Priority),
    {
        self.local_pattern_ext(ifc, None, exec)
    }

    /// Extended attribute-restricted local execution.
    pub fn exec_local_attr_ext<F>(
        &mut self,
        ifc: InterfaceId,
        attr: Attr,
        exec: F,
    ) -> Result<(), ReplicaError>
    where
        F: FnMut(&Coupling, Rank, Priority),
    {
        self.local_pattern_ext(ifc, Some(attr), exec)
    }

    // --- shared plumbing ---

    #[allow(clippy::too_many_arguments)]
    fn object_pattern<S, G, C>(
        &mut self,
        source: &S,
        ifc: InterfaceId,
        attr: Option<Attr>,
        plan: Plan,
        context: &'static str,
        item_size: usize,
        mut gather: G,
        mut scatter: C,
    ) -> Result<(), ReplicaError>
    where
        S: CouplingSource + ?Sized,
        G: FnMut(&ObjectRef, &mut [u8]),
        C: FnMut(&ObjectRef, &[u8]),
    {
        let (slots, transport, cfg) = self.parts();
        let slot = slots
            .get_mut(ifc.get() as usize)
            .ok_or(ReplicaError::UnknownInterface(ifc))?;
        let standard = slot.def.is_standard();
        if !standard {
            slot.inst.ensure_shortcuts(source);
        }
        let inst = &mut slot.inst;
        let cpl = &inst.cpl;
        let obj = &inst.obj;
        let partners = &mut inst.partners;

        if standard {
            // the standard interface keeps no shortcuts; resolve live
            let mut g = |i: usize, buf: &mut [u8]| gather(&source.object(cpl[i].obj), buf);
            let mut s = |i: usize, buf: &[u8]| scatter(&source.object(cpl[i].obj), buf);
            run_episode(
                transport, cfg, ifc, context, partners, attr, plan, item_size, &mut g, &mut s,
            )
        } else {
            let mut g = |i: usize, buf: &mut [u8]| gather(&obj[i], buf);
            let mut s = |i: usize, buf: &[u8]| scatter(&obj[i], buf);
            run_episode(
                transport, cfg, ifc, context, partners, attr, plan, item_size, &mut g, &mut s,
            )
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn coupling_pattern<G, C>(
        &mut self,
        ifc: InterfaceId,
        attr: Option<Attr>,
        plan: Plan,
        context: &'static str,
        item_size: usize,
        mut gather: G,
        mut scatter: C,
    ) -> Result<(), ReplicaError>
    where
        G: FnMut(&Coupling, Rank, Priority, &mut [u8]),
        C: FnMut(&Coupling, Rank, Priority, &[u8]),
    {
        let (slots, transport, cfg) = self.parts();
        let slot = slots
            .get_mut(ifc.get() as usize)
            .ok_or(ReplicaError::UnknownInterface(ifc))?;
        let inst = &mut slot.inst;
        let cpl = &inst.cpl;
        let partners = &mut inst.partners;

        let mut g = |i: usize, buf: &mut [u8]| {
            let c = &cpl[i];
            gather(c, c.rank, c.prio, buf)
        };
        let mut s = |i: usize, buf: &[u8]| {
            let c = &cpl[i];
            scatter(c, c.rank, c.prio, buf)
        };
        run_episode(
            transport, cfg, ifc, context, partners, attr, plan, item_size, &mut g, &mut s,
        )
    }

    fn local_pattern<S, F>(
        &mut self,
        source: &S,
        ifc: InterfaceId,
        attr: Option<Attr>,
        mut exec: F,
    ) -> Result<(), ReplicaError>
    where
        S: CouplingSource + ?Sized,
        F: FnMut(&ObjectRef),
    {
        let slot = self.slot_mut(ifc)?;
        let standard = slot.def.is_standard();
        if !standard {
            slot.inst.ensure_shortcuts(source);
        }
        let inst = &slot.inst;
        let item = |i: usize| -> ObjectRef {
            if standard {
                source.object(inst.cpl[i].obj)
            } else {
                inst.obj[i]
            }
        };
        match attr {
            None => {
                for i in 0..inst.cpl.len() {
                    exec(&item(i));
                }
            }
            Some(a) => {
                for p in &inst.partners {
                    if let Some(blk) = p.attr_block(a) {
                        for d in Direction::ALL {
                            for i in blk.dir[d.index()].as_range() {
                                exec(&item(i));
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn local_pattern_ext<F>(
        &mut self,
        ifc: InterfaceId,
        attr: Option<Attr>,
        mut exec: F,
    ) -> Result<(), ReplicaError>
    where
        F: FnMut(&Coupling, Rank, Priority),
    {
        let slot = self.slot_mut(ifc)?;
        let inst = &slot.inst;
        let call = |exec: &mut F, i: usize| {
            let c = &inst.cpl[i];
            exec(c, c.rank, c.prio);
        };
        match attr {
            None => {
                for i in 0..inst.cpl.len() {
                    call(&mut exec, i);
                }
            }
            Some(a) => {
                for p in &inst.partners {
                    if let Some(blk) = p.attr_block(a) {
                        for d in Direction::ALL {
                            for i in blk.dir[d.index()].as_range() {
                                call(&mut exec, i);
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
