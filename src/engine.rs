//! One communication episode: buffer sizing, post-receives-first ordering,
//! bounded polling, teardown.
//!
//! Every pattern in [`crate::patterns`] funnels through [`run_episode`]. The
//! ordering rules are load-bearing:
//!
//! 1. every partner's receive is posted before any send is posted to any
//!    partner (a send-before-receive cycle across ranks can deadlock);
//! 2. a partner's gather fully fills its out buffer before that partner's
//!    send is posted;
//! 3. a completed receive is scattered before the next poll pass.
//!
//! The poll loop is bounded by `CommConfig::poll_limit` passes; exhausting it
//! with anything still in flight is the fatal communication timeout. There is
//! no retry and no partial continuation.

use crate::build::{PartnerBlock, SubRange};
use crate::coupling::{Attr, Direction};
use crate::patterns::Sweep;
use crate::registry::{CommConfig, InterfaceId};
use crate::replica_error::ReplicaError;
use crate::transport::{CommPoll, Transport};

/// Which items a pattern moves, and in which buffer order.
#[derive(Copy, Clone, Debug)]
pub(crate) enum Plan {
    Exchange,
    Oneway(Sweep),
}

impl Plan {
    /// Direction classes gathered into the send buffer, in buffer order.
    fn send_classes(self) -> &'static [Direction] {
        match self {
            Plan::Exchange => &[Direction::Outgoing, Direction::Incoming, Direction::Both],
            Plan::Oneway(Sweep::Forward) => &[Direction::Outgoing, Direction::Both],
            Plan::Oneway(Sweep::Backward) => &[Direction::Incoming, Direction::Both],
        }
    }

    /// Direction classes scattered from the receive buffer, in buffer order.
    ///
    /// The peer gathered its mirror classes: its outgoing items are our
    /// incoming items and vice versa, so the class order swaps.
    fn recv_classes(self) -> &'static [Direction] {
        match self {
            Plan::Exchange => &[Direction::Incoming, Direction::Outgoing, Direction::Both],
            Plan::Oneway(Sweep::Forward) => &[Direction::Incoming, Direction::Both],
            Plan::Oneway(Sweep::Backward) => &[Direction::Outgoing, Direction::Both],
        }
    }
}

/// Resolve the class sub-ranges a pattern touches for one partner, in the
/// requested order. An attr-restricted pattern whose attr the partner does
/// not carry selects nothing; that partner is silently skipped.
fn selected<Ch>(
    p: &PartnerBlock<Ch>,
    attr: Option<Attr>,
    classes: &'static [Direction],
) -> ([SubRange; 3], usize) {
    let dir = match attr {
        None => &p.dir,
        Some(a) => match p.attr_block(a) {
            Some(blk) => &blk.dir,
            None => return ([SubRange::EMPTY; 3], 0),
        },
    };
    let mut ranges = [SubRange::EMPTY; 3];
    let mut items = 0usize;
    for (slot, d) in ranges.iter_mut().zip(classes) {
        *slot = dir[d.index()];
        items += slot.len;
    }
    (ranges, items)
}

struct EpisodeSlot<T: Transport> {
    send: Option<T::SendToken>,
    recv: Option<T::RecvToken>,
    recv_ranges: [SubRange; 3],
}

/// Run one full episode over `partners`.
///
/// `gather`/`scatter` receive the coupling-array index of each item plus an
/// exactly `item_size`-long slice of the partner's buffer; the pattern layer
/// maps the index to an object shortcut or a coupling.
#[allow(clippy::too_many_arguments)]
pub(crate) fn run_episode<T: Transport>(
    transport: &T,
    cfg: &CommConfig,
    ifc: InterfaceId,
    context: &'static str,
    partners: &mut [PartnerBlock<T::Channel>],
    attr: Option<Attr>,
    plan: Plan,
    item_size: usize,
    gather: &mut dyn FnMut(usize, &mut [u8]),
    scatter: &mut dyn FnMut(usize, &[u8]),
) -> Result<(), ReplicaError> {
    let mut slots: Vec<EpisodeSlot<T>> = Vec::with_capacity(partners.len());
    let mut pending = 0usize;

    // 1) size input buffers and post every receive up front
    for p in partners.iter_mut() {
        let (recv_ranges, n_in) = selected(p, attr, plan.recv_classes());
        let in_bytes = n_in * item_size;
        p.bufs.inb.clear();
        p.bufs.inb.resize(in_bytes, 0);
        let recv = if in_bytes > 0 {
            let chan = p
                .channel
                .as_ref()
                .ok_or(ReplicaError::MissingChannel(p.rank))?;
            pending += 1;
            Some(transport.irecv(chan, ifc.tag(), in_bytes)?)
        } else {
            None
        };
        slots.push(EpisodeSlot {
            send: None,
            recv,
            recv_ranges,
        });
    }

    // 2) gather and send, partner by partner
    for (p, slot) in partners.iter_mut().zip(slots.iter_mut()) {
        let (send_ranges, n_out) = selected(p, attr, plan.send_classes());
        let out_bytes = n_out * item_size;
        p.bufs.out.clear();
        p.bufs.out.resize(out_bytes, 0);
        if out_bytes == 0 {
            continue;
        }
        let mut off = 0usize;
        for r in send_ranges {
            for i in r.as_range() {
                gather(i, &mut p.bufs.out[off..off + item_size]);
                off += item_size;
            }
        }
        debug_assert_eq!(off, out_bytes);
        let chan = p
            .channel
            .as_ref()
            .ok_or(ReplicaError::MissingChannel(p.rank))?;
        slot.send = Some(transport.isend(chan, ifc.tag(), &p.bufs.out)?);
        pending += 1;
    }

    // 3) bounded poll; completed receives are scattered before the next pass
    let mut rounds = 0usize;
    while pending > 0 {
        if rounds == cfg.poll_limit {
            let err = ReplicaError::CommTimeout {
                interface: ifc,
                context,
                pending,
                rounds,
            };
            log::error!("{err}");
            return Err(err);
        }
        rounds += 1;

        for (p, slot) in partners.iter_mut().zip(slots.iter_mut()) {
            if let Some(mut tok) = slot.recv.take() {
                match transport.poll_recv(&mut tok) {
                    CommPoll::Pending => slot.recv = Some(tok),
                    CommPoll::Failed => {
                        let err = ReplicaError::CommError {
                            partner: p.rank,
                            detail: format!("receive failed during {context}"),
                        };
                        log::error!("{err}");
                        return Err(err);
                    }
                    CommPoll::Ready => {
                        let data = transport.complete_recv(tok)?;
                        if data.len() != p.bufs.inb.len() {
                            return Err(ReplicaError::PayloadSize {
                                partner: p.rank,
                                got: data.len(),
                                expected: p.bufs.inb.len(),
                            });
                        }
                        p.bufs.inb.copy_from_slice(&data);
                        let mut off = 0usize;
                        for r in slot.recv_ranges {
                            for i in r.as_range() {
                                scatter(i, &p.bufs.inb[off..off + item_size]);
                                off += item_size;
                            }
                        }
                        pending -= 1;
                    }
                }
            }
            if let Some(mut tok) = slot.send.take() {
                match transport.poll_send(&mut tok) {
                    CommPoll::Pending => slot.send = Some(tok),
                    CommPoll::Failed => {
                        let err = ReplicaError::CommError {
                            partner: p.rank,
                            detail: format!("send failed during {context}"),
                        };
                        log::error!("{err}");
                        return Err(err);
                    }
                    CommPoll::Ready => pending -= 1,
                }
            }
        }
        if pending > 0 {
            // no-op on a real single-threaded rank; lets in-process worlds
            // schedule the peer between passes
            std::thread::yield_now();
        }
    }

    // 4) teardown; buffers persist only under the reuse policy
    if !cfg.reuse_buffers {
        for p in partners.iter_mut() {
            p.bufs.out = Vec::new();
            p.bufs.inb = Vec::new();
        }
    }
    log::trace!("episode '{context}' on interface {ifc} finished after {rounds} poll round(s)");
    Ok(())
}
