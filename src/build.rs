//! Interface instance data and the rebuild algorithm.
//!
//! An interface instance owns one flat coupling array (`cpl`), a parallel
//! object-shortcut array (`obj`), and a partner block per distinct remote
//! rank. Rebuilding regenerates all of it from the coupling source.
//!
//! The sort in [`rebuild`] is the sole mechanism that lets two processes
//! correlate message payloads by position: both ends order their couplings by
//! (rank ↑, direction ↑, attr ↓, global id ↑), and since an object and its
//! replica share attr and global id, the sequence either end visits for a
//! given partner mirrors the other end's exactly. Breaking the total order
//! here is a correctness bug, not a performance issue.

use crate::coupling::{Attr, Coupling, CouplingSource, Direction, ObjectRef, Rank};
use crate::pool::{DescriptorPool, Poolable};
use crate::registry::InterfaceDef;
use crate::replica_error::ReplicaError;
use crate::transport::Transport;

/// A (start, length) view into the interface's own `cpl`/`obj` arrays.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct SubRange {
    pub start: usize,
    pub len: usize,
}

impl SubRange {
    pub const EMPTY: SubRange = SubRange { start: 0, len: 0 };

    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    #[inline]
    pub fn as_range(&self) -> std::ops::Range<usize> {
        self.start..self.end()
    }
}

/// Per-attribute sub-ranges within one partner, one per direction class.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct AttrBlock {
    pub attr: Attr,
    pub dir: [SubRange; Direction::COUNT],
}

impl AttrBlock {
    fn new(attr: Attr) -> Self {
        Self {
            attr,
            dir: [SubRange::EMPTY; Direction::COUNT],
        }
    }

    pub fn item_count(&self) -> usize {
        self.dir.iter().map(|r| r.len).sum()
    }
}

/// Per-episode message buffers; kept on the partner block so the reuse
/// policy can carry their capacity across episodes.
#[derive(Debug, Default)]
pub struct MsgBufs {
    pub(crate) out: Vec<u8>,
    pub(crate) inb: Vec<u8>,
}

/// One distinct remote rank of an interface: its contiguous slice of the
/// coupling array, the three direction-class sub-ranges, the per-attribute
/// breakdown (descending attr order), and its transport channel.
#[derive(Debug)]
pub struct PartnerBlock<Ch> {
    pub rank: Rank,
    /// The partner's whole contiguous range of `cpl`/`obj`.
    pub range: SubRange,
    /// Direction-class sub-ranges; together they tile `range` exactly.
    pub dir: [SubRange; Direction::COUNT],
    /// Attribute blocks, descending attr order (matching the sort).
    pub attrs: Vec<AttrBlock>,
    pub(crate) channel: Option<Ch>,
    pub(crate) bufs: MsgBufs,
}

impl<Ch> Default for PartnerBlock<Ch> {
    fn default() -> Self {
        Self {
            rank: 0,
            range: SubRange::EMPTY,
            dir: [SubRange::EMPTY; Direction::COUNT],
            attrs: Vec::new(),
            channel: None,
            bufs: MsgBufs::default(),
        }
    }
}

impl<Ch> Poolable for PartnerBlock<Ch> {
    fn reset(&mut self) {
        self.rank = 0;
        self.range = SubRange::EMPTY;
        self.dir = [SubRange::EMPTY; Direction::COUNT];
        self.attrs.clear();
        self.channel = None;
        self.bufs.out.clear();
        self.bufs.inb.clear();
    }
}

impl<Ch> PartnerBlock<Ch> {
    pub fn item_count(&self) -> usize {
        self.range.len
    }

    /// Linear search; partners carry few attributes in practice.
    pub fn attr_block(&self, attr: Attr) -> Option<&AttrBlock> {
        self.attrs.iter().find(|b| b.attr == attr)
    }
}

/// Rebuilt-in-place data of one interface.
#[derive(Debug)]
pub struct InterfaceInstance<Ch> {
    /// All couplings of the interface, in the canonical sort order.
    pub cpl: Vec<Coupling>,
    /// Object shortcuts parallel to `cpl`; empty for the standard interface.
    pub obj: Vec<ObjectRef>,
    pub(crate) obj_valid: bool,
    pub partners: Vec<PartnerBlock<Ch>>,
}

impl<Ch> Default for InterfaceInstance<Ch> {
    fn default() -> Self {
        Self {
            cpl: Vec::new(),
            obj: Vec::new(),
            obj_valid: false,
            partners: Vec::new(),
        }
    }
}

impl<Ch> InterfaceInstance<Ch> {
    pub fn item_count(&self) -> usize {
        self.cpl.len()
    }

    pub fn partner_count(&self) -> usize {
        self.partners.len()
    }

    pub fn partner(&self, rank: Rank) -> Option<&PartnerBlock<Ch>> {
        self.partners.iter().find(|p| p.rank == rank)
    }

    /// True while the shortcut array matches current object storage.
    pub fn shortcuts_valid(&self) -> bool {
        self.obj_valid
    }

    pub(crate) fn invalidate_shortcuts(&mut self) {
        self.obj_valid = false;
    }

    /// Repair the shortcut array if stale: one pass re-resolving every
    /// coupling's object handle through the source.
    pub(crate) fn ensure_shortcuts<S>(&mut self, source: &S)
    where
        S: CouplingSource + ?Sized,
    {
        if self.obj_valid {
            return;
        }
        self.obj.clear();
        self.obj
            .extend(self.cpl.iter().map(|c| source.object(c.obj)));
        self.obj_valid = true;
        log::trace!("shortcut array repaired ({} items)", self.obj.len());
    }

    /// Verify the structural invariants of the partition: couplings in sort
    /// order, partner ranges tiling `cpl`, direction classes tiling each
    /// partner, attr sub-ranges tiling each direction class.
    pub fn validate_invariants(&self) -> Result<(), ReplicaError> {
        let broken = |what: String| Err(ReplicaError::Invariant(what));

        for w in self.cpl.windows(2) {
            if sort_key(&w[0]) >= sort_key(&w[1]) {
                return broken(format!(
                    "couplings out of order at gid {} / gid {}",
                    w[0].gid, w[1].gid
                ));
            }
        }
        if !self.obj.is_empty() && self.obj.len() != self.cpl.len() {
            return broken(format!(
                "shortcut array has {} items, coupling array {}",
                self.obj.len(),
                self.cpl.len()
            ));
        }

        let mut next = 0usize;
        for p in &self.partners {
            if p.range.start != next {
                return broken(format!("partner {} range does not start at {next}", p.rank));
            }
            let mut class_next = p.range.start;
            for d in Direction::ALL {
                let r = p.dir[d.index()];
                if !r.is_empty() && r.start != class_next {
                    return broken(format!(
                        "partner {} class {d} does not start at {class_next}",
                        p.rank
                    ));
                }
                let mut attr_next = r.start;
                let mut covered = 0usize;
                for blk in &p.attrs {
                    let ar = blk.dir[d.index()];
                    if ar.is_empty() {
                        continue;
                    }
                    if ar.start < r.start || ar.end() > r.end() {
                        return broken(format!(
                            "partner {} attr {} escapes class {d}",
                            p.rank, blk.attr
                        ));
                    }
                    if ar.start != attr_next {
                        return broken(format!(
                            "partner {} attr {} leaves a gap in class {d}",
                            p.rank, blk.attr
                        ));
                    }
                    attr_next = ar.end();
                    covered += ar.len;
                }
                if covered != r.len {
                    return broken(format!(
                        "partner {} attrs cover {covered} of {} items in class {d}",
                        p.rank, r.len
                    ));
                }
                class_next += r.len;
            }
            if class_next != p.range.end() {
                return broken(format!(
                    "partner {} direction classes cover {} of {} items",
                    p.rank,
                    class_next - p.range.start,
                    p.range.len
                ));
            }
            next = p.range.end();
        }
        if next != self.cpl.len() {
            return broken(format!(
                "partners cover {next} of {} couplings",
                self.cpl.len()
            ));
        }
        Ok(())
    }

    #[cfg(any(debug_assertions, feature = "check-invariants"))]
    pub(crate) fn debug_assert_invariants(&self) {
        if let Err(e) = self.validate_invariants() {
            panic!("{e}");
        }
    }
}

#[inline]
fn sort_key(c: &Coupling) -> (Rank, Direction, std::cmp::Reverse<Attr>, u64, u8) {
    (
        c.rank,
        c.dir,
        std::cmp::Reverse(c.attr),
        c.gid.get(),
        c.prio.0,
    )
}

/// Decide whether one (object, replica) pair belongs to the interface, and
/// in which direction class.
fn qualify(def: &InterfaceDef, obj: &ObjectRef, remote_prio: crate::coupling::Priority) -> Option<Direction> {
    let in_a = def.set_a.contains(obj.prio);
    let in_b = def.set_b.contains(obj.prio);
    if !in_a && !in_b {
        return None;
    }
    let out = in_a && def.set_b.contains(remote_prio);
    let inc = in_b && def.set_a.contains(remote_prio);
    match (out, inc) {
        (true, true) => Some(Direction::Both),
        (true, false) => Some(Direction::Outgoing),
        (false, true) => Some(Direction::Incoming),
        (false, false) => None,
    }
}

/// Rebuild one interface's instance data from the current coupling source.
///
/// Must run strictly after any change to object population, type, priority,
/// or attribute, and before any communication or local-exec call uses the
/// interface. Failure to connect channels is fatal for the caller: the
/// process cannot proceed without its communication topology.
pub(crate) fn rebuild<T, S>(
    def: &InterfaceDef,
    inst: &mut InterfaceInstance<T::Channel>,
    source: &S,
    transport: &T,
    pool: &mut DescriptorPool<PartnerBlock<T::Channel>>,
) -> Result<(), ReplicaError>
where
    T: Transport,
    S: CouplingSource + ?Sized,
{
    // 1) recycle the previous build
    pool.release_all(inst.partners.drain(..));
    inst.cpl.clear();
    inst.obj.clear();
    inst.obj_valid = false;

    // 2) collect qualifying couplings
    inst.cpl.reserve(source.coupling_count());
    for index in 0..source.object_count() {
        let obj = source.object(index);
        if !def.standard && !def.types.contains(obj.type_id) {
            continue;
        }
        for copy in source.copies_of(index) {
            let dir = if def.standard {
                // every coupling belongs; direction is not tracked
                Direction::Both
            } else {
                match qualify(def, &obj, copy.prio) {
                    Some(d) => d,
                    None => continue,
                }
            };
            inst.cpl.push(Coupling {
                obj: index,
                gid: obj.gid,
                attr: obj.attr,
                rank: copy.rank,
                prio: copy.prio,
                dir,
            });
        }
    }

    // 3) canonical order; identical on both ends of every partner pair
    inst.cpl.sort_unstable_by(|x, y| sort_key(x).cmp(&sort_key(y)));

    // 4) partition into partner blocks and per-class attr sub-ranges
    let cpl = &inst.cpl;
    let mut i = 0usize;
    while i < cpl.len() {
        let rank = cpl[i].rank;
        let start = i;
        while i < cpl.len() && cpl[i].rank == rank {
            i += 1;
        }
        let mut p = pool.acquire();
        p.rank = rank;
        p.range = SubRange::new(start, i - start);

        let mut lo = start;
        for d in Direction::ALL {
            let hi = lo + cpl[lo..i].iter().take_while(|c| c.dir == d).count();
            p.dir[d.index()] = SubRange::new(lo, hi - lo);

            let mut a = lo;
            while a < hi {
                let attr = cpl[a].attr;
                let b = a + cpl[a..hi].iter().take_while(|c| c.attr == attr).count();
                let idx = match p.attrs.iter().position(|blk| blk.attr == attr) {
                    Some(idx) => idx,
                    None => {
                        p.attrs.push(AttrBlock::new(attr));
                        p.attrs.len() - 1
                    }
                };
                p.attrs[idx].dir[d.index()] = SubRange::new(a, b - a);
                a = b;
            }
            lo = hi;
        }
        debug_assert_eq!(lo, i);
        p.attrs.sort_unstable_by(|x, y| y.attr.cmp(&x.attr));
        inst.partners.push(p);
    }

    // 5) object shortcuts; the standard interface resolves objects live
    if !def.standard {
        inst.obj.reserve(inst.cpl.len());
        let cpl = &inst.cpl;
        inst.obj.extend(cpl.iter().map(|c| source.object(c.obj)));
        inst.obj_valid = true;
    }

    // 6) refresh channels, one batched lookup
    let ranks: Vec<Rank> = inst.partners.iter().map(|p| p.rank).collect();
    let channels = transport.connect(&ranks)?;
    for (p, ch) in inst.partners.iter_mut().zip(channels) {
        p.channel = Some(ch);
    }

    #[cfg(any(debug_assertions, feature = "check-invariants"))]
    inst.debug_assert_invariants();

    log::debug!(
        "rebuilt interface '{}': {} couplings, {} partner(s)",
        def.name(),
        inst.cpl.len(),
        inst.partners.len()
    );
    Ok(())
}
