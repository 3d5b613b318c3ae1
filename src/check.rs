//! Cross-process consistency check.
//!
//! Two processes that share an interface must have built mirror-image
//! partner tables from their respective coupling sets; nothing in the wire
//! format would catch a divergence, so this check exists as an explicit
//! diagnostic. It is collective: every rank of the notify world runs it for
//! the same interface at the same time.

use crate::notify::NotifyService;
use crate::registry::{InterfaceId, InterfaceRegistry};
use crate::replica_error::ReplicaError;
use crate::transport::Transport;

impl<T: Transport> InterfaceRegistry<T> {
    /// Verify that every partner of `ifc` agrees with us on the interface's
    /// shape: each side announces its per-partner item count, then each side
    /// compares the announcements it received against its own partner table.
    ///
    /// Returns the number of mismatches (asymmetric partner sets and
    /// disagreeing sizes), each logged as a warning. A non-zero count means
    /// the two coupling registries diverged; the caller decides disposition.
    /// This is a diagnostic, not a gate; it never aborts.
    pub fn check<N>(&self, notify: &N, ifc: InterfaceId) -> Result<usize, ReplicaError>
    where
        N: NotifyService,
    {
        let slot = self.slot(ifc)?;
        let partners = &slot.inst.partners;

        notify.begin(partners.len())?;
        for p in partners {
            notify.announce(p.rank, p.item_count())?;
        }
        let replies = notify.complete()?;
        notify.end();

        let mut errors = 0usize;
        let mut replied = vec![false; partners.len()];
        for reply in &replies {
            match partners.iter().position(|p| p.rank == reply.from) {
                None => {
                    errors += 1;
                    log::warn!(
                        "interface {ifc}: rank {} announced {} item(s) but is not a partner here",
                        reply.from,
                        reply.items
                    );
                }
                Some(idx) => {
                    replied[idx] = true;
                    let local = partners[idx].item_count();
                    if reply.items != local {
                        errors += 1;
                        log::warn!(
                            "interface {ifc}: rank {} announced {} item(s), local partner table has {local}",
                            reply.from,
                            reply.items
                        );
                    }
                }
            }
        }
        for (p, &got) in partners.iter().zip(&replied) {
            if !got {
                errors += 1;
                log::warn!(
                    "interface {ifc}: partner {} did not announce (asymmetric partner sets)",
                    p.rank
                );
            }
        }
        Ok(errors)
    }

    /// Run [`check`](Self::check) for every registered interface, in id
    /// order on every rank, and sum the mismatch counts.
    pub fn check_all<N>(&self, notify: &N) -> Result<usize, ReplicaError>
    where
        N: NotifyService,
    {
        let mut errors = 0usize;
        for id in self.ids() {
            errors += self.check(notify, id)?;
        }
        Ok(errors)
    }
}
