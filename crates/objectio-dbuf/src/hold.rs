//! Dbuf creation, the hold/rele reference-count protocol, and the
//! eviction policy applied when a hold count reaches zero (C7, spec.md
//! §4.2).
//!
//! `hold` is the only place a new [`Dbuf`] is constructed: every other
//! module receives an already-live `Arc<Dbuf>` found through the hash
//! index. Resolving a dbuf's parent (and, transitively, its parent's
//! parent, up to the root) happens here too, since a child cannot be
//! created without first knowing which slot of which parent its block
//! pointer lives in (§3 invariant 6).

use crate::arc::{ArcBackend, ArcOwner};
use crate::blkptr::{BlockPointer, BlockPointerSlot};
use crate::dbuf::Dbuf;
use crate::dnode::DnodeHandle;
use crate::error::{DbufError, Result};
use crate::hash::HashIndex;
use crate::state::StateFlags;
use crate::types::{BlockId, DatasetId, DbufId, Level};
use crate::user::EvictionQueue;
use std::sync::Arc;

/// Number of [`BlockPointer`]s that fit in one indirect block's
/// frontend, i.e. the fanout of the block-pointer tree.
fn fanout(block_size: u32) -> u64 {
    (block_size as u64 / BlockPointer::ENCODED_LEN as u64).max(1)
}

/// Resolve (recursively holding parents as needed) the slot a dbuf at
/// `(level, blkid)` stores its block pointer in, per §3 invariant 6 and
/// §4.2 step 2.
fn resolve_slot(
    index: &HashIndex,
    dataset: DatasetId,
    arc: &Arc<dyn ArcBackend>,
    dnode: &Arc<dyn DnodeHandle>,
    level: Level,
    blkid: BlockId,
    concurrent_txgs: usize,
) -> Result<(Option<Arc<Dbuf>>, BlockPointerSlot)> {
    match blkid {
        BlockId::Bonus => Ok((None, BlockPointerSlot::Bonus)),
        BlockId::Spill => Ok((None, BlockPointerSlot::Spill)),
        BlockId::Data(n) => {
            let nlevels = dnode.struct_rwlock().read().nlevels;
            if level.0 as u8 + 1 >= nlevels {
                // Topmost indirection: the block pointer lives directly in
                // the dnode's own root array.
                return Ok((None, BlockPointerSlot::Root { blkid: n }));
            }
            let fan = fanout(dnode.block_size());
            let parent_blkid = n / fan;
            let child_index = n % fan;
            let parent = hold(
                index,
                dataset,
                arc,
                dnode,
                level.parent(),
                BlockId::Data(parent_blkid),
                false,
                concurrent_txgs,
            )?;
            // The parent's array must be resident before a child slot can
            // be read out of it.
            let parent_front_empty = parent.lock().frontend.is_none();
            if parent_front_empty {
                let mut q = EvictionQueue::new();
                let _ = crate::read::read(&parent, crate::arc::ReadFlags::empty(), &mut q);
                q.drain_and_run();
            }
            let parent_id = parent.id;
            Ok((Some(parent), BlockPointerSlot::Indirect { parent: parent_id, child_index }))
        }
    }
}

fn peek_blkptr(dnode: &Arc<dyn DnodeHandle>, parent: &Option<Arc<Dbuf>>, slot: BlockPointerSlot) -> BlockPointer {
    match slot {
        BlockPointerSlot::Spill => dnode.spill_blkptr().unwrap_or_else(BlockPointer::hole),
        BlockPointerSlot::Bonus => BlockPointer::hole(),
        BlockPointerSlot::Root { blkid } => {
            let phys = dnode.struct_rwlock().read();
            phys.root_blkptrs.get(blkid as usize).copied().unwrap_or_else(BlockPointer::hole)
        }
        BlockPointerSlot::Indirect { child_index, .. } => match parent {
            Some(p) => {
                let g = p.lock();
                match &g.frontend {
                    Some(buf) => crate::blkptr::read_child_slot(buf, child_index),
                    None => BlockPointer::hole(),
                }
            }
            None => BlockPointer::hole(),
        },
    }
}

/// `hold(dn, blkid)` / `hold_level(dn, level, blkid)`: look up or
/// create the dbuf for `(dataset, dnode.object(), level, blkid)`,
/// incrementing its hold count (§4.2).
///
/// `fail_sparse` implements the `ENOENT` sparse-lookup miss of §6: when
/// set and the resolved block pointer is a hole, no dbuf is created and
/// `NotFound` is returned instead.
#[allow(clippy::too_many_arguments)]
pub fn hold(
    index: &HashIndex,
    dataset: DatasetId,
    arc: &Arc<dyn ArcBackend>,
    dnode: &Arc<dyn DnodeHandle>,
    level: Level,
    blkid: BlockId,
    fail_sparse: bool,
    concurrent_txgs: usize,
) -> Result<Arc<Dbuf>> {
    let id = DbufId::new(dataset, dnode.object(), level, blkid);

    if let Some(existing) = index.get(&id) {
        existing.lock().hold_count += 1;
        tracing::trace!(id = %id, "dbuf hold (existing)");
        return Ok(existing);
    }

    let (parent, slot) = resolve_slot(index, dataset, arc, dnode, level, blkid, concurrent_txgs)?;
    let bp = peek_blkptr(dnode, &parent, slot);
    if fail_sparse && bp.is_hole {
        return Err(DbufError::not_found(id.to_string()));
    }

    let block_size = dnode.block_size() as u64;
    let candidate = Arc::new(Dbuf::new(id, block_size, Arc::clone(arc), Some(Arc::clone(dnode)), parent, slot, concurrent_txgs));
    candidate.lock().block_pointer = bp;

    let (winner, inserted) = index.insert_or_get(id, candidate);
    if inserted {
        dnode.register_dbuf(id);
        tracing::debug!(id = %id, "dbuf created");
    }

    // §4.2 step 4: the cache buffer backing the winning entry may have
    // been invalidated between insertion and now by a racing evictor;
    // a `None` frontend on an otherwise-CACHED winner is simply treated
    // as "needs a read", which `crate::read::read` already handles, so
    // no special retry is required here.
    {
        let mut g = winner.lock();
        g.hold_count += 1;
        if g.hold_count == 1 && g.state == StateFlags::EVICTING {
            // Lost a race with an in-flight eviction of this exact entry;
            // the caller must retry the whole lookup.
            g.hold_count -= 1;
            drop(g);
            return hold(index, dataset, arc, dnode, level, blkid, fail_sparse, concurrent_txgs);
        }
    }
    Ok(winner)
}

/// `hold_level`: explicit alias for `hold` taking `level` directly,
/// matching the §6 client surface naming (`hold` defaults to level 0).
pub fn hold_level(
    index: &HashIndex,
    dataset: DatasetId,
    arc: &Arc<dyn ArcBackend>,
    dnode: &Arc<dyn DnodeHandle>,
    level: Level,
    blkid: BlockId,
    fail_sparse: bool,
    concurrent_txgs: usize,
) -> Result<Arc<Dbuf>> {
    hold(index, dataset, arc, dnode, level, blkid, fail_sparse, concurrent_txgs)
}

/// `rele(dbuf, tag)`: drop one hold. At zero, cacheability policy
/// decides whether the dbuf is kept warm or evicted (§4.2 "rele").
///
/// A dbuf backed by a frontend the underlying cache reports as a
/// duplicate of another already-resident copy is never worth keeping:
/// evict it immediately. Everything else is kept warm so a subsequent
/// `hold` for the same coordinates is a cache hit.
pub fn rele(index: &HashIndex, dbuf: &Arc<Dbuf>, evictions: &mut EvictionQueue) {
    let mut g = dbuf.lock();
    debug_assert!(g.hold_count > 0, "rele without a matching hold on {}", dbuf.id);
    g.hold_count -= 1;
    if g.hold_count != 0 {
        return;
    }
    if !g.dirty.is_empty() {
        // Still pinned by the TXG-scoped hold the dirty path took out;
        // the sync path's completion callback will rele again once the
        // last dirty record is retired.
        return;
    }

    let duplicate =
        g.frontend.as_ref().is_some_and(|buf| dbuf.arc.remove_ref(buf, ArcOwner(0)));
    if !duplicate {
        tracing::trace!(id = %dbuf.id, "dbuf released, kept warm");
        return;
    }

    g.state = StateFlags::EVICTING;
    let user = g.user.take();
    drop(g);

    index.remove(&dbuf.id);
    if let Some(dnode) = &dbuf.dnode {
        dnode.unregister_dbuf(dbuf.id);
    }
    if let Some(cb) = user {
        evictions.push(cb);
    }
    tracing::debug!(id = %dbuf.id, "dbuf evicted (duplicate buffer)");
    metrics::counter!("dbuf_evictions").increment(1);
}

/// `prefetch(dn, blkid)`: issue a best-effort, fire-and-forget read
/// hint. Failures and cache misses are silently discarded — this is an
/// optimization, not a correctness path (§6).
pub fn prefetch(
    index: &HashIndex,
    dataset: DatasetId,
    arc: &Arc<dyn ArcBackend>,
    dnode: &Arc<dyn DnodeHandle>,
    blkid: BlockId,
    concurrent_txgs: usize,
) {
    let Ok(dbuf) = hold(index, dataset, arc, dnode, Level::LEAF, blkid, true, concurrent_txgs) else {
        return;
    };
    let mut q = EvictionQueue::new();
    let _ = crate::read::read(&dbuf, crate::arc::ReadFlags::NEVERWAIT, &mut q);
    q.drain_and_run();
    rele(index, &dbuf, &mut EvictionQueue::new());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arc::MemArc;
    use crate::dnode::MemDnode;

    fn setup() -> (HashIndex, Arc<dyn ArcBackend>, Arc<dyn DnodeHandle>) {
        let index = HashIndex::new(4);
        let arc: Arc<dyn ArcBackend> = Arc::new(MemArc::new());
        let dnode: Arc<dyn DnodeHandle> = Arc::new(MemDnode::new(crate::types::ObjectNum(1), 4096, 1, 0));
        (index, arc, dnode)
    }

    #[test]
    fn hold_creates_then_reuses() {
        let (index, arc, dnode) = setup();
        let a = hold(&index, DatasetId(0), &arc, &dnode, Level::LEAF, BlockId::Data(0), false, 3).unwrap();
        assert_eq!(a.hold_count(), 1);
        let b = hold(&index, DatasetId(0), &arc, &dnode, Level::LEAF, BlockId::Data(0), false, 3).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.hold_count(), 2);
    }

    #[test]
    fn fail_sparse_on_hole_returns_not_found() {
        let (index, arc, dnode) = setup();
        let err = hold(&index, DatasetId(0), &arc, &dnode, Level::LEAF, BlockId::Data(5), true, 3).unwrap_err();
        assert!(matches!(err, DbufError::NotFound(_)));
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn rele_to_zero_keeps_warm_by_default() {
        let (index, arc, dnode) = setup();
        let d = hold(&index, DatasetId(0), &arc, &dnode, Level::LEAF, BlockId::Data(0), false, 3).unwrap();
        let mut q = EvictionQueue::new();
        rele(&index, &d, &mut q);
        assert_eq!(d.hold_count(), 0);
        assert!(index.get(&d.id).is_some());
    }

    #[test]
    fn rele_evicts_on_duplicate_buffer() {
        let (index, arc, dnode) = setup();
        let d = hold(&index, DatasetId(0), &arc, &dnode, Level::LEAF, BlockId::Data(0), false, 3).unwrap();
        {
            let mut g = d.lock();
            g.frontend = Some(crate::arc::ArcBuf::zeroed(4096, crate::arc::ArcBufContentType::Data));
            g.state = StateFlags::CACHED;
        }
        let mut q = EvictionQueue::new();
        rele(&index, &d, &mut q);
        assert_eq!(d.state_snapshot(), StateFlags::EVICTING);
        assert!(index.get(&d.id).is_none());

        let fresh = hold(&index, DatasetId(0), &arc, &dnode, Level::LEAF, BlockId::Data(0), false, 3).unwrap();
        assert!(!Arc::ptr_eq(&fresh, &d));
        assert_eq!(fresh.state_snapshot(), StateFlags::UNCACHED);
    }
}
