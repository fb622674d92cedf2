//! The sync path (C6, spec.md §4.5).
//!
//! Invoked in syncing context for a closing TXG on the dirty records it
//! produced. Leaf sync either issues a write immediately or, if a
//! read-modify-write is still outstanding, stashes the intent and lets
//! [`crate::read::resolve`] dispatch it once the read completes.
//! Indirect sync drives its children before issuing its own write: the
//! reference [`crate::arc::ArcBackend`] here completes writes
//! synchronously rather than through a pipelined zio graph, so instead
//! of creating the parent's I/O handle first and letting child
//! completions race it to patch the block-pointer array, this
//! implementation simply finishes every child (and its block-pointer
//! slot update) before capturing the parent's final buffer content —
//! the same durability-ordering guarantee (§5: "child writes complete
//! before the indirect is considered durable") without needing an
//! async pipeline to get there.

use crate::arc::ArcBuf;
use crate::blkptr::{BlockPointer, BlockPointerSlot};
use crate::dbuf::Dbuf;
use crate::dnode::DnodeHandle;
use crate::error::{DbufError, Result};
use crate::hash::HashIndex;
use crate::hold;
use crate::state::StateFlags;
use crate::txg::TxgId;
use crate::types::{BlockId, DbufId};
use crate::user::EvictionQueue;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Stand-in for the real block allocator: every sync of a dbuf writes
/// to a freshly chosen location (copy-on-write), so the key is derived
/// from identity and TXG rather than reused across overwrites.
fn synth_block_key(id: DbufId, txg: TxgId) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    id.hash(&mut hasher);
    txg.0.hash(&mut hasher);
    hasher.finish()
}

/// Write `bp` into whichever slot `dbuf`'s block pointer lives in —
/// the parent indirect's buffer, the dnode's root array, or its spill
/// slot — and refresh the dbuf's own cached copy (§4.5 "each child's
/// completion callback may update the parent's block-pointer slot").
fn update_blkptr_slot(dbuf: &Arc<Dbuf>, bp: BlockPointer) {
    match dbuf.blkptr_slot {
        BlockPointerSlot::Root { blkid } => {
            if let Some(dnode) = &dbuf.dnode {
                let mut phys = dnode.struct_rwlock().write();
                if phys.root_blkptrs.len() <= blkid as usize {
                    phys.root_blkptrs.resize((blkid + 1) as usize, BlockPointer::hole());
                }
                phys.root_blkptrs[blkid as usize] = bp;
            }
        }
        BlockPointerSlot::Indirect { child_index, .. } => {
            if let Some(parent) = &dbuf.parent {
                let pg = parent.lock();
                if let Some(buf) = &pg.frontend {
                    crate::blkptr::write_child_slot(buf, child_index, bp);
                }
            }
        }
        BlockPointerSlot::Spill => {
            if let Some(dnode) = &dbuf.dnode {
                dnode.set_spill_blkptr(Some(bp));
            }
        }
        BlockPointerSlot::Bonus => {}
    }
    dbuf.lock().block_pointer = bp;
}

/// Issue `data` as a durable write for `txg` and run its completion
/// inline (the reference `ArcBackend` always completes synchronously).
/// Returns whether the write succeeded.
fn issue_write_and_complete(dbuf: &Arc<Dbuf>, txg: TxgId, data: ArcBuf) -> bool {
    let block_key = synth_block_key(dbuf.id, txg);
    let dbuf_cb = Arc::clone(dbuf);
    let success = Arc::new(AtomicBool::new(false));
    let success_cb = Arc::clone(&success);
    dbuf.arc.write(
        txg,
        block_key,
        data,
        None,
        Box::new(move |result| match result {
            Ok(outcome) => {
                let bp = BlockPointer {
                    block_key,
                    physical_size: outcome.physical_size,
                    logical_size: outcome.logical_size,
                    is_hole: outcome.is_hole,
                    birth_txg: txg.0,
                };
                update_blkptr_slot(&dbuf_cb, bp);
                let mut g = dbuf_cb.lock();
                g.remove_dirty(txg);
                if g.data_pending == Some(txg) {
                    g.data_pending = None;
                }
                drop(g);
                tracing::debug!(id = %dbuf_cb.id, txg = txg.0, "write completed");
                metrics::counter!("dbuf_writes_completed").increment(1);
                success_cb.store(true, Ordering::Release);
            }
            Err(e) => {
                // §7.4: surfaced through the pipeline, not retried here;
                // the dirty record is left in place until a future sync
                // attempt (out of scope: that retry policy belongs to the
                // syncing-context driver, not this layer).
                tracing::warn!(id = %dbuf_cb.id, txg = txg.0, error = %e, "write failed; dirty record retained");
                metrics::counter!("dbuf_write_failures").increment(1);
            }
        }),
    );
    success.load(Ordering::Acquire)
}

/// Build and, unless an RMW is outstanding, issue the write for a
/// leaf's dirty record at `txg`. Returns whether a write was actually
/// dispatched and completed (as opposed to deferred).
fn do_leaf_write(dbuf: &Arc<Dbuf>, txg: TxgId) -> Result<bool> {
    let (data, override_state) = {
        let g = dbuf.lock();
        let leaf = g.find_dirty(txg).and_then(|r| r.as_leaf()).ok_or_else(|| {
            DbufError::invariant(format!("do_leaf_write: no leaf dirty record for txg {} on {}", txg.0, dbuf.id))
        })?;
        (leaf.data.clone(), leaf.override_state.clone())
    };
    {
        let mut g = dbuf.lock();
        g.data_pending = Some(txg);
    }
    dbuf.notify_change();

    if let Some(ov) = override_state {
        // §4.5 "Override": a pre-committed block pointer supplied by the
        // client bypasses regular allocation.
        if ov.nopwrite && ov.block_pointer.logical_size as u64 != data.size() as u64 {
            return Err(DbufError::OverrideRejected(dbuf.id.to_string()));
        }
        update_blkptr_slot(dbuf, ov.block_pointer);
        let mut g = dbuf.lock();
        g.remove_dirty(txg);
        if g.data_pending == Some(txg) {
            g.data_pending = None;
        }
        drop(g);
        tracing::debug!(id = %dbuf.id, txg = txg.0, "override write applied");
        metrics::counter!("dbuf_override_writes").increment(1);
        return Ok(true);
    }

    Ok(issue_write_and_complete(dbuf, txg, data))
}

/// `sync_leaf`: the per-dbuf entry point the syncing context calls for
/// each leaf dirty record at TXG close (§4.5 "Leaf sync").
pub fn sync_leaf(dbuf: &Arc<Dbuf>, txg: TxgId, index: &HashIndex, evictions: &mut EvictionQueue) -> Result<()> {
    {
        let g = dbuf.lock();
        if g.state.contains(StateFlags::FILL) {
            // §9 open question: FILL implies an active writer; sync must
            // wait for or defer around it rather than race the filler.
            return Err(DbufError::not_supported("sync_leaf: dbuf is actively filling"));
        }
    }

    let needs_resolve = {
        let g = dbuf.lock();
        g.find_dirty(txg).and_then(|r| r.as_leaf()).map(|l| l.needs_resolve).unwrap_or(false)
    };
    if needs_resolve {
        let mut g = dbuf.lock();
        if let Some(leaf) = g.find_dirty_mut(txg).and_then(|r| r.as_leaf_mut()) {
            leaf.write_deferred = true;
        }
        tracing::debug!(id = %dbuf.id, txg = txg.0, "leaf sync deferred pending RMW resolve");
        return Ok(());
    }

    if do_leaf_write(dbuf, txg)? {
        hold::rele(index, dbuf, evictions);
    }
    Ok(())
}

/// Dispatch a write that `sync_leaf` deferred, once
/// [`crate::read::resolve`] has finished merging the outstanding
/// ranges. Releases only the TXG-scoped hold count directly (no
/// `HashIndex` is available on this call path) rather than running the
/// full eviction policy in [`hold::rele`]; a dbuf left warm a little
/// longer than strictly necessary is a missed optimization, not a
/// correctness defect — the next explicit `rele` still evicts it if
/// warranted.
pub(crate) fn dispatch_deferred_leaf_write(dbuf: &Arc<Dbuf>, txg: TxgId) {
    match do_leaf_write(dbuf, txg) {
        Ok(true) => {
            let mut g = dbuf.lock();
            if g.hold_count > 0 {
                g.hold_count -= 1;
            }
        }
        Ok(false) => {}
        Err(e) => tracing::warn!(id = %dbuf.id, txg = txg.0, error = %e, "deferred leaf write dispatch failed"),
    }
}

/// `sync_indirect`: ensure the indirect is resident, drive every child
/// dirty record registered against it, then issue its own write
/// (§4.5 "Indirect sync").
pub fn sync_indirect(dbuf: &Arc<Dbuf>, txg: TxgId, index: &HashIndex, evictions: &mut EvictionQueue) -> Result<()> {
    if dbuf.lock().frontend.is_none() {
        let mut q = EvictionQueue::new();
        let _ = crate::read::read(dbuf, crate::arc::ReadFlags::empty(), &mut q)?;
        q.drain_and_run();
    }
    dbuf.refresh_block_pointer();

    let children: Vec<DbufId> = {
        let g = dbuf.lock();
        g.find_dirty(txg).and_then(|r| r.as_indirect()).map(|ind| ind.children.lock().clone()).unwrap_or_default()
    };
    for child_id in children {
        let Some(child) = index.get(&child_id) else { continue };
        if child_id.level.is_leaf() {
            sync_leaf(&child, txg, index, evictions)?;
        } else {
            sync_indirect(&child, txg, index, evictions)?;
        }
    }

    let data = { dbuf.lock().frontend.clone() };
    let Some(data) = data else {
        // Nothing to write — every child turned out to be a hole and
        // this indirect was never otherwise touched.
        let mut g = dbuf.lock();
        g.remove_dirty(txg);
        return Ok(());
    };
    {
        let mut g = dbuf.lock();
        g.data_pending = Some(txg);
    }
    dbuf.notify_change();

    if issue_write_and_complete(dbuf, txg, data) {
        hold::rele(index, dbuf, evictions);
    }
    Ok(())
}

/// `sync_bonus`: copy the bonus dbuf's frontend into the object
/// descriptor. No I/O is issued by this layer (§4.5 "Bonus sync").
pub fn sync_bonus(
    dbuf: &Arc<Dbuf>,
    dnode: &Arc<dyn DnodeHandle>,
    txg: TxgId,
    index: &HashIndex,
    evictions: &mut EvictionQueue,
) -> Result<()> {
    if dbuf.id.blkid != BlockId::Bonus {
        return Err(DbufError::not_supported("sync_bonus on a non-bonus dbuf"));
    }
    let data = {
        let g = dbuf.lock();
        g.find_dirty(txg).and_then(|r| r.as_leaf()).map(|l| l.data.clone())
    };
    if let Some(buf) = &data {
        dnode.write_bonus(&buf.snapshot());
    }
    let mut g = dbuf.lock();
    g.remove_dirty(txg);
    if g.data_pending == Some(txg) {
        g.data_pending = None;
    }
    if let Some(buf) = data {
        g.frontend = Some(buf);
    }
    g.state = StateFlags::CACHED;
    drop(g);
    tracing::debug!(id = %dbuf.id, txg = txg.0, "bonus synced");
    metrics::counter!("dbuf_bonus_syncs").increment(1);
    hold::rele(index, dbuf, evictions);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arc::{ArcBackend, ArcBufContentType, MemArc};
    use crate::dbuf::{Dbuf, DbufId};
    use crate::dirty_path;
    use crate::dnode::MemDnode;
    use crate::txg::SimpleTx;
    use crate::types::{ByteRange, DatasetId, Level, ObjectNum};

    fn leaf(arc: &Arc<dyn ArcBackend>) -> Arc<Dbuf> {
        let id = DbufId::new(DatasetId(0), ObjectNum(1), Level::LEAF, BlockId::Data(3));
        Arc::new(Dbuf::new_uncached(id, 4096, Arc::clone(arc)))
    }

    #[test]
    fn sync_leaf_completes_and_releases_txg_hold() {
        let arc: Arc<dyn ArcBackend> = Arc::new(MemArc::new());
        let d = leaf(&arc);
        let index = HashIndex::new(4);
        index.insert_or_get(d.id, Arc::clone(&d));
        let tx = SimpleTx::open(TxgId(1));
        dirty_path::will_fill(&d, &tx).unwrap();
        dirty_path::fill_done(&d, &tx).unwrap();
        assert_eq!(d.hold_count(), 1); // TXG-scoped hold from dirty_leaf

        let mut evictions = EvictionQueue::new();
        sync_leaf(&d, TxgId(1), &index, &mut evictions).unwrap();
        assert_eq!(d.dirty_count(), 0);
        assert_eq!(d.hold_count(), 0);
    }

    #[test]
    fn sync_leaf_defers_when_range_unresolved() {
        let arc: Arc<dyn ArcBackend> = Arc::new(MemArc::new());
        let d = leaf(&arc);
        let index = HashIndex::new(4);
        index.insert_or_get(d.id, Arc::clone(&d));
        let tx = SimpleTx::open(TxgId(1));
        dirty_path::will_dirty_range(&d, &tx, ByteRange::new(0, 100)).unwrap();
        {
            // Force the RMW-pending condition this test wants to exercise.
            let mut g = d.lock();
            if let Some(leaf) = g.find_dirty_mut(TxgId(1)).and_then(|r| r.as_leaf_mut()) {
                leaf.needs_resolve = true;
            }
        }
        let mut evictions = EvictionQueue::new();
        sync_leaf(&d, TxgId(1), &index, &mut evictions).unwrap();
        // Still dirty: the write was deferred, not issued.
        assert_eq!(d.dirty_count(), 1);
        assert_eq!(d.hold_count(), 1);
    }

    #[test]
    fn sync_leaf_applies_override_without_allocating() {
        let arc: Arc<dyn ArcBackend> = Arc::new(MemArc::new());
        let d = leaf(&arc);
        let index = HashIndex::new(4);
        index.insert_or_get(d.id, Arc::clone(&d));
        let tx = SimpleTx::open(TxgId(1));
        dirty_path::will_fill(&d, &tx).unwrap();
        dirty_path::fill_done(&d, &tx).unwrap();
        let bp = BlockPointer { block_key: 777, physical_size: 4096, logical_size: 4096, is_hole: false, birth_txg: 1 };
        dirty_path::set_override(&d, &tx, bp, false).unwrap();

        let mut evictions = EvictionQueue::new();
        sync_leaf(&d, TxgId(1), &index, &mut evictions).unwrap();
        // The override's pointer was applied directly; a regular write
        // would have derived a different key from `synth_block_key`.
        assert_eq!(d.lock().block_pointer.block_key, 777);
        assert_eq!(d.dirty_count(), 0);
        assert_eq!(d.hold_count(), 0);
    }

    #[test]
    fn sync_leaf_rejects_nopwrite_override_with_mismatched_size() {
        let arc: Arc<dyn ArcBackend> = Arc::new(MemArc::new());
        let d = leaf(&arc);
        let index = HashIndex::new(4);
        index.insert_or_get(d.id, Arc::clone(&d));
        let tx = SimpleTx::open(TxgId(1));
        dirty_path::will_fill(&d, &tx).unwrap();
        dirty_path::fill_done(&d, &tx).unwrap();
        let bp = BlockPointer { block_key: 777, physical_size: 100, logical_size: 100, is_hole: false, birth_txg: 1 };
        dirty_path::set_override(&d, &tx, bp, true).unwrap();

        let mut evictions = EvictionQueue::new();
        let err = sync_leaf(&d, TxgId(1), &index, &mut evictions).unwrap_err();
        assert!(matches!(err, DbufError::OverrideRejected(_)));
        // Rejected before touching the dirty record or the hold count.
        assert_eq!(d.dirty_count(), 1);
    }

    #[test]
    fn sync_bonus_writes_into_dnode() {
        let arc: Arc<dyn ArcBackend> = Arc::new(MemArc::new());
        let dnode: Arc<dyn DnodeHandle> = Arc::new(MemDnode::new(ObjectNum(1), 4096, 1, 64));
        let id = DbufId::new(DatasetId(0), ObjectNum(1), Level::LEAF, BlockId::Bonus);
        let d = Arc::new(Dbuf::new(id, 64, Arc::clone(&arc), Some(Arc::clone(&dnode)), None, BlockPointerSlot::Bonus, 3));
        let index = HashIndex::new(4);
        index.insert_or_get(id, Arc::clone(&d));
        let tx = SimpleTx::open(TxgId(1));
        let buf = dirty_path::will_fill(&d, &tx).unwrap();
        buf.write_at(0, &[1, 2, 3]);
        dirty_path::fill_done(&d, &tx).unwrap();

        let mut evictions = EvictionQueue::new();
        sync_bonus(&d, &dnode, TxgId(1), &index, &mut evictions).unwrap();
        assert_eq!(&dnode.read_bonus()[0..3], &[1, 2, 3]);
        assert_eq!(d.dirty_count(), 0);
    }
}
