//! The dirty path (C5, spec.md §4.4).
//!
//! Five entry points drive a dbuf from clean to dirty-and-eventually-
//! synced: `will_dirty`/`will_dirty_range` declare an intent to modify
//! content that (in general) must first be read so the parts the
//! caller isn't touching survive; `will_fill`/`will_not_fill`/
//! `fill_done` bracket a full-block overwrite that skips the read
//! entirely. `free_range` punches holes.

use crate::arc::{ArcBuf, ArcBufContentType, ArcOwner};
use crate::blkptr::{BlockPointer, BlockPointerSlot};
use crate::dbuf::{Dbuf, DbufInner};
use crate::dirty_record::{DirtyRecord, IndirectDirtyRecord, LeafDirtyRecord, OverrideState};
use crate::error::{DbufError, Result};
use crate::hash::HashIndex;
use crate::state::StateFlags;
use crate::txg::{TxHandle, TxgId};
use crate::types::{BlockId, ByteRange, DatasetId, DbufId, ObjectNum};
use crate::user::EvictionQueue;
use std::sync::Arc;

fn content_type_for(dbuf: &Dbuf) -> ArcBufContentType {
    if dbuf.id.level.is_leaf() && !dbuf.id.blkid.is_metadata() {
        ArcBufContentType::Data
    } else {
        ArcBufContentType::Metadata
    }
}

/// Validate the strictly-decreasing-TXG invariant before inserting a
/// dirty record for `txg` (§3 invariant 2), applying the meta-dnode
/// exception (§6 `is_meta_dnode`).
fn check_txg_order(dbuf: &Dbuf, g: &DbufInner, txg: TxgId) -> Result<()> {
    let Some(newest) = g.newest_dirty() else { return Ok(()) };
    if newest.txg() == txg {
        return Ok(());
    }
    let is_meta = dbuf.dnode.as_ref().is_some_and(|d| d.is_meta_dnode());
    if newest.txg() < txg || is_meta {
        Ok(())
    } else {
        Err(DbufError::invariant(format!(
            "dirty record for txg {} would precede existing txg {} on non-meta dbuf {}",
            txg.0, newest.txg().0, dbuf.id
        )))
    }
}

/// Ensure `dbuf`'s parent indirect is dirtied in the same txg and that
/// `dbuf` is registered as one of its pending children (§4.4 "Dirty
/// parent"). Recurses to the root; each level's `will_dirty` call is a
/// whole-block (non-fill) dirty, since indirect content is always
/// metadata the sync path needs intact before patching one slot.
fn propagate_parent_dirty(dbuf: &Arc<Dbuf>, tx: &dyn TxHandle) -> Result<()> {
    let (parent, child_index) = match (&dbuf.parent, dbuf.blkptr_slot) {
        (Some(p), BlockPointerSlot::Indirect { child_index, .. }) => (Arc::clone(p), child_index),
        _ => return Ok(()),
    };
    will_dirty(&parent, tx)?;
    let _ = child_index; // recorded via dbuf.id below; kept for clarity at call sites.
    let mut pg = parent.lock();
    if let Some(DirtyRecord::Indirect(ind)) = pg.find_dirty_mut(tx.txg()) {
        let mut children = ind.children.lock();
        if !children.contains(&dbuf.id) {
            children.push(dbuf.id);
        }
    }
    Ok(())
}

/// Obtain (creating if necessary) the buffer a new dirty record for a
/// leaf dbuf should start from. `fill` is true for the `will_fill`
/// (NOFILL) path, which never needs existing content; otherwise the
/// caller is promising only to *patch* the block, so existing content
/// must be preserved — reusing the live frontend (aliasing it, unless
/// an older unsynced record already aliases it too, which forces a COW
/// split) or, failing that, a synchronous read.
fn initial_leaf_buffer(dbuf: &Arc<Dbuf>, fill: bool, evictions: &mut EvictionQueue) -> Result<ArcBuf> {
    {
        let g = dbuf.lock();
        if let Some(front) = &g.frontend {
            if fill {
                return Ok(front.duplicate());
            }
            let aliased_by_older = g.dirty.iter().any(|r| r.as_leaf().is_some_and(|l| l.data.aliases(front)));
            return Ok(if aliased_by_older { front.duplicate() } else { front.clone() });
        }
    }
    if fill {
        let size = dbuf.block_size() as usize;
        return Ok(dbuf.arc.alloc(size, ArcOwner(0), content_type_for(dbuf)));
    }
    // No frontend cached: the patch must be read-modify-write, so fetch
    // real content now rather than defer (will_dirty's caller expects
    // the returned record to already be valid, unlike will_fill's).
    let buf = crate::read::read(dbuf, crate::arc::ReadFlags::empty(), evictions)?;
    Ok(buf)
}

fn dirty_leaf(
    dbuf: &Arc<Dbuf>,
    tx: &dyn TxHandle,
    range: Option<ByteRange>,
    fill: bool,
    evictions: &mut EvictionQueue,
) -> Result<()> {
    let txg = tx.txg();
    let block_size = dbuf.block_size();

    if dbuf.lock().find_dirty(txg).is_none() {
        let data = initial_leaf_buffer(dbuf, fill, evictions)?;
        let mut g = dbuf.lock();
        check_txg_order(dbuf, &g, txg)?;
        let mut record = LeafDirtyRecord::new(txg, data);
        if fill {
            // Content is not yet valid; the filler must supply all of
            // it before `fill_done`.
            record.needs_resolve = true;
        } else if let Some(r) = range {
            if r != ByteRange::new(0, block_size) {
                record.ranges.insert(r);
                record.needs_resolve = false; // content already fully valid (RMW base read above); `r` just narrows what this txg is known to have *changed*.
            }
        }
        g.insert_dirty(DirtyRecord::Leaf(record));
        g.debug_assert_dirty_order();
        // Holds the dbuf open until sync completion releases it (§4.5
        // "TXG-scoped hold release"), independent of any client hold.
        g.hold_count += 1;
        if let Some(dnode) = &dbuf.dnode {
            dnode.mark_dirty(txg);
        }
        tracing::debug!(id = %dbuf.id, txg = txg.0, fill, "dbuf dirtied");
        metrics::counter!("dbuf_dirty_records_created").increment(1);
    } else if let Some(r) = range {
        let mut g = dbuf.lock();
        if let Some(leaf) = g.find_dirty_mut(txg).and_then(|r| r.as_leaf_mut()) {
            leaf.ranges.insert(r);
            // §4.4 step 6: touching an existing record with a new write
            // supersedes any previously pre-committed immediate write.
            leaf.override_state = None;
        }
    }

    apply_state_after_dirty(dbuf);
    Ok(())
}

fn dirty_indirect(dbuf: &Arc<Dbuf>, tx: &dyn TxHandle, evictions: &mut EvictionQueue) -> Result<()> {
    let txg = tx.txg();
    if dbuf.lock().find_dirty(txg).is_none() {
        // Indirect content (the child block-pointer array) lives in the
        // shared frontend, not per-record, so make sure it reflects
        // on-disk reality before this txg starts mutating slots in it.
        if dbuf.lock().frontend.is_none() {
            let _ = crate::read::read(dbuf, crate::arc::ReadFlags::empty(), evictions)?;
        }
        let mut g = dbuf.lock();
        check_txg_order(dbuf, &g, txg)?;
        g.insert_dirty(DirtyRecord::Indirect(IndirectDirtyRecord::new(txg)));
        g.debug_assert_dirty_order();
        g.hold_count += 1;
        if let Some(dnode) = &dbuf.dnode {
            dnode.mark_dirty(txg);
        }
        tracing::debug!(id = %dbuf.id, txg = txg.0, "indirect dbuf dirtied");
    }
    Ok(())
}

/// Reconcile `state` after a dirty-record insertion or range update.
/// A fully-valid newest record becomes the live frontend (`CACHED`);
/// one still needing resolution is `PARTIAL`, optionally combined with
/// `READ` when the backing fetch has already been kicked off.
fn apply_state_after_dirty(dbuf: &Arc<Dbuf>) {
    let mut g = dbuf.lock();
    let Some(newest) = g.dirty.first() else { return };
    let Some(leaf) = newest.as_leaf() else { return };
    if leaf.needs_resolve {
        if !g.state.contains(StateFlags::PARTIAL) {
            g.state = StateFlags::PARTIAL;
        }
    } else {
        // Fully valid content: becomes the live frontend outright, even
        // if a filler/RMW was previously in flight on an older record
        // now superseded.
        g.frontend = Some(leaf.data.clone());
        g.state = StateFlags::CACHED;
    }
}

/// `will_dirty`: declare that `tx` will modify `dbuf`, preserving any
/// content this txg doesn't explicitly touch. Indirect dbufs always
/// take this path (their content is metadata, never filled wholesale
/// without first existing).
pub fn will_dirty(dbuf: &Arc<Dbuf>, tx: &dyn TxHandle) -> Result<()> {
    let mut evictions = EvictionQueue::new();
    propagate_parent_dirty(dbuf, tx)?;
    let result = if dbuf.id.level.is_leaf() {
        dirty_leaf(dbuf, tx, None, false, &mut evictions)
    } else {
        dirty_indirect(dbuf, tx, &mut evictions)
    };
    evictions.drain_and_run();
    result
}

/// `will_dirty_range`: as `will_dirty`, but narrows the declared change
/// to `range` — the primitive a partial write actually uses so the
/// sync path knows exactly which bytes came from this txg versus an
/// older, still-resolving read.
pub fn will_dirty_range(dbuf: &Arc<Dbuf>, tx: &dyn TxHandle, range: ByteRange) -> Result<()> {
    if !dbuf.id.level.is_leaf() {
        return Err(DbufError::not_supported("will_dirty_range on an indirect dbuf"));
    }
    let mut evictions = EvictionQueue::new();
    propagate_parent_dirty(dbuf, tx)?;
    let result = dirty_leaf(dbuf, tx, Some(range), false, &mut evictions);
    evictions.drain_and_run();
    result
}

/// `will_fill`: declare a full-block overwrite that needs no existing
/// content. Returns the buffer the caller should write into; the
/// caller must call [`fill_done`] once every byte has been supplied,
/// or [`will_not_fill`] to back out.
pub fn will_fill(dbuf: &Arc<Dbuf>, tx: &dyn TxHandle) -> Result<ArcBuf> {
    if !dbuf.id.level.is_leaf() {
        return Err(DbufError::not_supported("will_fill on an indirect dbuf"));
    }
    let mut evictions = EvictionQueue::new();
    propagate_parent_dirty(dbuf, tx)?;
    dirty_leaf(dbuf, tx, None, true, &mut evictions)?;
    evictions.drain_and_run();

    let mut g = dbuf.lock();
    // `dirty_leaf` already drove state to PARTIAL (content not yet
    // supplied); add FILL to record that a filler is now active.
    g.state = g.state.union(StateFlags::FILL).remove(
        StateFlags::UNCACHED.union(StateFlags::NOFILL).union(StateFlags::CACHED).union(StateFlags::EVICTING),
    );
    let data = g
        .find_dirty(tx.txg())
        .and_then(|r| r.as_leaf())
        .map(|l| l.data.clone())
        .ok_or_else(|| DbufError::invariant("will_fill: dirty record missing after dirty_leaf"))?;
    tracing::debug!(id = %dbuf.id, txg = tx.txg().0, "fill started");
    Ok(data)
}

/// Abort an in-progress fill. The record's content is not trustworthy,
/// so it reverts to needing a full resolve against older/on-disk data
/// on the next read.
pub fn will_not_fill(dbuf: &Arc<Dbuf>, tx: &dyn TxHandle) -> Result<()> {
    let mut g = dbuf.lock();
    let txg = tx.txg();
    let leaf = g
        .find_dirty_mut(txg)
        .and_then(|r| r.as_leaf_mut())
        .ok_or_else(|| DbufError::invariant("will_not_fill: no dirty record for this txg"))?;
    leaf.ranges.clear();
    leaf.needs_resolve = true;
    g.state = StateFlags::PARTIAL;
    tracing::debug!(id = %dbuf.id, txg = txg.0, "fill aborted");
    Ok(())
}

/// `fill_done`: the caller has supplied every byte of the block. The
/// record becomes fully valid and, if nothing newer superseded it,
/// becomes the live frontend.
pub fn fill_done(dbuf: &Arc<Dbuf>, tx: &dyn TxHandle) -> Result<()> {
    let txg = tx.txg();
    let mut g = dbuf.lock();
    let block_size = g.block_size;
    let is_newest = g.dirty.first().is_some_and(|r| r.txg() == txg);
    let leaf = g
        .find_dirty_mut(txg)
        .and_then(|r| r.as_leaf_mut())
        .ok_or_else(|| DbufError::invariant("fill_done: no dirty record for this txg"))?;

    if leaf.freed_in_flight {
        // §8 scenario 3: a `free_range` raced this filler. The filler's
        // content is discarded in favor of the hole; the record stays
        // zeroed and fully valid.
        leaf.data.zero_range(0, block_size);
    }
    leaf.ranges.clear();
    leaf.needs_resolve = false;
    let data = leaf.data.clone();

    if is_newest {
        g.frontend = Some(data);
        g.state = StateFlags::CACHED;
    } else {
        g.state = g.state.remove(StateFlags::FILL);
    }
    tracing::debug!(id = %dbuf.id, txg = txg.0, "fill done");
    metrics::counter!("dbuf_fills_completed").increment(1);
    Ok(())
}

/// `assign_arcbuf`: install a fully-prepared, already-valid buffer as
/// this TXG's dirty content in one step (§4.4 step 5 "If a
/// fully-prepared replacement buffer was supplied (full-block write),
/// install it."). The caller is asserting the buffer already holds the
/// complete, correct block content — no RMW, no range tracking.
pub fn assign_arcbuf(dbuf: &Arc<Dbuf>, buf: ArcBuf, tx: &dyn TxHandle) -> Result<()> {
    if !dbuf.id.level.is_leaf() {
        return Err(DbufError::not_supported("assign_arcbuf on an indirect dbuf"));
    }
    propagate_parent_dirty(dbuf, tx)?;
    let txg = tx.txg();
    let mut g = dbuf.lock();
    check_txg_order(dbuf, &g, txg)?;
    let is_new = g.find_dirty(txg).is_none();
    let mut record = LeafDirtyRecord::new(txg, buf.clone());
    record.needs_resolve = false;
    if is_new {
        g.insert_dirty(DirtyRecord::Leaf(record));
        g.debug_assert_dirty_order();
        g.hold_count += 1;
        if let Some(dnode) = &dbuf.dnode {
            dnode.mark_dirty(txg);
        }
    } else if let Some(leaf) = g.find_dirty_mut(txg).and_then(|r| r.as_leaf_mut()) {
        leaf.data = buf.clone();
        leaf.ranges.clear();
        leaf.needs_resolve = false;
    }
    if g.dirty.first().is_some_and(|r| r.txg() == txg) {
        g.frontend = Some(buf);
        g.state = StateFlags::CACHED;
    }
    tracing::debug!(id = %dbuf.id, txg = txg.0, "arcbuf assigned");
    Ok(())
}

/// `dmu_sync`-style immediate write: attach a pre-committed block
/// pointer to `tx`'s already-existing dirty record (§4.5 "Override").
/// The leaf sync path recognizes `override_state` and emits a
/// specialized write that reuses `block_pointer` (or, if `nopwrite` is
/// set, revalidates it against the record's content) instead of
/// allocating fresh space. Requires a dirty record for `tx` to already
/// exist — this marks an in-progress write as pre-committed, it does
/// not create one.
pub fn set_override(
    dbuf: &Arc<Dbuf>,
    tx: &dyn TxHandle,
    block_pointer: BlockPointer,
    nopwrite: bool,
) -> Result<()> {
    if !dbuf.id.level.is_leaf() {
        return Err(DbufError::not_supported("set_override on an indirect dbuf"));
    }
    let txg = tx.txg();
    let mut g = dbuf.lock();
    let leaf = g
        .find_dirty_mut(txg)
        .and_then(|r| r.as_leaf_mut())
        .ok_or_else(|| DbufError::invariant(format!("set_override: no dirty record for txg {} on {}", txg.0, dbuf.id)))?;
    leaf.override_state = Some(OverrideState { block_pointer, nopwrite });
    tracing::debug!(id = %dbuf.id, txg = txg.0, nopwrite, "override attached to dirty record");
    Ok(())
}

/// `spill_set_blksz`: resize the spill block's backing buffer. Only
/// valid against the reserved `SPILL` block-id (§6 `ENOTSUP`
/// "spill on non-spill id").
pub fn spill_set_blksz(dbuf: &Arc<Dbuf>, size: u64, tx: &dyn TxHandle) -> Result<()> {
    if dbuf.id.blkid != BlockId::Spill {
        return Err(DbufError::not_supported("spill_set_blksz on a non-spill dbuf"));
    }
    let mut evictions = EvictionQueue::new();
    dirty_leaf(dbuf, tx, None, true, &mut evictions)?;
    evictions.drain_and_run();
    let mut g = dbuf.lock();
    let txg = tx.txg();
    if let Some(leaf) = g.find_dirty_mut(txg).and_then(|r| r.as_leaf_mut()) {
        let fresh = ArcBuf::zeroed(size as usize, ArcBufContentType::Metadata);
        leaf.data = fresh.clone();
        leaf.needs_resolve = false;
        g.frontend = Some(fresh);
    }
    g.block_size = size;
    g.state = StateFlags::CACHED;
    tracing::debug!(id = %dbuf.id, size, "spill block resized");
    Ok(())
}

/// `rm_spill`: drop the object's spill block and clear its pointer.
/// No-op (not an error) if the object never had one.
pub fn rm_spill(dnode: &Arc<dyn crate::dnode::DnodeHandle>, index: &HashIndex, dataset: DatasetId, tx: &dyn TxHandle) -> Result<()> {
    let id = DbufId::new(dataset, dnode.object(), crate::types::Level::LEAF, BlockId::Spill);
    if let Some(dbuf) = index.get(&id) {
        let mut g = dbuf.lock();
        let txg = tx.txg();
        check_txg_order(&dbuf, &g, txg)?;
        g.remove_dirty(txg);
        g.frontend = None;
        g.state = StateFlags::UNCACHED;
    }
    dnode.set_spill_blkptr(None);
    tracing::debug!(object = dnode.object().0, "spill removed");
    Ok(())
}

/// `free_range`: punch a hole across `[start_blkid, start_blkid +
/// count)` of `object` within `dataset`, for every leaf dbuf currently
/// resident in `index`. Dbufs not currently cached are left alone —
/// the free is recorded at the dnode/space-map layer (out of scope
/// here) and will simply present as a hole the next time one is
/// instantiated.
pub fn free_range(
    index: &HashIndex,
    dataset: DatasetId,
    object: ObjectNum,
    tx: &dyn TxHandle,
    start_blkid: u64,
    count: u64,
) -> Result<()> {
    let txg = tx.txg();
    for blkid in start_blkid..start_blkid.saturating_add(count) {
        let id = DbufId::new(dataset, object, crate::types::Level::LEAF, BlockId::Data(blkid));
        let Some(dbuf) = index.get(&id) else { continue };
        let block_size = dbuf.block_size();
        let mut g = dbuf.lock();
        check_txg_order(&dbuf, &g, txg)?;

        let filler_active = g.state.contains(StateFlags::FILL);
        match g.find_dirty_mut(txg).and_then(|r| r.as_leaf_mut()) {
            Some(leaf) => {
                leaf.data.zero_range(0, block_size);
                leaf.ranges.clear();
                leaf.needs_resolve = false;
                if filler_active {
                    // §8 scenario 3: tell the active filler its content
                    // will be discarded once it calls `fill_done`.
                    leaf.freed_in_flight = true;
                } else {
                    g.freed_in_flight = true;
                }
            }
            None => {
                let zeroed = ArcBuf::zeroed(block_size as usize, content_type_for(&dbuf));
                let mut record = LeafDirtyRecord::new(txg, zeroed);
                record.needs_resolve = false;
                g.insert_dirty(DirtyRecord::Leaf(record));
                g.debug_assert_dirty_order();
            }
        }

        if !filler_active {
            let data = g.dirty.first().and_then(|r| r.as_leaf()).map(|l| l.data.clone());
            g.frontend = data;
            g.state = StateFlags::CACHED;
        }
        drop(g);
        dbuf.notify_change();
        tracing::debug!(dataset = dataset.0, object = object.0, blkid, txg = txg.0, "range freed");
        metrics::counter!("dbuf_ranges_freed").increment(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arc::MemArc;
    use crate::dbuf::Dbuf;
    use crate::txg::SimpleTx;
    use crate::types::Level;

    fn leaf_dbuf() -> Arc<Dbuf> {
        let arc = Arc::new(MemArc::new());
        let id = DbufId::new(DatasetId(0), ObjectNum(1), Level::LEAF, BlockId::Data(5));
        Arc::new(Dbuf::new_uncached(id, 4096, arc))
    }

    #[test]
    fn will_dirty_on_uncached_reads_through_to_establish_base_content() {
        let d = leaf_dbuf();
        let tx = SimpleTx::open(TxgId(1));
        will_dirty(&d, &tx).unwrap();
        assert_eq!(d.dirty_count(), 1);
        assert_eq!(d.state_snapshot(), StateFlags::CACHED);
    }

    #[test]
    fn will_dirty_range_tracks_partial_coverage_but_is_already_resolved() {
        let d = leaf_dbuf();
        let tx = SimpleTx::open(TxgId(1));
        will_dirty_range(&d, &tx, ByteRange::new(0, 100)).unwrap();
        // Base content was read in full up front, so even a narrow
        // declared range leaves the record immediately valid.
        assert_eq!(d.state_snapshot(), StateFlags::CACHED);
    }

    #[test]
    fn will_fill_then_fill_done_produces_cached_frontend() {
        let d = leaf_dbuf();
        let tx = SimpleTx::open(TxgId(1));
        let buf = will_fill(&d, &tx).unwrap();
        assert_eq!(d.state_snapshot(), StateFlags::PARTIAL.union(StateFlags::FILL));
        buf.write_at(0, &[1, 2, 3, 4]);
        fill_done(&d, &tx).unwrap();
        assert_eq!(d.state_snapshot(), StateFlags::CACHED);
    }

    #[test]
    fn will_not_fill_leaves_record_needing_resolve() {
        let d = leaf_dbuf();
        let tx = SimpleTx::open(TxgId(1));
        will_fill(&d, &tx).unwrap();
        will_not_fill(&d, &tx).unwrap();
        assert_eq!(d.state_snapshot(), StateFlags::PARTIAL);
    }

    #[test]
    fn free_range_on_active_filler_marks_freed_in_flight() {
        let d = leaf_dbuf();
        let tx = SimpleTx::open(TxgId(1));
        let index = HashIndex::new(4);
        index.insert_or_get(d.id, Arc::clone(&d));
        will_fill(&d, &tx).unwrap();
        free_range(&index, DatasetId(0), ObjectNum(1), &tx, 5, 1).unwrap();
        let g = d.lock();
        assert!(g.dirty[0].as_leaf().unwrap().freed_in_flight);
    }

    #[test]
    fn set_override_attaches_to_existing_dirty_record() {
        let d = leaf_dbuf();
        let tx = SimpleTx::open(TxgId(1));
        will_fill(&d, &tx).unwrap();
        let bp = BlockPointer { block_key: 7, physical_size: 4096, logical_size: 4096, is_hole: false, birth_txg: 1 };
        set_override(&d, &tx, bp.clone(), false).unwrap();
        let g = d.lock();
        let leaf = g.dirty[0].as_leaf().unwrap();
        let ov = leaf.override_state.as_ref().unwrap();
        assert_eq!(ov.block_pointer.block_key, bp.block_key);
        assert!(!ov.nopwrite);
    }

    #[test]
    fn set_override_without_dirty_record_is_an_error() {
        let d = leaf_dbuf();
        let tx = SimpleTx::open(TxgId(1));
        let bp = BlockPointer { block_key: 7, physical_size: 4096, logical_size: 4096, is_hole: false, birth_txg: 1 };
        let err = set_override(&d, &tx, bp, false).unwrap_err();
        assert!(matches!(err, DbufError::Invariant(_)));
    }

    #[test]
    fn redirtying_an_existing_record_clears_a_stale_override() {
        let d = leaf_dbuf();
        let tx = SimpleTx::open(TxgId(1));
        will_fill(&d, &tx).unwrap();
        let bp = BlockPointer { block_key: 7, physical_size: 4096, logical_size: 4096, is_hole: false, birth_txg: 1 };
        set_override(&d, &tx, bp, false).unwrap();
        will_dirty_range(&d, &tx, ByteRange::new(0, 2048)).unwrap();
        let g = d.lock();
        assert!(g.dirty[0].as_leaf().unwrap().override_state.is_none());
    }
}
