//! The dbuf entity (C2, spec.md §3 "Dbuf").
//!
//! `Dbuf` owns the per-dbuf mutex and condition variable everything
//! else in this crate synchronizes on. Its fields mirror the data
//! model in spec.md §3 exactly; the state machine (§4.3), dirty path
//! (§4.4), sync path (§4.5), read path (§4.6), and hold/eviction (§4.2,
//! §4.7) are implemented as methods spread across sibling modules
//! (`dirty_path`, `sync`, `read`, `hold`) operating on `&Dbuf` /
//! `DbufInner` rather than crammed into this one file, the same way
//! `objectio_storage::metadata` splits `MetadataStore` across
//! `wal`/`btree`/`cache`/`store`.

use crate::arc::{ArcBackend, ArcBuf};
use crate::blkptr::{BlockPointer, BlockPointerSlot};
use crate::dnode::DnodeHandle;
use crate::dirty_record::DirtyRecord;
use crate::state::StateFlags;
use crate::txg::TxgId;
use crate::user::DbufUserCallback;
pub use crate::types::DbufId;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::Arc;

/// Everything about a dbuf that lives behind its mutex.
pub struct DbufInner {
    pub state: StateFlags,
    pub frontend: Option<ArcBuf>,
    pub block_size: u64,
    /// Newest-first, strictly decreasing by TXG (§3 invariant 2).
    pub dirty: Vec<DirtyRecord>,
    /// The oldest dirty record, if any, handed to the sync path.
    pub data_pending: Option<TxgId>,
    pub hold_count: usize,
    pub block_pointer: BlockPointer,
    pub user: Option<Arc<dyn DbufUserCallback>>,
    /// Set when a `free_range` races an active filler (§8 scenario 3).
    pub freed_in_flight: bool,
}

impl DbufInner {
    #[must_use]
    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    #[must_use]
    pub fn find_dirty(&self, txg: TxgId) -> Option<&DirtyRecord> {
        self.dirty.iter().find(|r| r.txg() == txg)
    }

    #[must_use]
    pub fn find_dirty_mut(&mut self, txg: TxgId) -> Option<&mut DirtyRecord> {
        self.dirty.iter_mut().find(|r| r.txg() == txg)
    }

    #[must_use]
    pub fn newest_dirty(&self) -> Option<&DirtyRecord> {
        self.dirty.first()
    }

    #[must_use]
    pub fn oldest_dirty(&self) -> Option<&DirtyRecord> {
        self.dirty.last()
    }

    /// Insert a new dirty record, keeping the list newest-first. Only
    /// the meta-dnode object is permitted to insert out of strictly
    /// decreasing order (§3 invariant 2); callers are expected to have
    /// already checked that exception applies before calling this with
    /// an out-of-order TXG.
    pub fn insert_dirty(&mut self, record: DirtyRecord) {
        let pos = self.dirty.iter().position(|r| r.txg() < record.txg()).unwrap_or(self.dirty.len());
        self.dirty.insert(pos, record);
    }

    pub fn remove_dirty(&mut self, txg: TxgId) -> Option<DirtyRecord> {
        let pos = self.dirty.iter().position(|r| r.txg() == txg)?;
        Some(self.dirty.remove(pos))
    }

    /// Validate the strictly-decreasing-TXG invariant (§3 invariant 2,
    /// §8 "consecutive dirty records"). Debug-only: a violation here
    /// means a bug upstream, not a recoverable condition.
    pub fn debug_assert_dirty_order(&self) {
        for w in self.dirty.windows(2) {
            debug_assert!(w[0].txg() > w[1].txg(), "dirty records must be strictly TXG-decreasing");
        }
    }
}

/// A single cached block. See module docs and spec.md §3.
pub struct Dbuf {
    pub id: DbufId,
    pub(crate) concurrent_txgs: usize,
    pub(crate) arc: Arc<dyn ArcBackend>,
    pub(crate) dnode: Option<Arc<dyn DnodeHandle>>,
    pub(crate) parent: Option<Arc<Dbuf>>,
    pub(crate) blkptr_slot: BlockPointerSlot,
    inner: Mutex<DbufInner>,
    /// `db_changed`: signaled on every state transition so waiters in
    /// `read`/`will_fill` can recheck their exit condition (§4.6).
    changed: Condvar,
}

impl Dbuf {
    #[must_use]
    pub fn new(
        id: DbufId,
        block_size: u64,
        arc: Arc<dyn ArcBackend>,
        dnode: Option<Arc<dyn DnodeHandle>>,
        parent: Option<Arc<Dbuf>>,
        blkptr_slot: BlockPointerSlot,
        concurrent_txgs: usize,
    ) -> Self {
        Self {
            id,
            concurrent_txgs,
            arc,
            dnode,
            parent,
            blkptr_slot,
            inner: Mutex::new(DbufInner {
                state: StateFlags::UNCACHED,
                frontend: None,
                block_size,
                dirty: Vec::new(),
                data_pending: None,
                hold_count: 0,
                block_pointer: BlockPointer::hole(),
                user: None,
                freed_in_flight: false,
            }),
            changed: Condvar::new(),
        }
    }

    /// Construct a root-level, parentless dbuf for standalone tests
    /// that don't need a full dnode/parent graph.
    #[must_use]
    pub fn new_uncached(id: DbufId, block_size: u64, arc: Arc<dyn ArcBackend>) -> Self {
        Self::new(id, block_size, arc, None, None, BlockPointerSlot::Root { blkid: 0 }, 3)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, DbufInner> {
        self.inner.lock()
    }

    #[must_use]
    pub fn state_snapshot(&self) -> StateFlags {
        self.inner.lock().state
    }

    #[must_use]
    pub fn hold_count(&self) -> usize {
        self.inner.lock().hold_count
    }

    #[must_use]
    pub fn block_size(&self) -> u64 {
        self.inner.lock().block_size
    }

    #[must_use]
    pub fn dirty_count(&self) -> usize {
        self.inner.lock().dirty_count()
    }

    pub(crate) fn wait_for_change(&self, guard: &mut MutexGuard<'_, DbufInner>) {
        self.changed.wait(guard);
    }

    pub(crate) fn notify_change(&self) {
        self.changed.notify_all();
    }

    /// Test-only hook letting the hash-index tests put a dbuf straight
    /// into `EVICTING` without driving the full hold/rele lifecycle.
    #[cfg(test)]
    pub(crate) fn mark_evicting_for_test(&self) {
        self.inner.lock().state = StateFlags::EVICTING;
    }

    /// Read this dbuf's block pointer out of its slot (the object
    /// descriptor's root array, or the parent indirect's buffer),
    /// refreshing `inner.block_pointer`. Spec.md §3 invariant 6: the
    /// parent must be held and not concurrently rewritten by the sync
    /// path while this read happens — enforced by taking the dnode's
    /// `struct_rwlock` (root case) or the parent's own dbuf mutex
    /// (indirect case) for the duration of the read.
    pub fn refresh_block_pointer(&self) {
        let bp = match self.blkptr_slot {
            BlockPointerSlot::Root { blkid } => {
                let dnode = self.dnode.as_ref().expect("root slot requires a dnode");
                let phys = dnode.struct_rwlock().read();
                phys.root_blkptrs.get(blkid as usize).copied().unwrap_or_else(BlockPointer::hole)
            }
            BlockPointerSlot::Indirect { child_index, .. } => {
                let parent = self.parent.as_ref().expect("indirect slot requires a parent");
                let parent_guard = parent.lock();
                match &parent_guard.frontend {
                    Some(buf) => crate::blkptr::read_child_slot(buf, child_index),
                    None => BlockPointer::hole(),
                }
            }
            BlockPointerSlot::Bonus => BlockPointer::hole(),
            BlockPointerSlot::Spill => {
                let dnode = self.dnode.as_ref().expect("spill slot requires a dnode");
                dnode.spill_blkptr().unwrap_or_else(BlockPointer::hole)
            }
        };
        self.inner.lock().block_pointer = bp;
    }

    #[must_use]
    pub fn is_hole(&self) -> bool {
        self.inner.lock().block_pointer.is_hole
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arc::MemArc;
    use crate::types::{BlockId, DatasetId, Level, ObjectNum};

    fn make() -> Dbuf {
        let arc = Arc::new(MemArc::new());
        Dbuf::new_uncached(
            DbufId::new(DatasetId(0), ObjectNum(1), Level(0), BlockId::Data(1)),
            4096,
            arc,
        )
    }

    #[test]
    fn starts_uncached_with_no_dirty() {
        let d = make();
        assert_eq!(d.state_snapshot(), StateFlags::UNCACHED);
        assert_eq!(d.dirty_count(), 0);
        assert_eq!(d.hold_count(), 0);
    }

    #[test]
    fn dirty_records_stay_ordered_on_insert() {
        let d = make();
        let buf = || crate::arc::ArcBuf::zeroed(4, crate::arc::ArcBufContentType::Data);
        let mut g = d.lock();
        g.insert_dirty(DirtyRecord::Leaf(crate::dirty_record::LeafDirtyRecord::new(TxgId(2), buf())));
        g.insert_dirty(DirtyRecord::Leaf(crate::dirty_record::LeafDirtyRecord::new(TxgId(4), buf())));
        g.insert_dirty(DirtyRecord::Leaf(crate::dirty_record::LeafDirtyRecord::new(TxgId(3), buf())));
        let txgs: Vec<_> = g.dirty.iter().map(|r| r.txg().0).collect();
        assert_eq!(txgs, vec![4, 3, 2]);
        g.debug_assert_dirty_order();
    }
}
