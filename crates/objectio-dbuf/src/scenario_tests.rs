//! End-to-end scenarios exercising the dirty, sync, and read paths
//! together instead of one module in isolation (spec.md §8 "End-to-end
//! scenarios"). Each per-module `#[cfg(test)]` block already covers
//! that module's own unit behavior; this file is the crate's
//! integration layer, colocated rather than under `tests/` since
//! exercising these flows needs the same `pub(crate)` internals
//! (`Dbuf::lock`) the module tests do.

use crate::arc::{
    ArcBackend, ArcBuf, ArcBufContentType, ArcOwner, ArcWriteHandle, EvictionCallback,
    PendingRead, ReadFlags, ReadOutcome, ReadPriority, WriteDoneCallback,
};
use crate::dbuf::{Dbuf, DbufId};
use crate::dirty_path;
use crate::dirty_record::{DirtyRecord, LeafDirtyRecord};
use crate::dnode::{DnodeHandle, MemDnode};
use crate::error::DbufError;
use crate::hash::HashIndex;
use crate::hold;
use crate::read;
use crate::state::StateFlags;
use crate::sync as sync_path;
use crate::txg::{SimpleTx, TxgId};
use crate::types::{BlockId, ByteRange, DatasetId, Level, ObjectNum};
use crate::user::EvictionQueue;
use std::sync::Arc;

fn leaf_id(ds: u64, obj: u64, blk: u64) -> DbufId {
    DbufId::new(DatasetId(ds), ObjectNum(obj), Level::LEAF, BlockId::Data(blk))
}

#[test]
fn scenario_1_two_txg_overwrite() {
    let arc: Arc<dyn ArcBackend> = Arc::new(crate::arc::MemArc::new());
    let id = leaf_id(1, 42, 7);
    let dbuf = Arc::new(Dbuf::new_uncached(id, 4096, Arc::clone(&arc)));
    let index = HashIndex::new(4);
    index.insert_or_get(id, Arc::clone(&dbuf));

    let tx1 = SimpleTx::open(TxgId(1));
    let buf1 = dirty_path::will_fill(&dbuf, &tx1).unwrap();
    buf1.write_at(0, &[0xAAu8; 4096]);
    dirty_path::fill_done(&dbuf, &tx1).unwrap();
    assert_eq!(dbuf.dirty_count(), 1);

    // TXG=1 is closed but not yet synced when TXG=2 starts writing, so
    // both dirty records coexist.
    let tx2 = SimpleTx::open(TxgId(2));
    dirty_path::will_dirty_range(&dbuf, &tx2, ByteRange::new(100, 200)).unwrap();
    assert_eq!(dbuf.dirty_count(), 2);

    let mut evictions = EvictionQueue::new();
    let buf2 = read::read(&dbuf, ReadFlags::empty(), &mut evictions).unwrap();
    buf2.write_at(100, &[0xBBu8; 100]);

    {
        let g = dbuf.lock();
        let newest = g.dirty.first().unwrap().as_leaf().unwrap();
        let oldest = g.dirty.last().unwrap().as_leaf().unwrap();
        assert!(!newest.data.aliases(&oldest.data), "COW split must isolate TXG=2 from TXG=1's buffer");
        assert_eq!(newest.ranges.as_slice(), &[ByteRange::new(100, 200)]);
    }

    sync_path::sync_leaf(&dbuf, TxgId(1), &index, &mut evictions).unwrap();
    assert_eq!(dbuf.dirty_count(), 1);

    let front = read::read(&dbuf, ReadFlags::empty(), &mut evictions).unwrap();
    assert_eq!(front.read_range(0, 100), vec![0xAAu8; 100]);
    assert_eq!(front.read_range(100, 200), vec![0xBBu8; 100]);
    assert_eq!(front.read_range(200, 4096), vec![0xAAu8; 4096 - 200]);
}

#[test]
fn scenario_2_partial_write_then_read_resolve() {
    let arc: Arc<dyn ArcBackend> = Arc::new(crate::arc::MemArc::new());
    let id = leaf_id(1, 1, 0);
    let dbuf = Arc::new(Dbuf::new_uncached(id, 4096, arc));

    let written = ArcBuf::zeroed(4096, ArcBufContentType::Data);
    written.write_at(1024, &[0xCCu8; 1024]);
    let mut leaf = LeafDirtyRecord::new(TxgId(1), written);
    leaf.ranges.insert(ByteRange::new(1024, 2048));
    leaf.needs_resolve = true;
    leaf.write_deferred = true; // a stashed deferred write to dispatch on resolve
    {
        let mut g = dbuf.lock();
        g.dirty.push(DirtyRecord::Leaf(leaf));
        g.hold_count += 1; // the TXG-scoped hold `dirty_leaf` would have taken
        g.state = StateFlags::PARTIAL.union(StateFlags::FILL);
    }
    assert_eq!(dbuf.state_snapshot(), StateFlags::PARTIAL.union(StateFlags::FILL));

    let base = ArcBuf::zeroed(4096, ArcBufContentType::Data);
    base.write_at(0, &[0xDDu8; 4096]);
    let mut evictions = EvictionQueue::new();
    read::resolve(&dbuf, base, false, &mut evictions);

    let front = dbuf.lock().frontend.clone().unwrap();
    assert_eq!(front.read_range(0, 1024), vec![0xDDu8; 1024]);
    assert_eq!(front.read_range(1024, 2048), vec![0xCCu8; 1024]);
    assert_eq!(front.read_range(2048, 4096), vec![0xDDu8; 2048]);
    assert_eq!(dbuf.state_snapshot(), StateFlags::CACHED);

    // The stashed deferred write was dispatched and completed inline.
    assert_eq!(dbuf.dirty_count(), 0);
    assert_eq!(dbuf.hold_count(), 0);
}

#[test]
fn scenario_3_free_range_races_filler() {
    let arc: Arc<dyn ArcBackend> = Arc::new(crate::arc::MemArc::new());
    let id = leaf_id(1, 2, 9);
    let dbuf = Arc::new(Dbuf::new_uncached(id, 4096, arc));
    let index = HashIndex::new(4);
    index.insert_or_get(id, Arc::clone(&dbuf));

    let tx = SimpleTx::open(TxgId(1));
    let buf = dirty_path::will_fill(&dbuf, &tx).unwrap();
    buf.write_at(0, &[0x11u8; 4096]);

    dirty_path::free_range(&index, DatasetId(1), ObjectNum(2), &tx, 9, 1).unwrap();
    assert!(dbuf.lock().dirty[0].as_leaf().unwrap().freed_in_flight);

    dirty_path::fill_done(&dbuf, &tx).unwrap();

    let g = dbuf.lock();
    assert_eq!(g.state, StateFlags::CACHED);
    let front = g.frontend.clone().unwrap();
    assert_eq!(front.read_range(0, 4096), vec![0u8; 4096]);
    assert!(g.dirty[0].as_leaf().unwrap().ranges.is_empty());
}

#[test]
fn scenario_4_cow_split_on_pending_sync() {
    let arc: Arc<dyn ArcBackend> = Arc::new(crate::arc::MemArc::new());
    let id = leaf_id(1, 3, 1);
    let dbuf = Arc::new(Dbuf::new_uncached(id, 4096, arc));

    let tx1 = SimpleTx::open(TxgId(1));
    let buf1 = dirty_path::will_fill(&dbuf, &tx1).unwrap();
    buf1.write_at(0, &[1u8; 4096]);
    dirty_path::fill_done(&dbuf, &tx1).unwrap();
    let original = dbuf.lock().frontend.clone().unwrap();
    assert!(dbuf.lock().dirty[0].as_leaf().unwrap().data.aliases(&original));

    // The sync path has begun: data_pending is set, committing this
    // TXG's buffer to an I/O that must not observe later mutation.
    dbuf.lock().data_pending = Some(TxgId(1));

    let tx2 = SimpleTx::open(TxgId(2));
    let buf2 = dirty_path::will_fill(&dbuf, &tx2).unwrap();
    buf2.write_at(0, &[2u8; 4096]);
    dirty_path::fill_done(&dbuf, &tx2).unwrap();

    let g = dbuf.lock();
    let txg1_record = g.find_dirty(TxgId(1)).unwrap().as_leaf().unwrap();
    let txg2_record = g.find_dirty(TxgId(2)).unwrap().as_leaf().unwrap();
    assert!(!txg1_record.data.aliases(&txg2_record.data));
    assert_eq!(txg1_record.data.read_range(0, 4), vec![1u8; 4]);
    assert_eq!(txg2_record.data.read_range(0, 4), vec![2u8; 4]);
}

/// An `ArcBackend` whose reads always fail, driving the §7.2/§7.3
/// "outstanding dirty" failure path.
struct FailingArc(crate::arc::MemArc);

impl ArcBackend for FailingArc {
    fn alloc(&self, size: usize, owner: ArcOwner, content_type: ArcBufContentType) -> ArcBuf {
        self.0.alloc(size, owner, content_type)
    }
    fn read(&self, _block_key: u64, _logical_size: u32, _priority: ReadPriority, _flags: ReadFlags) -> ReadOutcome {
        ReadOutcome::Pending(PendingRead::ready(Err(DbufError::io("failing", std::io::Error::other("simulated read failure")))))
    }
    fn write(
        &self,
        txg: TxgId,
        block_key: u64,
        data: ArcBuf,
        ready_cb: Option<Box<dyn FnOnce() + Send>>,
        done_cb: WriteDoneCallback,
    ) -> ArcWriteHandle {
        self.0.write(txg, block_key, data, ready_cb, done_cb)
    }
    fn release(&self, buf: &ArcBuf, owner: ArcOwner) {
        self.0.release(buf, owner);
    }
    fn freeze(&self, buf: &ArcBuf) {
        self.0.freeze(buf);
    }
    fn thaw(&self, buf: &ArcBuf) {
        self.0.thaw(buf);
    }
    fn set_callback(&self, buf: &ArcBuf, cb: Arc<dyn EvictionCallback>) {
        self.0.set_callback(buf, cb);
    }
    fn remove_ref(&self, buf: &ArcBuf, owner: ArcOwner) -> bool {
        self.0.remove_ref(buf, owner)
    }
    fn buf_size(&self, buf: &ArcBuf) -> usize {
        self.0.buf_size(buf)
    }
    fn released(&self, buf: &ArcBuf) -> bool {
        self.0.released(buf)
    }
    fn frozen(&self, buf: &ArcBuf) -> bool {
        self.0.frozen(buf)
    }
    fn loan_buf(&self, buf: &ArcBuf) -> ArcBuf {
        self.0.loan_buf(buf)
    }
    fn return_buf(&self, buf: ArcBuf) {
        self.0.return_buf(buf);
    }
}

#[test]
fn scenario_5_read_failure_with_outstanding_dirty() {
    let arc: Arc<dyn ArcBackend> = Arc::new(FailingArc(crate::arc::MemArc::new()));
    let id = leaf_id(1, 4, 2);
    let dbuf = Arc::new(Dbuf::new_uncached(id, 4096, arc));

    let written = ArcBuf::zeroed(4096, ArcBufContentType::Data);
    written.write_at(1024, &[0xCCu8; 1024]);
    let mut leaf = LeafDirtyRecord::new(TxgId(1), written);
    leaf.ranges.insert(ByteRange::new(1024, 2048));
    leaf.needs_resolve = true;
    {
        let mut g = dbuf.lock();
        g.dirty.push(DirtyRecord::Leaf(leaf));
        g.state = StateFlags::PARTIAL;
        // A hole block pointer would satisfy the read with a synthesized
        // zero buffer without ever reaching the backend (read.rs), which
        // would not exercise the failure path this scenario is about.
        // Point at a real (non-hole) block so `FailingArc::read` actually
        // runs and returns its error.
        g.block_pointer = crate::blkptr::BlockPointer {
            block_key: 1,
            physical_size: 4096,
            logical_size: 4096,
            is_hole: false,
            birth_txg: 0,
        };
    }

    let mut evictions = EvictionQueue::new();
    let front = read::read(&dbuf, ReadFlags::empty(), &mut evictions)
        .expect("read failure with outstanding dirty is absorbed, not propagated");

    // The backing read failed; §7.3 zero-fills the gaps and resolves as
    // if the read had returned all-zero content, rather than propagating
    // the error to the caller.
    assert_eq!(front.read_range(0, 1024), vec![0u8; 1024]);
    assert_eq!(front.read_range(1024, 2048), vec![0xCCu8; 1024]);
    assert_eq!(front.read_range(2048, 4096), vec![0u8; 2048]);
    assert_eq!(dbuf.state_snapshot(), StateFlags::CACHED);

    // §7.3 accounts for the loss by retaining the dirty record rather
    // than discarding it outright (the write it represents still needs
    // to reach a sync), but the record is no longer waiting on a read:
    // `dbuf_dirty_writes_lost` fired and its gaps were zero-filled in
    // place of the lost backing content instead of the read being
    // retried or propagated.
    let g = dbuf.lock();
    assert_eq!(g.dirty.len(), 1);
    let leaf = g.dirty[0].as_leaf().unwrap();
    assert!(!leaf.needs_resolve);
    assert!(leaf.ranges.is_empty());
}

#[test]
fn scenario_6_eviction_under_duplicate_then_fresh_reallocation() {
    let arc: Arc<dyn ArcBackend> = Arc::new(crate::arc::MemArc::new());
    let dnode: Arc<dyn DnodeHandle> = Arc::new(MemDnode::new(ObjectNum(5), 4096, 1, 0));
    let index = HashIndex::new(4);

    let d = hold::hold(&index, DatasetId(1), &arc, &dnode, Level::LEAF, BlockId::Data(0), false, 3).unwrap();
    {
        let mut g = d.lock();
        g.frontend = Some(ArcBuf::zeroed(4096, ArcBufContentType::Data));
        g.state = StateFlags::CACHED;
    }
    let mut evictions = EvictionQueue::new();
    hold::rele(&index, &d, &mut evictions);

    assert_eq!(d.state_snapshot(), StateFlags::EVICTING);
    assert!(index.get(&d.id).is_none());

    let fresh = hold::hold(&index, DatasetId(1), &arc, &dnode, Level::LEAF, BlockId::Data(0), false, 3).unwrap();
    assert!(!Arc::ptr_eq(&fresh, &d));
    assert_eq!(fresh.state_snapshot(), StateFlags::UNCACHED);
    assert_eq!(fresh.hold_count(), 1);
}
