//! The object-descriptor collaborator (spec.md §6 "Consumed from
//! object layer"). The dnode layer itself — size accounting, object
//! allocation/free, the SA (system attribute) bonus layout — is out of
//! scope; this module carries only what the dirty/sync paths read
//! through a dnode: its indirection depth and root block pointers (both
//! guarded by `struct_rwlock` for stability while read), its bonus and
//! spill slots, and the per-object dbuf list (`dbufs_mtx`) that
//! `free_range` walks.

use crate::blkptr::BlockPointer;
use crate::dbuf::DbufId;
use crate::txg::TxgId;
use crate::types::ObjectNum;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Stable fields guarded by the dnode's `struct_rwlock`: indirection
/// depth and the root block pointer array. Both can change together
/// (growing the object adds a level and reparents the root pointers),
/// which is exactly the race `struct_rwlock` exists to prevent callers
/// from observing half of.
#[derive(Debug, Clone, Default)]
pub struct DnodePhys {
    pub nlevels: u8,
    pub root_blkptrs: Vec<BlockPointer>,
}

/// The object-layer collaborator a dbuf holds a reference to.
pub trait DnodeHandle: Send + Sync {
    fn object(&self) -> ObjectNum;
    fn block_size(&self) -> u32;

    /// Guards `nlevels` and the root block pointer array (§6
    /// "struct_rwlock for nlevels/blkptr stability").
    fn struct_rwlock(&self) -> &RwLock<DnodePhys>;

    /// Guards the per-object list of live dbufs, walked by
    /// `free_range` (§4.4) and by the indirect-sync child drive (§4.5).
    fn dbufs_mtx(&self) -> &Mutex<Vec<DbufId>>;

    fn register_dbuf(&self, id: DbufId) {
        let mut list = self.dbufs_mtx().lock();
        if !list.contains(&id) {
            list.push(id);
        }
    }

    fn unregister_dbuf(&self, id: DbufId) {
        self.dbufs_mtx().lock().retain(|x| x != &id);
    }

    fn list_dbufs(&self) -> Vec<DbufId> {
        self.dbufs_mtx().lock().clone()
    }

    /// Read the object's bonus buffer content.
    fn read_bonus(&self) -> Vec<u8>;
    /// Overwrite the object's bonus buffer (the target of bonus sync,
    /// §4.5 "Bonus sync": no I/O is issued by the dbuf layer itself).
    fn write_bonus(&self, data: &[u8]);
    fn bonus_len(&self) -> usize;

    fn spill_blkptr(&self) -> Option<BlockPointer>;
    fn set_spill_blkptr(&self, bp: Option<BlockPointer>);

    /// Hold/release the dnode itself, independent of any one dbuf's
    /// hold count (§6 "Hold/release").
    fn hold(&self);
    fn release(&self);

    /// Records that this dnode itself became dirty in `txg`. Only the
    /// meta-dnode object is permitted to dirty an older, already-open
    /// TXG (§3 invariant 2) — enforcement of that exception lives with
    /// the dirty path, which consults `is_meta_dnode`.
    fn mark_dirty(&self, txg: TxgId);

    fn is_meta_dnode(&self) -> bool {
        false
    }
}

/// A minimal in-memory `DnodeHandle`, sized for tests and for
/// standalone embedding of `objectio-dbuf`.
pub struct MemDnode {
    object: ObjectNum,
    block_size: u32,
    phys: RwLock<DnodePhys>,
    dbufs: Mutex<Vec<DbufId>>,
    bonus: Mutex<Vec<u8>>,
    spill: Mutex<Option<BlockPointer>>,
    holds: AtomicUsize,
    meta: bool,
    bonus_capacity: AtomicU32,
}

impl MemDnode {
    #[must_use]
    pub fn new(object: ObjectNum, block_size: u32, nlevels: u8, bonus_capacity: u32) -> Self {
        Self {
            object,
            block_size,
            phys: RwLock::new(DnodePhys { nlevels, root_blkptrs: vec![BlockPointer::hole(); 1] }),
            dbufs: Mutex::new(Vec::new()),
            bonus: Mutex::new(vec![0u8; bonus_capacity as usize]),
            spill: Mutex::new(None),
            holds: AtomicUsize::new(0),
            meta: false,
            bonus_capacity: AtomicU32::new(bonus_capacity),
        }
    }

    #[must_use]
    pub fn meta_dnode(object: ObjectNum, block_size: u32) -> Self {
        let mut dn = Self::new(object, block_size, 1, 0);
        dn.meta = true;
        dn
    }

    #[must_use]
    pub fn hold_count(&self) -> usize {
        self.holds.load(Ordering::Relaxed)
    }
}

impl DnodeHandle for MemDnode {
    fn object(&self) -> ObjectNum {
        self.object
    }

    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn struct_rwlock(&self) -> &RwLock<DnodePhys> {
        &self.phys
    }

    fn dbufs_mtx(&self) -> &Mutex<Vec<DbufId>> {
        &self.dbufs
    }

    fn read_bonus(&self) -> Vec<u8> {
        self.bonus.lock().clone()
    }

    fn write_bonus(&self, data: &[u8]) {
        let mut b = self.bonus.lock();
        b.clear();
        b.extend_from_slice(data);
        self.bonus_capacity.store(b.len() as u32, Ordering::Relaxed);
    }

    fn bonus_len(&self) -> usize {
        self.bonus.lock().len()
    }

    fn spill_blkptr(&self) -> Option<BlockPointer> {
        *self.spill.lock()
    }

    fn set_spill_blkptr(&self, bp: Option<BlockPointer>) {
        *self.spill.lock() = bp;
    }

    fn hold(&self) {
        self.holds.fetch_add(1, Ordering::AcqRel);
    }

    fn release(&self) {
        self.holds.fetch_sub(1, Ordering::AcqRel);
    }

    fn mark_dirty(&self, _txg: TxgId) {}

    fn is_meta_dnode(&self) -> bool {
        self.meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dbuf_registration_is_idempotent() {
        let dn = MemDnode::new(ObjectNum(1), 4096, 2, 256);
        let id = DbufId::new(
            crate::types::DatasetId(0),
            ObjectNum(1),
            crate::types::Level(0),
            crate::types::BlockId::Data(3),
        );
        dn.register_dbuf(id);
        dn.register_dbuf(id);
        assert_eq!(dn.list_dbufs().len(), 1);
        dn.unregister_dbuf(id);
        assert!(dn.list_dbufs().is_empty());
    }

    #[test]
    fn bonus_round_trips() {
        let dn = MemDnode::new(ObjectNum(1), 4096, 1, 64);
        dn.write_bonus(&[1, 2, 3]);
        assert_eq!(dn.read_bonus(), vec![1, 2, 3]);
    }
}
