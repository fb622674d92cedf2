//! Block pointers and their storage slots.
//!
//! A real on-disk block pointer format (checksums, DVAs, birth txg,
//! compression) is explicitly out of scope (spec.md §1). What the dbuf
//! layer needs is much narrower: a fixed-size locator it can read out
//! of a parent indirect's buffer or the object descriptor, compare for
//! "hole"-ness, and write back once a child's sync completes. This
//! module provides that narrow slice plus the byte layout used to
//! store one inside an indirect block's frontend, in the same
//! explicit-serialization style `objectio_storage::wal` uses for its
//! record format.

use crate::arc::ArcBuf;
use crate::dbuf::DbufId;

/// Fixed-size on-disk locator this layer treats as opaque beyond
/// `is_hole` and the two size fields needed for space accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockPointer {
    /// Opaque content key used to address the block in the ARC/I-O
    /// pipeline (stands in for a real DVA + checksum).
    pub block_key: u64,
    pub physical_size: u32,
    pub logical_size: u32,
    pub is_hole: bool,
    /// Birth TXG, used only for asserting monotonic overwrite order.
    pub birth_txg: u64,
}

impl BlockPointer {
    pub const ENCODED_LEN: usize = 25;

    #[must_use]
    pub const fn hole() -> Self {
        Self { block_key: 0, physical_size: 0, logical_size: 0, is_hole: true, birth_txg: 0 }
    }

    #[must_use]
    pub fn to_bytes(self) -> [u8; Self::ENCODED_LEN] {
        let mut buf = [0u8; Self::ENCODED_LEN];
        buf[0..8].copy_from_slice(&self.block_key.to_le_bytes());
        buf[8..12].copy_from_slice(&self.physical_size.to_le_bytes());
        buf[12..16].copy_from_slice(&self.logical_size.to_le_bytes());
        buf[16] = u8::from(self.is_hole);
        buf[17..25].copy_from_slice(&self.birth_txg.to_le_bytes());
        buf
    }

    #[must_use]
    pub fn from_bytes(buf: &[u8]) -> Self {
        if buf.len() < Self::ENCODED_LEN || buf.iter().all(|&b| b == 0) {
            return Self::hole();
        }
        Self {
            block_key: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            physical_size: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            logical_size: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            is_hole: buf[16] != 0,
            birth_txg: u64::from_le_bytes(buf[17..25].try_into().unwrap()),
        }
    }
}

/// Where a dbuf's block pointer lives: aliased into the object
/// descriptor for top-level blocks, or into a parent indirect's buffer
/// otherwise (spec.md §3 invariant 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockPointerSlot {
    /// Root block pointer, stored in the dnode's own array at `blkid`.
    Root { blkid: u64 },
    /// Stored inside `parent`'s indirect buffer at `child_index`.
    Indirect { parent: DbufId, child_index: u64 },
    /// The object descriptor's embedded bonus region (spec.md §3
    /// "BONUS"). Not a real block pointer; has no parent.
    Bonus,
    /// The object descriptor's overflow spill pointer (spec.md §3
    /// "SPILL"). Has no parent; the pointer itself lives on the dnode.
    Spill,
}

/// Read the block pointer at `child_index` out of an indirect block's
/// raw frontend bytes.
#[must_use]
pub fn read_child_slot(indirect_buf: &ArcBuf, child_index: u64) -> BlockPointer {
    let offset = child_index * BlockPointer::ENCODED_LEN as u64;
    let bytes = indirect_buf.read_range(offset, offset + BlockPointer::ENCODED_LEN as u64);
    BlockPointer::from_bytes(&bytes)
}

/// Write a block pointer into an indirect block's raw frontend bytes
/// at `child_index`. Requires the parent's dirty-record mutex to be
/// held by the caller (§4.4 "Dirty parent") — not enforced here, only
/// documented, since the lock lives on the owning `Dbuf`.
pub fn write_child_slot(indirect_buf: &ArcBuf, child_index: u64, bp: BlockPointer) {
    let offset = child_index * BlockPointer::ENCODED_LEN as u64;
    indirect_buf.write_at(offset, &bp.to_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let bp = BlockPointer {
            block_key: 0xdead_beef,
            physical_size: 4096,
            logical_size: 8192,
            is_hole: false,
            birth_txg: 7,
        };
        assert_eq!(BlockPointer::from_bytes(&bp.to_bytes()), bp);
    }

    #[test]
    fn zeroed_bytes_decode_as_hole() {
        let zero = [0u8; BlockPointer::ENCODED_LEN];
        assert!(BlockPointer::from_bytes(&zero).is_hole);
    }

    #[test]
    fn child_slot_roundtrip_in_buffer() {
        let buf = ArcBuf::zeroed(BlockPointer::ENCODED_LEN * 4, crate::arc::ArcBufContentType::Metadata);
        let bp = BlockPointer { block_key: 5, physical_size: 10, logical_size: 20, is_hole: false, birth_txg: 1 };
        write_child_slot(&buf, 2, bp);
        assert_eq!(read_child_slot(&buf, 2), bp);
        assert!(read_child_slot(&buf, 0).is_hole);
    }
}
