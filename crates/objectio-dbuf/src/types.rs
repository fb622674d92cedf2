//! Block coordinates and byte ranges.
//!
//! A dbuf is addressed by the tuple `(dataset, object, level, block-id)`.
//! `level == 0` is a data (leaf) block; `level > 0` is an indirect block
//! whose payload is an array of block pointers to children at `level - 1`.
//! Two block-ids are reserved and do not name a real on-disk block: the
//! object's bonus buffer and its spill block.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies the dataset (snapshot-versioned object container) a dbuf
/// belongs to. Opaque beyond equality/ordering — dataset lifecycle is
/// owned by the DSL layer, out of scope here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DatasetId(pub u64);

/// Object number within a dataset, as assigned by the dnode layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectNum(pub u64);

/// Indirection level: 0 is a leaf (data) block, N>0 is an indirect block
/// whose array entries point at children at level N-1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Level(pub u8);

impl Level {
    pub const LEAF: Level = Level(0);

    #[must_use]
    pub const fn is_leaf(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn parent(self) -> Level {
        Level(self.0 + 1)
    }

    #[must_use]
    pub const fn child(self) -> Option<Level> {
        if self.0 == 0 { None } else { Some(Level(self.0 - 1)) }
    }
}

/// A block's position within its level. `Data` is a normal, addressable
/// block; `Bonus` and `Spill` are the two reserved, non-true-block
/// identifiers described in the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BlockId {
    /// An ordinary data or indirect block at the given block number.
    Data(u64),
    /// The embedded fixed-size region inside the object descriptor.
    Bonus,
    /// The overflow region attached to the object descriptor.
    Spill,
}

impl BlockId {
    #[must_use]
    pub const fn is_metadata(self) -> bool {
        matches!(self, BlockId::Bonus | BlockId::Spill)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockId::Data(n) => write!(f, "{n}"),
            BlockId::Bonus => write!(f, "BONUS"),
            BlockId::Spill => write!(f, "SPILL"),
        }
    }
}

/// Unique identity of a dbuf: the key used by the hash index (C1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DbufId {
    pub dataset: DatasetId,
    pub object: ObjectNum,
    pub level: Level,
    pub blkid: BlockId,
}

impl DbufId {
    #[must_use]
    pub const fn new(dataset: DatasetId, object: ObjectNum, level: Level, blkid: BlockId) -> Self {
        Self { dataset, object, level, blkid }
    }
}

impl fmt::Display for DbufId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ds={}, obj={}, lvl={}, blk={}}}",
            self.dataset.0, self.object.0, self.level.0, self.blkid
        )
    }
}

/// A half-open byte range `[start, end)` within a block's frontend.
///
/// The truncation contract here is deliberately explicit: resizing a
/// range always recomputes `end - start`, never `end - size` (see the
/// design notes on the ambiguous source this layer is modeled on).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    #[must_use]
    pub const fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    #[must_use]
    pub const fn size(self) -> u64 {
        self.end - self.start
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.start >= self.end
    }

    /// True if `self` and `other` overlap or are exactly adjacent (so
    /// they should coalesce into a single range).
    #[must_use]
    pub const fn touches(self, other: ByteRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Merge two touching ranges into their union. Caller must have
    /// checked `touches` first.
    #[must_use]
    pub fn union(self, other: ByteRange) -> ByteRange {
        ByteRange::new(self.start.min(other.start), self.end.max(other.end))
    }

    /// Recompute this range's `end` to re-establish `new_size = end -
    /// start`, per the truncation contract above. Used when a dbuf is
    /// resized and outstanding ranges must be clamped to the new block
    /// size.
    #[must_use]
    pub fn truncated_to(self, new_block_size: u64) -> Option<ByteRange> {
        if self.start >= new_block_size {
            return None;
        }
        let end = self.end.min(new_block_size);
        Some(ByteRange::new(self.start, end))
    }
}
