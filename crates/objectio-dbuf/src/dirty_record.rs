//! The dirty-record pipeline (C3, spec.md §3 "Dirty record" / §4.4).
//!
//! A dirty record carries one TXG's in-progress write content for a
//! dbuf. Leaf (level-0) records additionally track which byte ranges
//! of that content are known-valid so a partial write can be merged
//! with a still-pending read-modify-write fill; indirect records
//! instead track the set of child records that must complete before
//! the indirect's own write may be considered durable.

use crate::arc::ArcBuf;
use crate::blkptr::BlockPointer;
use crate::dbuf::DbufId;
use crate::txg::TxgId;
use crate::types::ByteRange;
use parking_lot::Mutex;

/// A sorted, disjoint set of byte ranges known valid in a leaf dirty
/// record's buffer (spec.md §4.4 "Range accumulation").
#[derive(Debug, Default, Clone)]
pub struct WriteRanges {
    ranges: Vec<ByteRange>,
}

impl WriteRanges {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[ByteRange] {
        &self.ranges
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    /// Merge `[start, end)` into the range set, coalescing with any
    /// range it touches or overlaps. Maintains the §8 invariant that
    /// adjacent stored ranges never overlap and are never merely
    /// touching (strict `r.end < s.start` between neighbors).
    pub fn insert(&mut self, new: ByteRange) {
        if new.is_empty() {
            return;
        }
        let mut merged = new;
        let mut kept = Vec::with_capacity(self.ranges.len() + 1);
        for r in self.ranges.drain(..) {
            if merged.touches(r) {
                merged = merged.union(r);
            } else {
                kept.push(r);
            }
        }
        kept.push(merged);
        kept.sort_by_key(|r| r.start);
        self.ranges = kept;
    }

    /// True once the accumulated ranges cover `[0, block_size)`
    /// exactly — the point at which a partial write has become a full
    /// one (§4.4: "If the union equals `[0, block_size)`, ranges are
    /// cleared and the state advances").
    #[must_use]
    pub fn covers_whole_block(&self, block_size: u64) -> bool {
        self.ranges.len() == 1 && self.ranges[0] == ByteRange::new(0, block_size)
    }

    /// The complement of the stored ranges within `[0, block_size)` —
    /// the holes a resolving read must fill.
    #[must_use]
    pub fn gaps(&self, block_size: u64) -> Vec<ByteRange> {
        let mut gaps = Vec::new();
        let mut cursor = 0u64;
        for r in &self.ranges {
            if r.start > cursor {
                gaps.push(ByteRange::new(cursor, r.start));
            }
            cursor = cursor.max(r.end);
        }
        if cursor < block_size {
            gaps.push(ByteRange::new(cursor, block_size));
        }
        gaps
    }

    /// Re-clamp every stored range so that `size = end - start` holds
    /// against a new block size, dropping ranges that fall entirely
    /// past it. This is the explicit truncation contract spec.md §9
    /// asks re-implementers to adopt in place of the ambiguous
    /// `range->size = range->end - range->size` expression found in the
    /// system this layer is modeled on.
    pub fn truncate_to(&mut self, new_block_size: u64) {
        self.ranges = self
            .ranges
            .iter()
            .filter_map(|r| r.truncated_to(new_block_size))
            .collect();
    }
}

/// A synchronous, pre-committed write (the `dmu_sync`-style immediate
/// write path, §4.5 "Override").
#[derive(Debug, Clone)]
pub struct OverrideState {
    pub block_pointer: BlockPointer,
    /// True if the provided pointer should be revalidated against
    /// current content rather than blindly trusted (nopwrite).
    pub nopwrite: bool,
}

/// A leaf (level-0) dirty record.
pub struct LeafDirtyRecord {
    pub txg: TxgId,
    /// `dr_data`: this TXG's write content.
    pub data: ArcBuf,
    pub ranges: WriteRanges,
    pub override_state: Option<OverrideState>,
    /// Set when a resolving read is outstanding and the write I/O for
    /// this record has been deferred until it completes (§4.5 "Leaf
    /// sync"). Cleared once the deferred write is actually issued.
    pub write_deferred: bool,
    /// Set by `free_range` racing an active filler (§8 scenario 3).
    pub freed_in_flight: bool,
    /// True while `ranges` is a genuine partial-write accumulator that
    /// still needs merging against older content before this record's
    /// buffer is authoritative. An empty `ranges` is ambiguous on its
    /// own — it means "nothing written yet" while this is set, and
    /// "already fully valid" once it is cleared — so every reader of
    /// `ranges` must gate on this flag rather than on emptiness alone.
    pub needs_resolve: bool,
}

impl LeafDirtyRecord {
    #[must_use]
    pub fn new(txg: TxgId, data: ArcBuf) -> Self {
        Self {
            txg,
            data,
            ranges: WriteRanges::new(),
            override_state: None,
            write_deferred: false,
            freed_in_flight: false,
            needs_resolve: false,
        }
    }
}

/// An indirect (level>0) dirty record.
pub struct IndirectDirtyRecord {
    pub txg: TxgId,
    /// Child dirty records that reference this indirect as their
    /// parent, guarded by this record's own mutex (§3 "Dirty record
    /// (indirect)"; lock order: parent indirect dirty-record mutex >
    /// dbuf mutex, per §5).
    pub children: Mutex<Vec<DbufId>>,
}

impl IndirectDirtyRecord {
    #[must_use]
    pub fn new(txg: TxgId) -> Self {
        Self { txg, children: Mutex::new(Vec::new()) }
    }
}

/// A dirty record, leaf or indirect.
pub enum DirtyRecord {
    Leaf(LeafDirtyRecord),
    Indirect(IndirectDirtyRecord),
}

impl DirtyRecord {
    #[must_use]
    pub fn txg(&self) -> TxgId {
        match self {
            DirtyRecord::Leaf(r) => r.txg,
            DirtyRecord::Indirect(r) => r.txg,
        }
    }

    #[must_use]
    pub fn as_leaf(&self) -> Option<&LeafDirtyRecord> {
        match self {
            DirtyRecord::Leaf(r) => Some(r),
            DirtyRecord::Indirect(_) => None,
        }
    }

    #[must_use]
    pub fn as_leaf_mut(&mut self) -> Option<&mut LeafDirtyRecord> {
        match self {
            DirtyRecord::Leaf(r) => Some(r),
            DirtyRecord::Indirect(_) => None,
        }
    }

    #[must_use]
    pub fn as_indirect(&self) -> Option<&IndirectDirtyRecord> {
        match self {
            DirtyRecord::Indirect(r) => Some(r),
            DirtyRecord::Leaf(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacent_ranges_coalesce() {
        let mut ranges = WriteRanges::new();
        ranges.insert(ByteRange::new(0, 100));
        ranges.insert(ByteRange::new(100, 200));
        assert_eq!(ranges.as_slice(), &[ByteRange::new(0, 200)]);
    }

    #[test]
    fn overlapping_ranges_coalesce() {
        let mut ranges = WriteRanges::new();
        ranges.insert(ByteRange::new(50, 150));
        ranges.insert(ByteRange::new(100, 200));
        assert_eq!(ranges.as_slice(), &[ByteRange::new(50, 200)]);
    }

    #[test]
    fn disjoint_ranges_stay_separate_and_sorted() {
        let mut ranges = WriteRanges::new();
        ranges.insert(ByteRange::new(100, 200));
        ranges.insert(ByteRange::new(0, 50));
        assert_eq!(ranges.as_slice(), &[ByteRange::new(0, 50), ByteRange::new(100, 200)]);
        // §8: adjacent stored ranges satisfy r.end < s.start strictly.
        assert!(ranges.as_slice()[0].end < ranges.as_slice()[1].start);
    }

    #[test]
    fn full_coverage_detected() {
        let mut ranges = WriteRanges::new();
        ranges.insert(ByteRange::new(0, 4096));
        assert!(ranges.covers_whole_block(4096));
    }

    #[test]
    fn gaps_computed_correctly() {
        let mut ranges = WriteRanges::new();
        ranges.insert(ByteRange::new(1024, 2048));
        let gaps = ranges.gaps(4096);
        assert_eq!(gaps, vec![ByteRange::new(0, 1024), ByteRange::new(2048, 4096)]);
    }

    #[test]
    fn truncate_uses_end_minus_start_contract() {
        let mut ranges = WriteRanges::new();
        ranges.insert(ByteRange::new(100, 9000));
        ranges.truncate_to(4096);
        assert_eq!(ranges.as_slice(), &[ByteRange::new(100, 4096)]);
        assert_eq!(ranges.as_slice()[0].size(), 4096 - 100);
    }

    #[test]
    fn truncate_drops_ranges_past_new_size() {
        let mut ranges = WriteRanges::new();
        ranges.insert(ByteRange::new(5000, 6000));
        ranges.truncate_to(4096);
        assert!(ranges.is_empty());
    }
}
