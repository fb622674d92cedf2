//! The read path (spec.md §4.6) and the READ-completion "resolve"
//! algorithm (§4.3 "Resolve").

use crate::arc::{ArcBuf, ArcBufContentType, ReadFlags, ReadOutcome, ReadPriority};
use crate::dbuf::Dbuf;
use crate::error::{DbufError, Result};
use crate::state::StateFlags;
use crate::sync as sync_path;
use crate::user::EvictionQueue;
use std::sync::Arc;

/// `read(dbuf, flags)`. Blocks the caller until the frontend is valid
/// unless `ReadFlags::NEVERWAIT` is set, in which case a dbuf still in
/// `READ`/`READ|FILL` returns immediately with that state unresolved.
pub fn read(dbuf: &Arc<Dbuf>, flags: ReadFlags, evictions: &mut EvictionQueue) -> Result<ArcBuf> {
    loop {
        let mut g = dbuf.lock();
        if g.state.contains(StateFlags::CACHED) {
            let buf = g.frontend.clone().expect("CACHED dbuf must have a frontend");
            tracing::trace!(id = %dbuf.id, "read hit: CACHED");
            return Ok(buf);
        }

        if g.state.contains(StateFlags::READ) {
            if flags.contains(ReadFlags::NEVERWAIT) {
                return Err(DbufError::not_supported("read pending; NEVERWAIT set"));
            }
            dbuf.wait_for_change(&mut g);
            continue;
        }

        if g.state == StateFlags::UNCACHED || g.state.contains(StateFlags::PARTIAL) {
            let had_partial = g.state.contains(StateFlags::PARTIAL);
            g.state = if had_partial {
                StateFlags::PARTIAL.union(StateFlags::READ)
            } else {
                StateFlags::READ
            };
            let block_size = g.block_size;
            let is_hole = g.block_pointer.is_hole;
            let block_key = g.block_pointer.block_key;
            drop(g);

            tracing::debug!(id = %dbuf.id, hole = is_hole, "dbuf read issued");

            let outcome = if is_hole {
                ReadOutcome::Hit(ArcBuf::zeroed(block_size as usize, ArcBufContentType::Data))
            } else {
                dbuf.arc.read(block_key, block_size as u32, ReadPriority::Sync, ReadFlags::empty())
            };

            let result = match outcome {
                ReadOutcome::Hit(buf) => Ok(buf),
                ReadOutcome::Pending(pending) => pending.wait(),
            };

            match result {
                Ok(buf) => {
                    resolve(dbuf, buf, is_hole, evictions);
                }
                Err(e) => {
                    // §7.2/§7.3: transient read failure. With no dirty
                    // content, surface the error and fall back to
                    // UNCACHED; with dirty content outstanding, zero-fill
                    // and proceed (durability loss is accounted there).
                    let had_dirty = {
                        let g = dbuf.lock();
                        !g.dirty.is_empty()
                    };
                    if had_dirty {
                        tracing::warn!(id = %dbuf.id, error = %e, "read failed with dirty content outstanding; zero-filling");
                        metrics::counter!("dbuf_dirty_writes_lost").increment(1);
                        let zeroed = ArcBuf::zeroed(block_size as usize, ArcBufContentType::Data);
                        resolve(dbuf, zeroed, true, evictions);
                    } else {
                        let mut g = dbuf.lock();
                        g.state = StateFlags::UNCACHED;
                        drop(g);
                        dbuf.notify_change();
                        return Err(e);
                    }
                }
            }
            continue;
        }

        // NOFILL or EVICTING: nothing to read.
        if g.state.contains(StateFlags::NOFILL) {
            return Err(DbufError::io(
                dbuf.id.to_string(),
                std::io::Error::other("read of NOFILL dbuf"),
            ));
        }
        return Err(DbufError::invariant(format!("read() called on unexpected state {:?}", g.state)));
    }
}

/// `read_cache_only`: a synchronous variant that never issues I/O. Used
/// by the dirty path's COW probe (§4.4 step 2). Returns `Some` only on
/// an immediate cache hit; otherwise leaves state untouched.
#[must_use]
pub fn read_cache_only(dbuf: &Arc<Dbuf>) -> Option<ArcBuf> {
    let g = dbuf.lock();
    if g.state.contains(StateFlags::CACHED) {
        return g.frontend.clone();
    }
    let is_hole = g.block_pointer.is_hole;
    let block_key = g.block_pointer.block_key;
    let block_size = g.block_size;
    drop(g);
    if is_hole {
        return None;
    }
    match dbuf.arc.read(block_key, block_size as u32, ReadPriority::Sync, ReadFlags::CACHED_ONLY) {
        ReadOutcome::Hit(buf) => Some(buf),
        ReadOutcome::Pending(_) => None,
    }
}

/// Resolve outstanding dirty ranges against a just-completed backing
/// read (§4.3 "Resolve"). `base` is the freshly read (or
/// hole-synthesized / zero-filled-on-failure) content; `is_hole_read`
/// suppresses merging content into a dirty record's gaps (a hole reads
/// as zero, and zeroing is exactly what the gaps already are once the
/// dirty record's own buffer was freshly allocated, so there is
/// nothing meaningful to copy — merging would be a correctness no-op
/// but the flag keeps the intent explicit and traceable).
pub fn resolve(dbuf: &Arc<Dbuf>, base: ArcBuf, is_hole_read: bool, evictions: &mut EvictionQueue) {
    let mut to_dispatch: Vec<crate::txg::TxgId> = Vec::new();

    {
        let mut g = dbuf.lock();
        let block_size = g.block_size;

        if g.dirty.is_empty() {
            g.frontend = Some(base);
            g.state = StateFlags::CACHED;
            tracing::trace!(id = %dbuf.id, "resolve: no dirty records, read becomes frontend");
        } else {
            let mut prev = base;
            let n = g.dirty.len();
            for i in (0..n).rev() {
                let Some(leaf) = g.dirty[i].as_leaf_mut() else {
                    // Indirect dirty records carry no write ranges.
                    continue;
                };
                if leaf.freed_in_flight {
                    leaf.ranges.clear();
                    leaf.needs_resolve = false;
                    prev = leaf.data.clone();
                    continue;
                }
                if leaf.needs_resolve {
                    for gap in leaf.ranges.gaps(block_size) {
                        if gap.is_empty() {
                            continue;
                        }
                        if is_hole_read {
                            leaf.data.zero_range(gap.start, gap.end);
                        } else {
                            leaf.data.copy_range_from(&prev, gap.start, gap.end);
                        }
                    }
                    leaf.ranges.clear();
                    leaf.needs_resolve = false;
                }
                if i != 0 {
                    // Every record but the newest is now immutable.
                    leaf.data.freeze();
                }
                if leaf.write_deferred {
                    leaf.write_deferred = false;
                    to_dispatch.push(leaf.txg);
                }
                prev = leaf.data.clone();
            }

            let still_filling = g.state.contains(StateFlags::FILL);
            if let Some(newest) = g.dirty.first().and_then(|r| r.as_leaf()) {
                g.frontend = Some(newest.data.clone());
            }
            g.state = if still_filling { StateFlags::FILL } else { StateFlags::CACHED };
            if !still_filling {
                g.freed_in_flight = false;
            }
            tracing::debug!(id = %dbuf.id, new_state = ?g.state, "resolve complete");
        }
    }

    dbuf.notify_change();

    for txg in to_dispatch {
        sync_path::dispatch_deferred_leaf_write(dbuf, txg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arc::{ArcBufContentType, MemArc};
    use crate::dbuf::DbufId;
    use crate::dirty_record::{DirtyRecord, LeafDirtyRecord};
    use crate::txg::TxgId;
    use crate::types::{BlockId, ByteRange, DatasetId, Level, ObjectNum};

    fn dbuf_with_arc() -> (Arc<Dbuf>, Arc<MemArc>) {
        let arc = Arc::new(MemArc::new());
        let id = DbufId::new(DatasetId(0), ObjectNum(1), Level(0), BlockId::Data(7));
        let d = Arc::new(Dbuf::new_uncached(id, 4096, Arc::clone(&arc) as _));
        (d, arc)
    }

    #[test]
    fn hole_read_yields_zero_buffer() {
        let (d, _arc) = dbuf_with_arc();
        d.lock().block_pointer = crate::blkptr::BlockPointer::hole();
        let mut q = EvictionQueue::new();
        let buf = read(&d, ReadFlags::empty(), &mut q).unwrap();
        assert_eq!(buf.read_range(0, 4096), vec![0u8; 4096]);
        assert_eq!(d.state_snapshot(), StateFlags::CACHED);
    }

    #[test]
    fn cached_read_is_immediate() {
        let (d, _arc) = dbuf_with_arc();
        let buf = ArcBuf::zeroed(4096, ArcBufContentType::Data);
        buf.write_at(0, b"hi");
        {
            let mut g = d.lock();
            g.frontend = Some(buf);
            g.state = StateFlags::CACHED;
        }
        let mut q = EvictionQueue::new();
        let got = read(&d, ReadFlags::empty(), &mut q).unwrap();
        assert_eq!(&got.read_range(0, 2), b"hi");
    }

    #[test]
    fn resolve_backfills_gaps_and_preserves_written_bytes() {
        let (d, _arc) = dbuf_with_arc();
        let written = ArcBuf::zeroed(4096, ArcBufContentType::Data);
        written.write_at(1024, &[0xCCu8; 1024]);
        let mut leaf = LeafDirtyRecord::new(TxgId(1), written);
        leaf.ranges.insert(ByteRange::new(1024, 2048));
        leaf.needs_resolve = true;
        {
            let mut g = d.lock();
            g.dirty.push(DirtyRecord::Leaf(leaf));
            g.state = StateFlags::PARTIAL.union(StateFlags::READ);
        }
        let base = ArcBuf::zeroed(4096, ArcBufContentType::Data);
        base.write_at(0, &[0xDDu8; 4096]);
        let mut q = EvictionQueue::new();
        resolve(&d, base, false, &mut q);

        let g = d.lock();
        assert_eq!(g.state, StateFlags::CACHED);
        let front = g.frontend.clone().unwrap();
        assert_eq!(front.read_range(0, 1024), vec![0xDDu8; 1024]);
        assert_eq!(front.read_range(1024, 2048), vec![0xCCu8; 1024]);
        assert_eq!(front.read_range(2048, 4096), vec![0xDDu8; 2048]);
        assert!(g.dirty[0].as_leaf().unwrap().ranges.is_empty());
    }

    #[test]
    fn resolve_stays_in_fill_when_filler_still_active() {
        let (d, _arc) = dbuf_with_arc();
        let written = ArcBuf::zeroed(4096, ArcBufContentType::Data);
        let mut leaf = LeafDirtyRecord::new(TxgId(1), written);
        leaf.ranges.insert(ByteRange::new(0, 100));
        leaf.needs_resolve = true;
        {
            let mut g = d.lock();
            g.dirty.push(DirtyRecord::Leaf(leaf));
            g.state = StateFlags::PARTIAL.union(StateFlags::READ).union(StateFlags::FILL);
        }
        let base = ArcBuf::zeroed(4096, ArcBufContentType::Data);
        let mut q = EvictionQueue::new();
        resolve(&d, base, false, &mut q);
        assert_eq!(d.state_snapshot(), StateFlags::FILL);
    }
}
