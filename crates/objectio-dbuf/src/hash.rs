//! The hash index (C1, spec.md §4.1).
//!
//! A closed-addressing table keyed on `DbufId`, striped into
//! `mutex_stripes` independently-locked buckets so lookups against
//! unrelated dbufs never contend. Lock order throughout this crate is
//! bucket mutex > dbuf mutex (§5): the bucket lock may be held while a
//! dbuf's own mutex is acquired for the *matching* entry, but must
//! never be held while acquiring a *different* dbuf's mutex.

use crate::dbuf::{Dbuf, DbufId};
use crate::state::StateFlags;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Striped hash table mapping `DbufId -> Arc<Dbuf>`.
pub struct HashIndex {
    stripes: Vec<Mutex<HashMap<DbufId, Arc<Dbuf>>>>,
}

impl HashIndex {
    /// `n_stripes` should be a power of two (§4.1 `DBUF_MUTEXES`).
    #[must_use]
    pub fn new(n_stripes: usize) -> Self {
        let n = n_stripes.max(1).next_power_of_two();
        Self { stripes: (0..n).map(|_| Mutex::new(HashMap::new())).collect() }
    }

    #[must_use]
    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    fn stripe_index(&self, id: &DbufId) -> usize {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        id.hash(&mut hasher);
        (hasher.finish() as usize) & (self.stripes.len() - 1)
    }

    /// Look up `id`, invoking `f` with the result while the owning
    /// bucket mutex is still held. This is the primitive that lets a
    /// caller acquire the found dbuf's own mutex *before* the bucket
    /// mutex is released, satisfying the lock-order rule in §4.1
    /// without returning a self-referential guard across the API
    /// boundary.
    pub fn find_and<R>(&self, id: &DbufId, f: impl FnOnce(Option<&Arc<Dbuf>>) -> R) -> R {
        let bucket = self.stripes[self.stripe_index(id)].lock();
        let found = bucket.get(id).filter(|d| !d.state_snapshot().contains(StateFlags::EVICTING));
        f(found)
    }

    /// Snapshot lookup without the nested-guard protocol; used by
    /// read-only traversals (e.g. `free_range`'s dbuf-list walk) that
    /// don't need the strict ordering guarantee `find_and` provides.
    #[must_use]
    pub fn get(&self, id: &DbufId) -> Option<Arc<Dbuf>> {
        self.find_and(id, |found| found.cloned())
    }

    /// Idempotent insert: if an equivalent entry already exists, the
    /// candidate is discarded and the existing entry returned; `true`
    /// indicates `candidate` itself ended up live in the table.
    pub fn insert_or_get(&self, id: DbufId, candidate: Arc<Dbuf>) -> (Arc<Dbuf>, bool) {
        let mut bucket = self.stripes[self.stripe_index(&id)].lock();
        if let Some(existing) = bucket.get(&id) {
            if !existing.state_snapshot().contains(StateFlags::EVICTING) {
                return (Arc::clone(existing), false);
            }
        }
        bucket.insert(id, Arc::clone(&candidate));
        (candidate, true)
    }

    /// Remove `id` from the table. The caller must already have
    /// verified `hold_count == 0` and state `EVICTING` while holding
    /// the dbuf's own mutex (§4.1 "Removal"); this only performs the
    /// table-side removal.
    pub fn remove(&self, id: &DbufId) -> bool {
        let mut bucket = self.stripes[self.stripe_index(id)].lock();
        bucket.remove(id).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stripes.iter().map(|s| s.lock().len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arc::MemArc;
    use crate::dbuf::Dbuf;
    use crate::types::{BlockId, DatasetId, Level};
    use std::sync::Arc;

    fn id(n: u64) -> DbufId {
        DbufId::new(DatasetId(0), crate::types::ObjectNum(1), Level(0), BlockId::Data(n))
    }

    #[test]
    fn insert_or_get_is_idempotent_under_race() {
        let index = HashIndex::new(4);
        let arc_backend = Arc::new(MemArc::new());
        let a = Arc::new(Dbuf::new_uncached(id(1), 4096, Arc::clone(&arc_backend) as _));
        let b = Arc::new(Dbuf::new_uncached(id(1), 4096, arc_backend as _));

        let (first, inserted1) = index.insert_or_get(id(1), a);
        assert!(inserted1);
        let (second, inserted2) = index.insert_or_get(id(1), b);
        assert!(!inserted2);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn find_never_returns_evicting() {
        let index = HashIndex::new(4);
        let arc_backend = Arc::new(MemArc::new());
        let d = Arc::new(Dbuf::new_uncached(id(2), 4096, arc_backend as _));
        index.insert_or_get(id(2), Arc::clone(&d));
        d.mark_evicting_for_test();
        assert!(index.get(&id(2)).is_none());
    }

    #[test]
    fn remove_deletes_entry() {
        let index = HashIndex::new(4);
        let arc_backend = Arc::new(MemArc::new());
        let d = Arc::new(Dbuf::new_uncached(id(3), 4096, arc_backend as _));
        index.insert_or_get(id(3), d);
        assert!(index.remove(&id(3)));
        assert!(index.get(&id(3)).is_none());
    }
}
