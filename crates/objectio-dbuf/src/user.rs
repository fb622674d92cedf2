//! Per-dbuf user records and deferred eviction callbacks (C7, spec.md
//! §4.7).
//!
//! A client may attach one callback to a dbuf. On eviction the
//! callback is never run inline under the dbuf mutex; every operation
//! that might evict a dbuf collects triggered callbacks into an
//! [`EvictionQueue`] and runs them only after it has dropped every
//! dbuf mutex it was holding, decoupling user-code latency (and
//! whatever locks the user code itself takes) from this crate's lock
//! order.

use crate::dbuf::Dbuf;
use std::sync::Arc;

/// A client eviction hook. Modeled as a small polymorphic interface
/// per spec.md §9 ("Dynamic dispatch (eviction callbacks)").
pub trait DbufUserCallback: Send + Sync {
    fn evict(self: Arc<Self>);
}

/// Accumulates callbacks triggered while dbuf mutexes were held, to be
/// run once the caller has released them all.
#[derive(Default)]
pub struct EvictionQueue {
    pending: Vec<Arc<dyn DbufUserCallback>>,
}

impl EvictionQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, cb: Arc<dyn DbufUserCallback>) {
        self.pending.push(cb);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Run every queued callback. Must be called with no dbuf mutex
    /// held by the current thread.
    pub fn drain_and_run(self) {
        for cb in self.pending {
            cb.evict();
        }
    }
}

/// Attach `user` to `dbuf` if no user is currently set. Returns the
/// existing user (unchanged) if one was already present — this layer
/// never silently clobbers an existing registration.
pub fn set_user(dbuf: &Dbuf, user: Arc<dyn DbufUserCallback>) -> Option<Arc<dyn DbufUserCallback>> {
    let mut g = dbuf.lock();
    if let Some(existing) = &g.user {
        return Some(Arc::clone(existing));
    }
    g.user = Some(user);
    None
}

/// Current user, if any.
#[must_use]
pub fn get_user(dbuf: &Dbuf) -> Option<Arc<dyn DbufUserCallback>> {
    dbuf.lock().user.clone()
}

/// Remove `user` if it is the one currently installed (compared by
/// pointer identity, as the tuple `(set_user(x); get_user()==x;
/// remove_user(x)==x; remove_user(x) when user is y!=x returns None
/// and leaves user=y)` in spec.md §8 requires). Returns the removed
/// user on success.
pub fn remove_user(dbuf: &Dbuf, user: &Arc<dyn DbufUserCallback>) -> Option<Arc<dyn DbufUserCallback>> {
    let mut g = dbuf.lock();
    let matches = g.user.as_ref().is_some_and(|u| Arc::ptr_eq(u, user));
    if matches { g.user.take() } else { None }
}

/// Atomically swap `old` for `new` if `old` is the currently installed
/// user. Returns the removed `old` on success; on mismatch, the
/// current user is left untouched and `None` is returned (`new` is
/// handed back to the caller via the `Err` variant so it isn't
/// silently dropped).
pub fn replace_user(
    dbuf: &Dbuf,
    old: &Arc<dyn DbufUserCallback>,
    new: Arc<dyn DbufUserCallback>,
) -> Result<Option<Arc<dyn DbufUserCallback>>, Arc<dyn DbufUserCallback>> {
    let mut g = dbuf.lock();
    let matches = g.user.as_ref().is_some_and(|u| Arc::ptr_eq(u, old));
    if matches {
        let removed = g.user.take();
        g.user = Some(new);
        Ok(removed)
    } else {
        Err(new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arc::MemArc;
    use crate::types::{BlockId, DatasetId, Level, ObjectNum};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);
    impl DbufUserCallback for Counter {
        fn evict(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn make() -> Dbuf {
        let arc = Arc::new(MemArc::new());
        Dbuf::new_uncached(DbufId::new(DatasetId(0), ObjectNum(1), Level(0), BlockId::Data(1)), 4096, arc)
    }

    #[test]
    fn set_get_remove_roundtrip() {
        let d = make();
        let x: Arc<dyn DbufUserCallback> = Arc::new(Counter(AtomicUsize::new(0)));
        assert!(set_user(&d, Arc::clone(&x)).is_none());
        let got = get_user(&d).unwrap();
        assert!(Arc::ptr_eq(&got, &x));
        let removed = remove_user(&d, &x).unwrap();
        assert!(Arc::ptr_eq(&removed, &x));
        assert!(get_user(&d).is_none());
    }

    #[test]
    fn remove_with_wrong_identity_is_noop() {
        let d = make();
        let x: Arc<dyn DbufUserCallback> = Arc::new(Counter(AtomicUsize::new(0)));
        let y: Arc<dyn DbufUserCallback> = Arc::new(Counter(AtomicUsize::new(0)));
        set_user(&d, Arc::clone(&x));
        assert!(remove_user(&d, &y).is_none());
        // user is still x, untouched
        let got = get_user(&d).unwrap();
        assert!(Arc::ptr_eq(&got, &x));
    }

    #[test]
    fn set_user_does_not_clobber_existing() {
        let d = make();
        let x: Arc<dyn DbufUserCallback> = Arc::new(Counter(AtomicUsize::new(0)));
        let y: Arc<dyn DbufUserCallback> = Arc::new(Counter(AtomicUsize::new(0)));
        assert!(set_user(&d, Arc::clone(&x)).is_none());
        let rejected = set_user(&d, y).unwrap();
        assert!(Arc::ptr_eq(&rejected, &x));
    }

    #[test]
    fn replace_swaps_on_matching_identity() {
        let d = make();
        let x: Arc<dyn DbufUserCallback> = Arc::new(Counter(AtomicUsize::new(0)));
        let y: Arc<dyn DbufUserCallback> = Arc::new(Counter(AtomicUsize::new(0)));
        set_user(&d, Arc::clone(&x));
        let old = replace_user(&d, &x, Arc::clone(&y)).unwrap().unwrap();
        assert!(Arc::ptr_eq(&old, &x));
        assert!(Arc::ptr_eq(&get_user(&d).unwrap(), &y));
    }

    #[test]
    fn eviction_queue_runs_after_drain() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let mut q = EvictionQueue::new();
        q.push(counter.clone() as Arc<dyn DbufUserCallback>);
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
        q.drain_and_run();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }
}
