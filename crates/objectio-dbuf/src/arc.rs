//! The `ArcBackend` collaborator — the adaptive, checksum-verified
//! block cache this layer sits on top of (spec.md §6 "Consumed from
//! underlying cache"). Out of scope to implement for real; this module
//! defines the trait contract the dbuf layer depends on plus `MemArc`,
//! an in-memory reference implementation used by tests and by callers
//! that don't need real disk-backed caching (e.g. the gateway's dry-run
//! mode).
//!
//! The dbuf layer never allocates the large data area itself (§5
//! "Resource sharing") — every [`ArcBuf`] originates from
//! [`ArcBackend::alloc`] or [`ArcBackend::read`].

use crate::error::Result;
use crate::txg::TxgId;
use bytes::Bytes;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Who currently holds a reference to an [`ArcBuf`]. The real ARC uses
/// this to detect duplicate buffers on release (§4.2 "eviction under
/// duplicate"); here it is an opaque tag compared by identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArcOwner(pub usize);

/// Content-type hint passed to `alloc`, matching the distinction the
/// ARC makes between metadata and data buffers for cache accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArcBufContentType {
    Data,
    Metadata,
}

/// Priority hint for a read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPriority {
    Sync,
    Async,
    Prefetch,
}

/// Flags accompanying a read request / completion (`aflags` in §6).
/// A small hand-rolled bitmask rather than a dependency: the set is
/// fixed and tiny, and `DbufState` (see `state.rs`) uses the same
/// pattern for the same reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadFlags(u8);

impl ReadFlags {
    pub const CACHED_ONLY: ReadFlags = ReadFlags(0b0000_0001);
    pub const NEVERWAIT: ReadFlags = ReadFlags(0b0000_0010);

    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn contains(self, other: ReadFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn union(self, other: ReadFlags) -> Self {
        Self(self.0 | other.0)
    }
}

/// Outcome of [`ArcBackend::read`]: a synchronous hit, or a pending
/// read whose completion drives [`crate::read::resolve`].
pub enum ReadOutcome {
    /// The block was already cached; data is immediately available.
    Hit(ArcBuf),
    /// A read was dispatched; the caller blocks on `wait` to emulate
    /// the underlying I/O pipeline's completion callback. Real systems
    /// would instead register `done_cb` and return; this reference
    /// backend executes synchronously under the hood but keeps the
    /// split so the dbuf-layer code does not assume synchronicity.
    Pending(PendingRead),
}

/// A read in flight against the ARC.
pub struct PendingRead {
    result: Result<ArcBuf>,
}

impl PendingRead {
    #[must_use]
    pub fn ready(result: Result<ArcBuf>) -> Self {
        Self { result }
    }

    /// Block until the read completes. The reference backend always
    /// has the result ready immediately; a real backend would park the
    /// calling thread on a condition variable signaled by the I/O
    /// pipeline's completion callback.
    pub fn wait(self) -> Result<ArcBuf> {
        self.result
    }
}

/// A handle to an in-flight write, returned by `ArcBackend::write`.
/// Completion is delivered via the `done_cb` passed at issue time
/// rather than through this handle; it exists so callers have
/// something to hold onto / cancel-check, mirroring `zio_t*`.
pub struct ArcWriteHandle {
    pub txg: TxgId,
}

/// Callback invoked once a write the dbuf layer issued durably
/// completes (or fails). `physical_size` is used for space-accounting
/// deltas (§4.5 "Completion").
pub type WriteDoneCallback = Box<dyn FnOnce(std::result::Result<WriteOutcome, String>) + Send>;

/// Successful write completion details.
#[derive(Debug, Clone, Copy)]
pub struct WriteOutcome {
    pub physical_size: u32,
    pub logical_size: u32,
    pub is_hole: bool,
}

/// Eviction callback the ARC invokes when it reclaims a buffer out from
/// under the dbuf that owns it (§9 "Cyclic dbuf<->cache-buffer
/// references"). Implemented as a weak back-reference: this trait
/// object is stored by the backend, not by the dbuf, so there is no
/// ownership cycle.
pub trait EvictionCallback: Send + Sync {
    fn evict(&self);
}

/// The external ARC collaborator interface (spec.md §6).
pub trait ArcBackend: Send + Sync {
    /// Allocate a fresh, zero-filled buffer of `size` bytes.
    fn alloc(&self, size: usize, owner: ArcOwner, content_type: ArcBufContentType) -> ArcBuf;

    /// Read the block identified by `checksum`/`logical_size` (the
    /// on-disk block pointer payload this layer doesn't otherwise
    /// interpret). May complete synchronously on a cache hit.
    fn read(
        &self,
        block_key: u64,
        logical_size: u32,
        priority: ReadPriority,
        flags: ReadFlags,
    ) -> ReadOutcome;

    /// Issue a durable write for `data` at `txg`. `ready_cb` fires once
    /// the buffer's content is fixed (before durability); `done_cb`
    /// fires on completion or failure.
    fn write(
        &self,
        txg: TxgId,
        block_key: u64,
        data: ArcBuf,
        ready_cb: Option<Box<dyn FnOnce() + Send>>,
        done_cb: WriteDoneCallback,
    ) -> ArcWriteHandle;

    fn release(&self, buf: &ArcBuf, owner: ArcOwner);
    fn freeze(&self, buf: &ArcBuf);
    fn thaw(&self, buf: &ArcBuf);
    fn set_callback(&self, buf: &ArcBuf, cb: Arc<dyn EvictionCallback>);
    /// Drop `owner`'s reference; returns true if that was the last
    /// reference and the buffer has therefore become a duplicate
    /// candidate for eviction.
    fn remove_ref(&self, buf: &ArcBuf, owner: ArcOwner) -> bool;
    fn buf_size(&self, buf: &ArcBuf) -> usize;
    fn released(&self, buf: &ArcBuf) -> bool;
    fn frozen(&self, buf: &ArcBuf) -> bool;
    /// Loan a buffer out for direct mutation by the caller (bypassing
    /// the owning dbuf), returning a private copy if the buffer is
    /// currently shared.
    fn loan_buf(&self, buf: &ArcBuf) -> ArcBuf;
    /// Return a previously loaned buffer.
    fn return_buf(&self, buf: ArcBuf);
}

struct ArcBufInner {
    data: Vec<u8>,
    frozen: bool,
    released: bool,
    content_type: ArcBufContentType,
}

/// A cache buffer handle — the dbuf "frontend". Cloning an `ArcBuf`
/// aliases the same underlying storage (this is how a dirty record and
/// the live frontend can share one buffer prior to a COW split);
/// [`ArcBuf::duplicate`] performs a real, independent copy.
#[derive(Clone)]
pub struct ArcBuf {
    inner: Arc<Mutex<ArcBufInner>>,
}

impl fmt::Debug for ArcBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = self.inner.lock();
        f.debug_struct("ArcBuf")
            .field("size", &g.data.len())
            .field("frozen", &g.frozen)
            .finish()
    }
}

impl ArcBuf {
    #[must_use]
    pub fn zeroed(size: usize, content_type: ArcBufContentType) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ArcBufInner {
                data: vec![0u8; size],
                frozen: false,
                released: false,
                content_type,
            })),
        }
    }

    #[must_use]
    pub fn from_bytes(data: Vec<u8>, content_type: ArcBufContentType) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ArcBufInner { data, frozen: false, released: false, content_type })),
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.lock().data.len()
    }

    #[must_use]
    pub fn content_type(&self) -> ArcBufContentType {
        self.inner.lock().content_type
    }

    /// Snapshot the current content as an immutable, cheaply cloned
    /// [`Bytes`].
    #[must_use]
    pub fn snapshot(&self) -> Bytes {
        Bytes::copy_from_slice(&self.inner.lock().data)
    }

    /// Whether two handles alias the same storage (used to detect
    /// "an older dirty record aliases the frontend", §4.4 step 5).
    #[must_use]
    pub fn aliases(&self, other: &ArcBuf) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.inner.lock().frozen
    }

    pub fn freeze(&self) {
        self.inner.lock().frozen = true;
    }

    pub fn thaw(&self) {
        self.inner.lock().frozen = false;
    }

    /// Write `bytes` at `offset`. Fails (debug-asserts) against a
    /// frozen buffer — per §3 invariant 7, the oldest dirty record's
    /// buffer must not be frozen while ranges are outstanding.
    pub fn write_at(&self, offset: u64, bytes: &[u8]) {
        let mut g = self.inner.lock();
        debug_assert!(!g.frozen, "write to frozen dbuf frontend");
        let offset = offset as usize;
        let end = offset + bytes.len();
        if end > g.data.len() {
            g.data.resize(end, 0);
        }
        g.data[offset..end].copy_from_slice(bytes);
    }

    pub fn zero_range(&self, start: u64, end: u64) {
        let mut g = self.inner.lock();
        let start = start as usize;
        let end = (end as usize).min(g.data.len());
        if start < end {
            g.data[start..end].fill(0);
        }
    }

    pub fn read_range(&self, start: u64, end: u64) -> Vec<u8> {
        let g = self.inner.lock();
        let start = (start as usize).min(g.data.len());
        let end = (end as usize).min(g.data.len());
        g.data[start..end].to_vec()
    }

    /// Deep-copy this buffer's content into a brand new, independent
    /// `ArcBuf` — the COW split used throughout the dirty path.
    #[must_use]
    pub fn duplicate(&self) -> ArcBuf {
        let g = self.inner.lock();
        ArcBuf::from_bytes(g.data.clone(), g.content_type)
    }

    /// Copy bytes from `src`'s range into `self` at the same offsets
    /// without touching bytes outside that range (the "inverse-merge"
    /// primitive used to resolve outstanding write ranges, §4.3).
    pub fn copy_range_from(&self, src: &ArcBuf, start: u64, end: u64) {
        let bytes = src.read_range(start, end);
        self.write_at(start, &bytes);
    }
}

/// In-memory reference `ArcBackend`. Reads always miss (there is no
/// real disk behind it) unless content has been preloaded via
/// [`MemArc::seed`]; writes complete synchronously and invoke callbacks
/// inline. Intended for tests and for embedding `objectio-dbuf` in
/// contexts (e.g. `objectio-cli` dry-run) with no real pool attached.
#[derive(Default)]
pub struct MemArc {
    seeded: Mutex<std::collections::HashMap<u64, (Vec<u8>, bool)>>,
}

impl MemArc {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload the content a subsequent `read` for `block_key` should
    /// return, optionally marking it a hole.
    pub fn seed(&self, block_key: u64, data: Vec<u8>, is_hole: bool) {
        self.seeded.lock().insert(block_key, (data, is_hole));
    }
}

impl ArcBackend for MemArc {
    fn alloc(&self, size: usize, _owner: ArcOwner, content_type: ArcBufContentType) -> ArcBuf {
        ArcBuf::zeroed(size, content_type)
    }

    fn read(
        &self,
        block_key: u64,
        logical_size: u32,
        _priority: ReadPriority,
        _flags: ReadFlags,
    ) -> ReadOutcome {
        let seeded = self.seeded.lock();
        match seeded.get(&block_key) {
            Some((data, _is_hole)) => {
                ReadOutcome::Hit(ArcBuf::from_bytes(data.clone(), ArcBufContentType::Data))
            }
            None => ReadOutcome::Pending(PendingRead::ready(Ok(ArcBuf::zeroed(
                logical_size as usize,
                ArcBufContentType::Data,
            )))),
        }
    }

    fn write(
        &self,
        txg: TxgId,
        _block_key: u64,
        data: ArcBuf,
        ready_cb: Option<Box<dyn FnOnce() + Send>>,
        done_cb: WriteDoneCallback,
    ) -> ArcWriteHandle {
        if let Some(cb) = ready_cb {
            cb();
        }
        let size = data.size() as u32;
        done_cb(Ok(WriteOutcome { physical_size: size, logical_size: size, is_hole: false }));
        ArcWriteHandle { txg }
    }

    fn release(&self, buf: &ArcBuf, _owner: ArcOwner) {
        buf.inner.lock().released = true;
    }

    fn freeze(&self, buf: &ArcBuf) {
        buf.freeze();
    }

    fn thaw(&self, buf: &ArcBuf) {
        buf.thaw();
    }

    fn set_callback(&self, _buf: &ArcBuf, _cb: Arc<dyn EvictionCallback>) {}

    fn remove_ref(&self, buf: &ArcBuf, _owner: ArcOwner) -> bool {
        Arc::strong_count(&buf.inner) <= 1
    }

    fn buf_size(&self, buf: &ArcBuf) -> usize {
        buf.size()
    }

    fn released(&self, buf: &ArcBuf) -> bool {
        buf.inner.lock().released
    }

    fn frozen(&self, buf: &ArcBuf) -> bool {
        buf.is_frozen()
    }

    fn loan_buf(&self, buf: &ArcBuf) -> ArcBuf {
        buf.duplicate()
    }

    fn return_buf(&self, _buf: ArcBuf) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_is_independent() {
        let a = ArcBuf::zeroed(16, ArcBufContentType::Data);
        a.write_at(0, &[1, 2, 3, 4]);
        let b = a.duplicate();
        b.write_at(0, &[9, 9, 9, 9]);
        assert_eq!(a.read_range(0, 4), vec![1, 2, 3, 4]);
        assert_eq!(b.read_range(0, 4), vec![9, 9, 9, 9]);
        assert!(!a.aliases(&b));
    }

    #[test]
    fn alias_shares_storage() {
        let a = ArcBuf::zeroed(8, ArcBufContentType::Data);
        let b = a.clone();
        assert!(a.aliases(&b));
        a.write_at(0, &[5, 5]);
        assert_eq!(b.read_range(0, 2), vec![5, 5]);
    }

    #[test]
    fn mem_arc_seeded_read_hits() {
        let arc = MemArc::new();
        arc.seed(42, vec![7u8; 4096], false);
        match arc.read(42, 4096, ReadPriority::Sync, ReadFlags::empty()) {
            ReadOutcome::Hit(buf) => assert_eq!(buf.size(), 4096),
            ReadOutcome::Pending(_) => panic!("expected synchronous hit"),
        }
    }

    #[test]
    fn mem_arc_unseeded_read_returns_zeroed() {
        let arc = MemArc::new();
        let outcome = arc.read(99, 512, ReadPriority::Async, ReadFlags::empty());
        let buf = match outcome {
            ReadOutcome::Pending(p) => p.wait().unwrap(),
            ReadOutcome::Hit(b) => b,
        };
        assert_eq!(buf.read_range(0, 512), vec![0u8; 512]);
    }
}
