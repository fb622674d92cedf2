//! ObjectIO DMU Buffer Cache
//!
//! The dbuf layer sits between the object layer (dnodes) and the block
//! cache (ARC): it is the per-block working set that turns a logical
//! `(dataset, object, level, block-id)` coordinate into a live, mutable
//! buffer, tracks which transaction groups have modified it, and knows
//! how to reconcile a partial write against a read still in flight.
//! This crate implements that layer in isolation from the real object,
//! transaction-group, and cache layers it would sit between in a full
//! pool — those are modeled as the [`dnode`], [`txg`], and [`arc`]
//! trait boundaries respectively, each with a minimal in-memory
//! reference implementation for tests and standalone embedding.
//!
//! Module map:
//! - [`hash`]: the striped hash index dbufs are found through.
//! - [`dbuf`]: the dbuf entity itself, its mutex, and its state.
//! - [`state`]: the state-machine bit flags.
//! - [`dirty_record`]: per-TXG dirty content and write-range tracking.
//! - [`dirty_path`]: `will_dirty`/`will_fill`/`free_range` and friends.
//! - [`read`]: the blocking read path and the resolve (inverse-merge)
//!   algorithm.
//! - [`sync`]: the per-TXG sync path that turns dirty records into
//!   durable writes.
//! - [`hold`]: dbuf creation and the hold/rele/eviction lifecycle.
//! - [`user`]: client eviction callbacks and the deferred-run queue.
//! - [`blkptr`]: block pointers and their storage slots.
//! - [`arc`], [`dnode`], [`txg`]: the external collaborator traits.
//! - [`types`], [`config`], [`error`]: identifiers, tunables, errors.

pub mod arc;
pub mod blkptr;
pub mod config;
pub mod dbuf;
pub mod dirty_path;
pub mod dirty_record;
pub mod dnode;
pub mod error;
pub mod hash;
pub mod hold;
pub mod read;
#[cfg(test)]
mod scenario_tests;
pub mod state;
pub mod sync;
pub mod txg;
pub mod types;
pub mod user;

pub use arc::{ArcBackend, ArcBuf, ArcBufContentType, ArcOwner, MemArc, ReadFlags, ReadPriority};
pub use blkptr::{BlockPointer, BlockPointerSlot};
pub use config::DbufConfig;
pub use dbuf::{Dbuf, DbufInner};
pub use dirty_record::{DirtyRecord, IndirectDirtyRecord, LeafDirtyRecord, OverrideState, WriteRanges};
pub use dnode::{DnodeHandle, DnodePhys, MemDnode};
pub use error::{DbufError, Result};
pub use hash::HashIndex;
pub use state::StateFlags;
pub use txg::{SimpleTx, TxHandle, TxgId};
pub use types::{BlockId, ByteRange, DatasetId, DbufId, Level, ObjectNum};
pub use user::{DbufUserCallback, EvictionQueue};
