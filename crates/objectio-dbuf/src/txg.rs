//! The transaction-group collaborator (spec.md §6 "Consumed from
//! transaction layer"). TXG admission, quiescing, and the open/syncing
//! state machine belong to `dmu_tx_*`, entirely out of scope here; this
//! module only carries the bound every dirty-record invariant is
//! stated in terms of and the minimal handle the dirty path reads
//! `tx->txg` / `tx_is_syncing(tx)` from.

use serde::{Deserialize, Serialize};

/// A transaction group identifier. Strictly increasing; TXGs are never
/// reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxgId(pub u64);

impl TxgId {
    #[must_use]
    pub const fn next(self) -> TxgId {
        TxgId(self.0 + 1)
    }
}

/// Handle to an open transaction, as threaded through `will_dirty` and
/// friends. A dbuf never needs more than `txg()`/`is_syncing()`; all
/// other transaction bookkeeping (space reservation, quiescing,
/// callback lists) is the `dmu_tx` layer's concern.
pub trait TxHandle: Send + Sync {
    fn txg(&self) -> TxgId;
    fn is_syncing(&self) -> bool;
}

/// A minimal, concrete `TxHandle` for tests and for embedding this
/// crate without a full `dmu_tx` implementation behind it.
#[derive(Debug, Clone, Copy)]
pub struct SimpleTx {
    txg: TxgId,
    syncing: bool,
}

impl SimpleTx {
    #[must_use]
    pub const fn open(txg: TxgId) -> Self {
        Self { txg, syncing: false }
    }

    #[must_use]
    pub const fn syncing(txg: TxgId) -> Self {
        Self { txg, syncing: true }
    }
}

impl TxHandle for SimpleTx {
    fn txg(&self) -> TxgId {
        self.txg
    }

    fn is_syncing(&self) -> bool {
        self.syncing
    }
}
