//! Tunables for the dbuf layer, following the
//! `objectio_common::config` convention of a `Default`-able,
//! serde-round-trippable settings struct.

use serde::{Deserialize, Serialize};

/// Configuration for a dbuf cache instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DbufConfig {
    /// Striping factor for the hash index's bucket mutexes (§4.1,
    /// `DBUF_MUTEXES`). Must be a power of two.
    pub mutex_stripes: usize,
    /// Bound on concurrently open TXGs (§3 invariant 1,
    /// `TXG_CONCURRENT_STATES`). A dbuf may never carry more dirty
    /// records than this.
    pub concurrent_txgs: usize,
    /// Target number of hash table slots per 4 KiB of physical memory
    /// budgeted to the cache, used to size the table on creation
    /// (§4.1 "Sizing").
    pub hash_table_target_load: usize,
    /// Default block size assumed for newly allocated frontends when
    /// the caller does not otherwise specify one.
    pub default_block_size: usize,
}

impl Default for DbufConfig {
    fn default() -> Self {
        Self {
            mutex_stripes: 16,
            concurrent_txgs: 3,
            hash_table_target_load: 1,
            default_block_size: 128 * 1024,
        }
    }
}

impl DbufConfig {
    /// Number of hash-table slots to allocate for a cache meant to
    /// hold roughly `budget_bytes` worth of physical memory (§4.1).
    #[must_use]
    pub fn initial_table_size(&self, budget_bytes: u64) -> usize {
        let slots = (budget_bytes / 4096).max(1) as usize * self.hash_table_target_load;
        slots.next_power_of_two().max(self.mutex_stripes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let cfg = DbufConfig::default();
        assert_eq!(cfg.concurrent_txgs, 3);
        assert!(cfg.mutex_stripes.is_power_of_two());
    }

    #[test]
    fn table_size_scales_with_budget() {
        let cfg = DbufConfig::default();
        let small = cfg.initial_table_size(4096 * 4);
        let large = cfg.initial_table_size(4096 * 4096);
        assert!(large >= small);
        assert!(small.is_power_of_two());
    }
}
