//! Persistent storage (§4.9): a keyed `(K, V, i64)` store abstracted
//! behind [`Store`], with in-memory, LSM, and hybrid backends, plus a
//! temporal spine and spill coordination for the circuit runtime.

pub mod lsm;
pub mod memory;
pub mod spill;
pub mod spine;

use crate::error::Result;
use std::hash::Hash;

/// Point-in-time statistics about a store's contents.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StoreStats {
    pub entry_count: usize,
    pub memory_bytes: usize,
    pub disk_bytes: usize,
}

/// Keyed access to `(K, V, i64)` entries: a value with a signed weight,
/// where weight aggregation happens on collision and entries with net
/// zero weight are removed.
pub trait Store<K, V> {
    /// Bulk ingest; weights for matching `(K, V)` pairs are summed, and
    /// any pair landing on zero weight is removed.
    fn store_batch(&mut self, entries: Vec<(K, V, i64)>) -> Result<()>;

    /// The latest value and weight recorded for `k`, if any.
    fn get(&self, k: &K) -> Option<(V, i64)>;

    /// Ordered scan over `[start, end)`.
    fn range_iter(&self, start: &K, end: &K) -> Vec<(K, V, i64)>;

    /// Merges internal runs, dropping zero-weight entries.
    fn compact(&mut self) -> Result<()>;

    fn stats(&self) -> StoreStats;
}

pub use lsm::LsmStore;
pub use memory::MemoryStore;
pub use spill::{PressureMonitor, SpillCoordinator, SpillDestination};
pub use spine::TemporalSpine;

/// Folds `(k, v, weight)` entries into a `(K, V) -> i64` weight map,
/// removing any pair whose accumulated weight nets to zero. Shared by
/// every backend's `store_batch` so weight aggregation is consistent
/// across implementations.
pub(crate) fn merge_weights<K, V>(existing: &mut hashbrown::HashMap<(K, V), i64>, entries: Vec<(K, V, i64)>)
where
    K: Hash + Eq,
    V: Hash + Eq,
{
    for (k, v, w) in entries {
        let key = (k, v);
        match existing.raw_entry_mut().from_key(&key) {
            hashbrown::hash_map::RawEntryMut::Vacant(e) => {
                if w != 0 {
                    e.insert(key, w);
                }
            }
            hashbrown::hash_map::RawEntryMut::Occupied(mut e) => {
                *e.get_mut() += w;
                if *e.get() == 0 {
                    e.remove();
                }
            }
        }
    }
}
