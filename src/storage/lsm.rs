//! LSM storage backend: composite `(K, V) -> i64` keys with background
//! compaction merging levels; zero-weight keys are deleted and weight
//! aggregation happens at merge time (§4.9 "LSM backend").
//!
//! This reuses the Z-set trace's level/batch/compaction machinery
//! directly — an LSM backend and the Z-set's own `Trace` physical
//! layout are the same structure applied to a different key shape.

use super::{Store, StoreStats};
use crate::{
    error::Result,
    zset::trace::{Batch, TraceState},
    zset::policy::Policy,
};
use std::hash::Hash;

pub struct LsmStore<K, V> {
    trace: TraceState<(K, V), i64>,
    policy: Policy,
}

impl<K, V> LsmStore<K, V>
where
    K: Ord + Clone + Hash + Eq,
    V: Ord + Clone + Hash + Eq,
{
    pub fn new() -> Self {
        Self::with_policy(Policy::default())
    }

    pub fn with_policy(policy: Policy) -> Self {
        Self {
            trace: TraceState::new(policy),
            policy,
        }
    }
}

impl<K, V> Default for LsmStore<K, V>
where
    K: Ord + Clone + Hash + Eq,
    V: Ord + Clone + Hash + Eq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Store<K, V> for LsmStore<K, V>
where
    K: Ord + Clone + Hash + Eq,
    V: Ord + Clone + Hash + Eq,
{
    fn store_batch(&mut self, entries: Vec<(K, V, i64)>) -> Result<()> {
        let tuples = entries.into_iter().map(|(k, v, w)| ((k, v), w)).collect();
        self.trace.append_batch(Batch::from_tuples(tuples));
        Ok(())
    }

    fn get(&self, k: &K) -> Option<(V, i64)> {
        // Latest value per key: the largest `V` among entries for `k`
        // with nonzero weight (an arbitrary but deterministic tie-break
        // in the absence of an explicit timestamp column).
        self.trace
            .consolidated()
            .into_iter()
            .filter(|((ek, _), w)| ek == k && *w != 0)
            .max_by(|((_, v1), _), ((_, v2), _)| v1.cmp(v2))
            .map(|((_, v), w)| (v, w))
    }

    fn range_iter(&self, start: &K, end: &K) -> Vec<(K, V, i64)> {
        self.trace
            .consolidated()
            .into_iter()
            .filter(|((k, _), _)| k >= start && k < end)
            .map(|((k, v), w)| (k, v, w))
            .collect()
    }

    fn compact(&mut self) -> Result<()> {
        self.trace.compact_fully();
        Ok(())
    }

    fn stats(&self) -> StoreStats {
        let entries = self.trace.consolidated();
        StoreStats {
            entry_count: entries.len(),
            memory_bytes: entries.len() * std::mem::size_of::<(K, V, i64)>(),
            disk_bytes: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_batch_merges_across_batches() {
        let mut store = LsmStore::<i64, i64>::new();
        store.store_batch(vec![(1, 10, 1)]).unwrap();
        store.store_batch(vec![(1, 10, -1), (2, 20, 1)]).unwrap();
        assert_eq!(store.get(&1), None);
        assert_eq!(store.get(&2), Some((20, 1)));
    }

    #[test]
    fn compact_merges_all_levels() {
        let mut store = LsmStore::<i64, i64>::with_policy(Policy {
            level_fanout: 1,
            ..Policy::default()
        });
        for i in 0..10 {
            store.store_batch(vec![(i, i * 10, 1)]).unwrap();
        }
        store.compact().unwrap();
        assert_eq!(store.stats().entry_count, 10);
    }
}
