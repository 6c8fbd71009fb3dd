//! In-memory storage backend: a hash map for point lookup, an ordered
//! map for range scans (§4.9 "In-memory backend").

use super::{merge_weights, Store, StoreStats};
use crate::error::Result;
use std::collections::BTreeMap;
use std::hash::Hash;

pub struct MemoryStore<K, V> {
    weights: hashbrown::HashMap<(K, V), i64>,
    /// Latest value recorded per key, independent of the weight map, so
    /// `get` can answer "latest value per key" even when several values
    /// coexist with nonzero weight for the same key.
    latest: BTreeMap<K, (V, i64)>,
}

impl<K, V> Default for MemoryStore<K, V>
where
    K: Ord + Clone + Hash + Eq,
    V: Clone + Hash + Eq,
{
    fn default() -> Self {
        Self {
            weights: hashbrown::HashMap::new(),
            latest: BTreeMap::new(),
        }
    }
}

impl<K, V> MemoryStore<K, V>
where
    K: Ord + Clone + Hash + Eq,
    V: Clone + Hash + Eq,
{
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K, V> Store<K, V> for MemoryStore<K, V>
where
    K: Ord + Clone + Hash + Eq,
    V: Clone + Hash + Eq,
{
    fn store_batch(&mut self, entries: Vec<(K, V, i64)>) -> Result<()> {
        let touched_keys: Vec<K> = entries.iter().map(|(k, _, _)| k.clone()).collect();
        for (k, v, _) in &entries {
            self.latest.insert(k.clone(), (v.clone(), 0));
        }
        merge_weights(&mut self.weights, entries);
        // `latest`'s weight must reflect the aggregated weight in `weights`
        // after merging, not the raw per-call weight just written above.
        for k in &touched_keys {
            if let Some((v, w)) = self.latest.get_mut(k) {
                if let Some(&agg) = self.weights.get(&(k.clone(), v.clone())) {
                    *w = agg;
                }
            }
        }
        let weights = &self.weights;
        self.latest.retain(|k, _| weights.keys().any(|(wk, _)| wk == k));
        Ok(())
    }

    fn get(&self, k: &K) -> Option<(V, i64)> {
        self.latest.get(k).cloned()
    }

    fn range_iter(&self, start: &K, end: &K) -> Vec<(K, V, i64)> {
        self.latest
            .range(start.clone()..end.clone())
            .map(|(k, (v, w))| (k.clone(), v.clone(), *w))
            .collect()
    }

    fn compact(&mut self) -> Result<()> {
        self.weights.retain(|_, w| *w != 0);
        Ok(())
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            entry_count: self.weights.len(),
            memory_bytes: self.weights.len() * std::mem::size_of::<(K, V, i64)>(),
            disk_bytes: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_batch_aggregates_and_drops_zero() {
        let mut store = MemoryStore::<i64, &'static str>::new();
        store.store_batch(vec![(1, "a", 1), (1, "a", -1)]).unwrap();
        assert_eq!(store.stats().entry_count, 0);

        store.store_batch(vec![(2, "b", 2)]).unwrap();
        assert_eq!(store.get(&2), Some(("b", 2)));
    }

    #[test]
    fn range_iter_returns_ordered_subset() {
        let mut store = MemoryStore::<i64, &'static str>::new();
        store
            .store_batch(vec![(3, "c", 1), (1, "a", 1), (2, "b", 1)])
            .unwrap();
        let got: Vec<i64> = store.range_iter(&1, &3).into_iter().map(|(k, _, _)| k).collect();
        assert_eq!(got, vec![1, 2]);
    }

    #[test]
    fn get_weight_stays_in_sync_with_repeated_writes() {
        let mut store = MemoryStore::<i64, &'static str>::new();
        store.store_batch(vec![(1, "a", 1)]).unwrap();
        store.store_batch(vec![(1, "a", 1)]).unwrap();
        assert_eq!(store.get(&1), Some(("a", 2)));
    }
}
