//! Window operators (§4.6 "Window operators").

use crate::{algebra::ZRingValue, indexed::IndexedZSet, zset::ZSet};
use std::{collections::VecDeque, hash::Hash};

/// Tumbling window of width `width` with allowed lateness `lateness`.
/// The watermark is `max_timestamp_seen - lateness`; a bucket is emitted
/// exactly once, when its end falls at or before the watermark.
pub struct Tumbling<K, V, Acc, R> {
    width: i64,
    lateness: i64,
    max_timestamp: i64,
    emitted_buckets: hashbrown::HashSet<i64>,
    pending: hashbrown::HashMap<i64, IndexedZSet<K, V, R>>,
    seed: Acc,
}

impl<K, V, Acc, R> Tumbling<K, V, Acc, R>
where
    K: Ord + Clone + Hash + Eq,
    V: Ord + Clone + Hash + Eq,
    Acc: Clone,
    R: ZRingValue,
{
    pub fn new(width: i64, lateness: i64, seed: Acc) -> Self {
        assert!(width > 0, "tumbling window width must be positive");
        Self {
            width,
            lateness,
            max_timestamp: i64::MIN,
            emitted_buckets: hashbrown::HashSet::new(),
            pending: hashbrown::HashMap::new(),
            seed,
        }
    }

    fn bucket_start(&self, timestamp: i64) -> i64 {
        timestamp.div_euclid(self.width) * self.width
    }

    /// Ingests one `(timestamp, key, value, weight)` observation. Returns
    /// the per-key aggregates for every bucket whose end now falls at or
    /// before the watermark and that has not been emitted before.
    pub fn ingest<Step>(
        &mut self,
        timestamp: i64,
        delta: &IndexedZSet<K, V, R>,
        step: Step,
    ) -> Vec<(i64, ZSet<(K, Acc), R>)>
    where
        Step: Fn(&Acc, &V, R) -> Acc,
    {
        self.max_timestamp = self.max_timestamp.max(timestamp);
        let bucket = self.bucket_start(timestamp);
        let entry = self
            .pending
            .entry(bucket)
            .or_insert_with(IndexedZSet::empty);
        *entry = entry.add(delta);

        let watermark = self.max_timestamp - self.lateness;
        let mut ready: Vec<i64> = self
            .pending
            .keys()
            .copied()
            .filter(|&b| b + self.width <= watermark && !self.emitted_buckets.contains(&b))
            .collect();
        ready.sort_unstable();

        let mut out = Vec::new();
        for b in ready {
            self.emitted_buckets.insert(b);
            if let Some(bucket_data) = self.pending.get(&b) {
                let mut result = Vec::new();
                for k in bucket_data.keys() {
                    let mut acc = self.seed.clone();
                    for (v, w) in bucket_data.lookup(k).consolidated() {
                        acc = step(&acc, &v, w);
                    }
                    result.push(((k.clone(), acc), R::one()));
                }
                out.push((b, ZSet::from_tuples(result)));
            }
        }
        out
    }
}

/// Sliding window over the last `N` items observed per key, after
/// applying each observation's `±weight` to a logical multiset.
pub struct SlidingCount<K, V, R> {
    size: usize,
    history: hashbrown::HashMap<K, VecDeque<(V, R)>>,
}

impl<K, V, R> SlidingCount<K, V, R>
where
    K: Ord + Clone + Hash + Eq,
    V: Ord + Clone + Hash + Eq,
    R: ZRingValue,
{
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "sliding window size must be positive");
        Self {
            size,
            history: hashbrown::HashMap::new(),
        }
    }

    /// Applies a delta of `(key, value, weight)` observations, retaining
    /// only the last `size` items observed per key. Returns the current
    /// window contents per touched key.
    pub fn ingest(&mut self, delta: &IndexedZSet<K, V, R>) -> IndexedZSet<K, V, R> {
        for k in delta.keys() {
            let window = self.history.entry(k.clone()).or_default();
            for (v, w) in delta.lookup(k).consolidated() {
                window.push_back((v, w));
                while window.len() > self.size {
                    window.pop_front();
                }
            }
        }

        let mut entries = Vec::new();
        for (k, window) in &self.history {
            for (v, w) in window {
                entries.push(((k.clone(), v.clone()), w.clone()));
            }
        }
        IndexedZSet::from_zset(&ZSet::from_tuples(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx(pairs: Vec<((u32, i64), i64)>) -> IndexedZSet<u32, i64, i64> {
        IndexedZSet::from_zset(&ZSet::from_tuples(pairs))
    }

    #[test]
    fn tumbling_emits_once_past_watermark() {
        let mut tw = Tumbling::<u32, i64, i64, i64>::new(10, 0, 0);
        let step = |acc: &i64, v: &i64, w: i64| acc + w * v;

        let out1 = tw.ingest(3, &idx(vec![((1, 5), 1)]), step);
        assert!(out1.is_empty(), "bucket not yet past watermark");

        let out2 = tw.ingest(12, &idx(vec![((1, 1), 1)]), step);
        assert_eq!(out2.len(), 1);
        let (bucket, zs) = &out2[0];
        assert_eq!(*bucket, 0);
        assert_eq!(zs.get_weight(&(1, 5)), 1);

        let out3 = tw.ingest(13, &idx(vec![]), step);
        assert!(out3.is_empty(), "bucket already emitted once");
    }

    #[test]
    fn sliding_count_retains_last_n() {
        let mut sw = SlidingCount::<u32, i64, i64>::new(2);
        let w1 = sw.ingest(&idx(vec![((1, 10), 1)]));
        assert_eq!(w1.lookup(&1).len(), 1);

        let w2 = sw.ingest(&idx(vec![((1, 20), 1)]));
        assert_eq!(w2.lookup(&1).len(), 2);

        let w3 = sw.ingest(&idx(vec![((1, 30), 1)]));
        let vals: Vec<i64> = w3.lookup(&1).consolidated().into_iter().map(|(v, _)| v).collect();
        assert_eq!(vals.len(), 2);
        assert!(!vals.contains(&10));
    }
}
