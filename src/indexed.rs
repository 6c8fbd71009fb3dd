//! Indexed Z-sets: `K -> ZSet<V>`, used for grouping and as the build/probe
//! side of joins (§3.2, §4.2).

use crate::{algebra::ZRingValue, zset::ZSet};
use hashbrown::HashMap;
use std::hash::Hash;

/// A mapping from keys to Z-sets of values. Keys whose Z-set becomes
/// empty disappear from the index.
#[derive(Clone, Debug)]
pub struct IndexedZSet<K, V, R = i64> {
    map: HashMap<K, ZSet<V, R>>,
}

impl<K, V, R> IndexedZSet<K, V, R>
where
    K: Ord + Clone + Hash + Eq,
    V: Ord + Clone + Hash + Eq,
    R: ZRingValue,
{
    pub fn empty() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// `group_by(key_fn, z)`: builds an indexed Z-set from `z` by routing
    /// each `(key, weight)` entry into the Z-set for `key_fn(key)`.
    pub fn group_by<K0, F>(key_fn: F, z: &ZSet<K0, R>) -> Self
    where
        K0: Ord + Clone + Hash + Eq,
        F: Fn(&K0) -> (K, V),
    {
        let mut builder: HashMap<K, Vec<(V, R)>> = HashMap::new();
        for (k0, w) in z.consolidated() {
            let (k, v) = key_fn(&k0);
            builder.entry(k).or_default().push((v, w));
        }
        let map = builder
            .into_iter()
            .filter_map(|(k, entries)| {
                let vs = ZSet::from_tuples(entries);
                if vs.is_empty() {
                    None
                } else {
                    Some((k, vs))
                }
            })
            .collect();
        Self { map }
    }

    /// Equivalent to `group_by(fst, pairs)` but uses a single builder pass.
    pub fn from_zset(pairs: &ZSet<(K, V), R>) -> Self {
        let mut builder: HashMap<K, Vec<(V, R)>> = HashMap::new();
        for ((k, v), w) in pairs.consolidated() {
            builder.entry(k).or_default().push((v, w));
        }
        let map = builder
            .into_iter()
            .filter_map(|(k, entries)| {
                let vs = ZSet::from_tuples(entries);
                if vs.is_empty() {
                    None
                } else {
                    Some((k, vs))
                }
            })
            .collect();
        Self { map }
    }

    /// Inverse of [`Self::from_zset`].
    pub fn to_zset(&self) -> ZSet<(K, V), R> {
        let entries = self
            .map
            .iter()
            .flat_map(|(k, vs)| vs.consolidated().into_iter().map(move |(v, w)| ((k.clone(), v), w)))
            .collect();
        ZSet::from_tuples(entries)
    }

    /// The Z-set of values associated with `k`, or empty if absent.
    pub fn lookup(&self, k: &K) -> ZSet<V, R> {
        self.map.get(k).cloned().unwrap_or_else(ZSet::empty)
    }

    pub fn contains_key(&self, k: &K) -> bool {
        self.map.contains_key(k)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.map.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &ZSet<V, R>)> {
        self.map.iter()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Key-wise Z-set addition; keys whose Z-set becomes empty disappear.
    pub fn add(&self, other: &Self) -> Self {
        let mut map = self.map.clone();
        for (k, vs) in &other.map {
            let merged = match map.remove(k) {
                Some(existing) => existing.add(vs),
                None => vs.clone(),
            };
            if !merged.is_empty() {
                map.insert(k.clone(), merged);
            }
        }
        Self { map }
    }

    /// Key-wise Z-set negation.
    pub fn negate(&self) -> Self {
        let map = self
            .map
            .iter()
            .map(|(k, vs)| (k.clone(), vs.negate()))
            .collect();
        Self { map }
    }

    /// For each common key, the pairwise product of left and right value
    /// Z-sets with multiplied weights; keys absent from either side are
    /// skipped (§4.2 `join_core`).
    pub fn join_core<V2, VO, F>(&self, other: &IndexedZSet<K, V2, R>, f: F) -> IndexedZSet<K, VO, R>
    where
        V2: Ord + Clone + Hash + Eq,
        VO: Ord + Clone + Hash + Eq,
        F: Fn(&K, &V, &V2) -> VO,
    {
        let mut map = HashMap::new();
        for (k, left_vs) in &self.map {
            if let Some(right_vs) = other.map.get(k) {
                let mut entries = Vec::new();
                for (lv, lw) in left_vs.consolidated() {
                    for (rv, rw) in right_vs.consolidated() {
                        let w = lw.mul_by_ref(&rw);
                        if !crate::algebra::HasZero::is_zero(&w) {
                            entries.push((f(k, &lv, &rv), w));
                        }
                    }
                }
                let vs = ZSet::from_tuples(entries);
                if !vs.is_empty() {
                    map.insert(k.clone(), vs);
                }
            }
        }
        IndexedZSet { map }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zset::ZSet;

    #[test]
    fn roundtrip_from_to_zset() {
        let z: ZSet<(u32, &'static str), i64> = ZSet::from_tuples(vec![
            ((1, "a"), 1),
            ((1, "b"), 2),
            ((2, "c"), 1),
        ]);
        let ix = IndexedZSet::from_zset(&z);
        assert_eq!(ix.to_zset(), z);
    }

    #[test]
    fn join_core_multiplies_weights() {
        let left: ZSet<(u32, &'static str), i64> =
            ZSet::from_tuples(vec![((1, "a"), 2), ((2, "b"), 1)]);
        let right: ZSet<(u32, &'static str), i64> =
            ZSet::from_tuples(vec![((1, "x"), 3), ((3, "z"), 1)]);

        let li = IndexedZSet::from_zset(&left);
        let ri = IndexedZSet::from_zset(&right);

        let joined = li.join_core(&ri, |k, v1, v2| (*k, *v1, *v2));
        let out = joined.to_zset();
        assert_eq!(out.get_weight(&(1, (1, "a", "x"))), 6);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn empty_value_sets_disappear() {
        let a: ZSet<&'static str, i64> = ZSet::from_tuples(vec![("x", 1)]);
        let b: ZSet<&'static str, i64> = ZSet::from_tuples(vec![("x", -1)]);
        let ia = IndexedZSet::group_by(|k: &&'static str| (*k, *k), &a);
        let ib = IndexedZSet::group_by(|k: &&'static str| (*k, *k), &b);
        let merged = ia.add(&ib);
        assert!(merged.is_empty());
    }
}
