//! Aggregation operators (§4.5): stateful operators maintaining
//! `HashMap<K, Acc>`, emitting `((K, Acc), 1)` per key with a non-default
//! accumulator and retracting the previous entry when it changes.

use crate::{algebra::ZRingValue, indexed::IndexedZSet, zset::ZSet};
use hashbrown::HashMap;
use std::hash::Hash;

/// A generic incremental aggregation: `step` folds `(value, weight)`
/// observations into an accumulator, `is_default` decides when a key's
/// accumulator is equivalent to "absent" (and should stop being emitted).
pub struct Aggregate<K, V, Acc, R> {
    state: HashMap<K, Acc>,
    seed: Acc,
    _marker: std::marker::PhantomData<(K, V, R)>,
}

impl<K, V, Acc, R> Aggregate<K, V, Acc, R>
where
    K: Ord + Clone + Hash + Eq,
    V: Ord + Clone + Hash + Eq,
    Acc: Clone + Eq + Hash,
    R: ZRingValue,
{
    pub fn new(seed: Acc) -> Self {
        Self {
            state: HashMap::new(),
            seed,
            _marker: std::marker::PhantomData,
        }
    }

    /// Applies `delta` to every touched key's accumulator via `step`,
    /// emitting a retraction for the old `(K, Acc)` pair and an insertion
    /// for the new one whenever the accumulator actually changes. Keys
    /// whose accumulator becomes `is_default` are dropped from state.
    pub fn step<Step, IsDefault>(
        &mut self,
        delta: &IndexedZSet<K, V, R>,
        step: Step,
        is_default: IsDefault,
    ) -> ZSet<(K, Acc), R>
    where
        Step: Fn(&Acc, &V, R) -> Acc,
        IsDefault: Fn(&Acc) -> bool,
    {
        let mut out = ZSet::empty();
        for k in delta.keys() {
            let old_acc = self.state.get(k).cloned();
            let mut acc = old_acc.clone().unwrap_or_else(|| self.seed.clone());
            for (v, w) in delta.lookup(k).consolidated() {
                acc = step(&acc, &v, w);
            }

            if let Some(old) = &old_acc {
                out = out.add(&ZSet::singleton((k.clone(), old.clone()), -R::one()));
            }

            if is_default(&acc) {
                self.state.remove(k);
            } else {
                out = out.add(&ZSet::singleton((k.clone(), acc.clone()), R::one()));
                self.state.insert(k.clone(), acc);
            }
        }
        out
    }
}

/// `count`: accumulator is `i64`, step adds the observation's weight.
pub struct Count<K, V, R> {
    inner: Aggregate<K, V, i64, R>,
}

impl<K, V, R> Count<K, V, R>
where
    K: Ord + Clone + Hash + Eq,
    V: Ord + Clone + Hash + Eq,
    R: ZRingValue + Into<i64>,
{
    pub fn new() -> Self {
        Self {
            inner: Aggregate::new(0),
        }
    }

    pub fn step(&mut self, delta: &IndexedZSet<K, V, R>) -> ZSet<(K, i64), R> {
        self.inner.step(
            delta,
            |acc, _v, w| acc + w.into(),
            |acc| *acc == 0,
        )
    }
}

impl<K, V, R> Default for Count<K, V, R>
where
    K: Ord + Clone + Hash + Eq,
    V: Ord + Clone + Hash + Eq,
    R: ZRingValue + Into<i64>,
{
    fn default() -> Self {
        Self::new()
    }
}

/// `sum`: accumulator is the value type itself, step adds `weight * value`.
pub struct Sum<K, R> {
    inner: Aggregate<K, i64, i64, R>,
}

impl<K, R> Sum<K, R>
where
    K: Ord + Clone + Hash + Eq,
    R: ZRingValue + Into<i64>,
{
    pub fn new() -> Self {
        Self {
            inner: Aggregate::new(0),
        }
    }

    pub fn step(&mut self, delta: &IndexedZSet<K, i64, R>) -> ZSet<(K, i64), R> {
        self.inner.step(
            delta,
            |acc, v, w| acc + w.into() * v,
            |acc| *acc == 0,
        )
    }
}

impl<K, R> Default for Sum<K, R>
where
    K: Ord + Clone + Hash + Eq,
    R: ZRingValue + Into<i64>,
{
    fn default() -> Self {
        Self::new()
    }
}

/// `average`: accumulator is `(sum, count)`; output is `sum / count` when
/// `count != 0`, and the key is removed when `count` reaches zero.
pub struct Average<K, R> {
    inner: Aggregate<K, i64, (i64, i64), R>,
}

impl<K, R> Average<K, R>
where
    K: Ord + Clone + Hash + Eq,
    R: ZRingValue + Into<i64>,
{
    pub fn new() -> Self {
        Self {
            inner: Aggregate::new((0, 0)),
        }
    }

    /// Output encoding: `((K, average_as_f64_bits), 1)` is avoided in
    /// favor of exposing the raw `(sum, count)` accumulator, letting the
    /// caller divide with whatever rounding policy it needs.
    pub fn step(&mut self, delta: &IndexedZSet<K, i64, R>) -> ZSet<(K, (i64, i64)), R> {
        self.inner.step(
            delta,
            |acc, v, w| {
                let wi: i64 = w.into();
                (acc.0 + wi * v, acc.1 + wi)
            },
            |acc| acc.1 == 0,
        )
    }
}

impl<K, R> Default for Average<K, R>
where
    K: Ord + Clone + Hash + Eq,
    R: ZRingValue + Into<i64>,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Divides a `(sum, count)` accumulator, returning `None` when `count` is
/// zero (matching the spec's "output = sum/count when count != 0").
pub fn average_value((sum, count): (i64, i64)) -> Option<f64> {
    if count == 0 {
        None
    } else {
        Some(sum as f64 / count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx(pairs: Vec<((u32, i64), i64)>) -> IndexedZSet<u32, i64, i64> {
        IndexedZSet::from_zset(&ZSet::from_tuples(pairs))
    }

    #[test]
    fn count_tracks_insertions_and_deletions() {
        let mut count = Count::<u32, i64, i64>::new();
        let out1 = count.step(&idx(vec![((1, 10), 1), ((1, 20), 1)]));
        assert_eq!(out1.get_weight(&(1, 2)), 1);

        let out2 = count.step(&idx(vec![((1, 10), -1)]));
        assert_eq!(out2.get_weight(&(1, 2)), -1);
        assert_eq!(out2.get_weight(&(1, 1)), 1);
    }

    #[test]
    fn count_removes_key_at_zero() {
        let mut count = Count::<u32, i64, i64>::new();
        let _ = count.step(&idx(vec![((1, 10), 1)]));
        let out2 = count.step(&idx(vec![((1, 10), -1)]));
        assert_eq!(out2.get_weight(&(1, 1)), -1);
        assert!(out2.get_weight(&(1, 0)) == 0);
    }

    #[test]
    fn sum_accumulates_weighted_values() {
        let mut sum = Sum::<u32, i64>::new();
        let out = sum.step(&idx(vec![((1, 10), 1), ((1, 5), 1)]));
        assert_eq!(out.get_weight(&(1, 15)), 1);
    }

    #[test]
    fn average_divides_sum_by_count() {
        let mut avg = Average::<u32, i64>::new();
        let out = avg.step(&idx(vec![((1, 10), 1), ((1, 20), 1)]));
        assert_eq!(out.get_weight(&(1, (30, 2))), 1);
        assert_eq!(average_value((30, 2)), Some(15.0));
        assert_eq!(average_value((0, 0)), None);
    }
}
