//! Temporal spine (§4.9 "Temporal spine"): a collection of per-time
//! immutable batches, queryable by point or range, with compaction
//! allowed within (but not across) a bucket.

use crate::{
    error::{Error, Result},
    zset::trace::Batch,
};
use std::collections::BTreeMap;
use std::hash::Hash;

pub struct TemporalSpine<K, R> {
    buckets: BTreeMap<i64, Batch<K, R>>,
    max_time: Option<i64>,
}

impl<K, R> Default for TemporalSpine<K, R>
where
    K: Ord + Clone,
    R: crate::algebra::AddAssignByRef + crate::algebra::HasZero + Clone,
{
    fn default() -> Self {
        Self {
            buckets: BTreeMap::new(),
            max_time: None,
        }
    }
}

impl<K, R> TemporalSpine<K, R>
where
    K: Ord + Clone,
    R: crate::algebra::AddAssignByRef + crate::algebra::HasZero + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `b` at time `t`. Rejects `t` earlier than any
    /// previously-inserted time (§4.9 "requires non-decreasing t").
    pub fn insert_batch(&mut self, t: i64, b: Batch<K, R>) -> Result<()> {
        if let Some(max) = self.max_time {
            if t < max {
                return Err(Error::InvariantViolation(format!(
                    "temporal spine insert at t={t} is earlier than max recorded time {max}"
                )));
            }
        }
        self.max_time = Some(self.max_time.map_or(t, |m| m.max(t)));
        match self.buckets.remove(&t) {
            Some(existing) => self.buckets.insert(t, existing.merge(&b)),
            None => self.buckets.insert(t, b),
        };
        Ok(())
    }

    pub fn query_at_time(&self, t: i64) -> Option<&Batch<K, R>> {
        self.buckets.get(&t)
    }

    /// All per-time batches with `t0 <= t <= t1`, in time order.
    pub fn query_range(&self, t0: i64, t1: i64) -> Vec<(i64, &Batch<K, R>)> {
        self.buckets.range(t0..=t1).map(|(t, b)| (*t, b)).collect()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_order_insert() {
        let mut spine: TemporalSpine<i64, i64> = TemporalSpine::new();
        spine.insert_batch(5, Batch::from_tuples(vec![(1, 1)])).unwrap();
        assert!(spine.insert_batch(3, Batch::from_tuples(vec![(2, 1)])).is_err());
    }

    #[test]
    fn query_range_returns_buckets_in_order() {
        let mut spine: TemporalSpine<i64, i64> = TemporalSpine::new();
        spine.insert_batch(1, Batch::from_tuples(vec![(10, 1)])).unwrap();
        spine.insert_batch(2, Batch::from_tuples(vec![(20, 1)])).unwrap();
        spine.insert_batch(3, Batch::from_tuples(vec![(30, 1)])).unwrap();

        let times: Vec<i64> = spine.query_range(1, 2).into_iter().map(|(t, _)| t).collect();
        assert_eq!(times, vec![1, 2]);
        assert!(spine.query_at_time(3).is_some());
        assert!(spine.query_at_time(4).is_none());
    }

    #[test]
    fn same_time_inserts_merge_within_bucket() {
        let mut spine: TemporalSpine<i64, i64> = TemporalSpine::new();
        spine.insert_batch(1, Batch::from_tuples(vec![(10, 1)])).unwrap();
        spine.insert_batch(1, Batch::from_tuples(vec![(10, 1), (20, 1)])).unwrap();
        assert_eq!(spine.bucket_count(), 1);
        assert_eq!(spine.query_at_time(1).unwrap().get(&10), Some(&2));
    }
}
