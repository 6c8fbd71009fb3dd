//! The `Trace` physical layout: size-capped levels of immutable, sorted,
//! consolidated batches with background merging (§3.4, §4.1.1).
//!
//! This is the in-memory trace used by [`super::ZSet`]'s adaptive backend,
//! distinct from the on-disk trace/spine in [`crate::storage`].

use crate::{
    algebra::{AddAssignByRef, HasZero},
    zset::{
        consolidation::{consolidate, merge_sorted},
        policy::Policy,
    },
};
use std::time::Instant;

/// An immutable, sorted, consolidated batch of `(key, weight)` pairs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Batch<K, R> {
    pub(super) entries: Vec<(K, R)>,
}

impl<K: Ord + Clone, R: AddAssignByRef + HasZero + Clone> Batch<K, R> {
    pub fn from_tuples(mut entries: Vec<(K, R)>) -> Self {
        consolidate(&mut entries);
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &K) -> Option<&R> {
        self.entries
            .binary_search_by(|(k, _)| k.cmp(key))
            .ok()
            .map(|i| &self.entries[i].1)
    }

    pub fn merge(&self, other: &Batch<K, R>) -> Batch<K, R> {
        Batch {
            entries: merge_sorted(&self.entries, &other.entries),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(K, R)> {
        self.entries.iter()
    }
}

/// One size-capped level of the trace, holding at most `level_fanout`
/// batches before compaction merges the two smallest.
#[derive(Default)]
struct Level<K, R> {
    batches: Vec<Batch<K, R>>,
}

/// Layered sequence of batches with background-mergeable levels.
pub struct TraceState<K, R> {
    levels: Vec<Level<K, R>>,
    policy: Policy,
}

impl<K, R> TraceState<K, R>
where
    K: Ord + Clone,
    R: AddAssignByRef + HasZero + Clone,
{
    pub fn new(policy: Policy) -> Self {
        Self {
            levels: Vec::new(),
            policy,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.levels.iter().all(|l| l.batches.iter().all(|b| b.is_empty()))
    }

    /// Appends a freshly sealed batch to level 0 and runs compaction under
    /// the configured per-step budget.
    pub fn append_batch(&mut self, batch: Batch<K, R>) {
        if batch.is_empty() {
            return;
        }
        if self.levels.is_empty() {
            self.levels.push(Level::default());
        }
        self.levels[0].batches.push(batch);
        self.compact_step();
    }

    /// Merges the two smallest batches of any level that has grown beyond
    /// `level_fanout`, cascading a merged batch up to the next level.
    /// Bounded by `compact_budget` wall-clock time to avoid starving
    /// operator work.
    pub fn compact_step(&mut self) {
        let deadline = Instant::now() + self.policy.compact_budget;
        let fanout = self.policy.level_fanout;

        let mut level_idx = 0;
        while level_idx < self.levels.len() {
            if Instant::now() >= deadline {
                break;
            }
            if self.levels[level_idx].batches.len() > fanout {
                let level = &mut self.levels[level_idx];
                level.batches.sort_by_key(|b| b.len());
                let smallest = level.batches.remove(0);
                let next_smallest = level.batches.remove(0);
                let merged = smallest.merge(&next_smallest);

                if level_idx + 1 == self.levels.len() {
                    self.levels.push(Level::default());
                }
                self.levels[level_idx + 1].batches.push(merged);
            } else {
                level_idx += 1;
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<R> {
        let mut acc: Option<R> = None;
        for level in &self.levels {
            for batch in &level.batches {
                if let Some(w) = batch.get(key) {
                    match &mut acc {
                        Some(a) => a.add_assign_by_ref(w),
                        None => acc = Some(w.clone()),
                    }
                }
            }
        }
        acc.filter(|w| !w.is_zero())
    }

    /// Number of batches across all levels, used as a rough size estimate.
    pub fn batch_count(&self) -> usize {
        self.levels.iter().map(|l| l.batches.len()).sum()
    }

    /// Returns the fully merged, consolidated content of the trace.
    pub fn consolidated(&self) -> Vec<(K, R)> {
        let mut all: Vec<(K, R)> = Vec::new();
        for level in &self.levels {
            for batch in &level.batches {
                all.extend(batch.entries.iter().cloned());
            }
        }
        consolidate(&mut all);
        all
    }

    /// Merges every batch in every level down to a single batch: used by
    /// `compact_to` to guarantee no pre-`t` batch remains separately
    /// addressable (§8 invariants).
    pub fn compact_fully(&mut self) {
        let merged = Batch::from_tuples(self.consolidated());
        self.levels.clear();
        if !merged.is_empty() {
            self.levels.push(Level {
                batches: vec![merged],
            });
        }
    }
}

impl<K: Clone, R: Clone> Clone for TraceState<K, R> {
    fn clone(&self) -> Self {
        Self {
            levels: self
                .levels
                .iter()
                .map(|l| Level {
                    batches: l.batches.clone(),
                })
                .collect(),
            policy: self.policy,
        }
    }
}

impl<K: Clone, R: Clone> Clone for Level<K, R> {
    fn clone(&self) -> Self {
        Self {
            batches: self.batches.clone(),
        }
    }
}
