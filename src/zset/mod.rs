//! Z-set algebra and its adaptive storage backend (§3.1, §4.1).
//!
//! A [`ZSet`] is a finite mapping from keys to nonzero weights. Internally
//! it is one of three physical layouts, chosen adaptively as the set
//! grows: a sorted small array, an open-addressed hash table, or a
//! layered trace of immutable sorted batches. Callers never observe the
//! layout directly — every read goes through [`ZSet::consolidated`],
//! which presents the merged, zero-free logical view regardless of
//! physical state.

pub mod consolidation;
pub mod policy;
pub mod trace;

pub use policy::Policy;

use crate::algebra::{HasZero, ZRingValue};
use consolidation::consolidate;
use fxhash::FxBuildHasher;
use hashbrown::HashMap as RawHashMap;
use policy::Stats;
use std::{fmt, hash::Hash, time::Instant};
use trace::{Batch, TraceState};

/// The memtable's hash map, keyed with `fxhash` rather than the default
/// SipHash — entries are plain relational keys, not attacker-controlled
/// input, so the speed/DoS-resistance tradeoff favors speed.
type HashMap<K, R> = RawHashMap<K, R, FxBuildHasher>;

/// Tag identifying a Z-set's current physical layout, exposed only for
/// diagnostics and tests — operators must never branch on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    SmallVec,
    Memtable,
    Trace,
}

enum Storage<K, R> {
    Small(Vec<(K, R)>),
    Mem(HashMap<K, R>),
    Trace(TraceState<K, R>),
}

/// A finite mapping from keys of type `K` to nonzero weights of type `R`.
pub struct ZSet<K, R = i64> {
    storage: Storage<K, R>,
    stats: Stats,
    policy: Policy,
}

impl<K, R> ZSet<K, R>
where
    K: Ord + Clone + Hash + Eq,
    R: ZRingValue,
{
    /// The empty Z-set, identity for [`ZSet::add`].
    pub fn empty() -> Self {
        Self::with_policy(Policy::default())
    }

    pub fn with_policy(policy: Policy) -> Self {
        Self {
            storage: Storage::Small(Vec::new()),
            stats: Stats::default(),
            policy,
        }
    }

    /// A one-entry Z-set, or the empty set if `w` is zero.
    pub fn singleton(k: K, w: R) -> Self {
        let mut z = Self::empty();
        if !w.is_zero() {
            z.storage = Storage::Small(vec![(k, w)]);
        }
        z
    }

    /// Builds a Z-set from a batch of tuples using a single-pass builder,
    /// consolidating duplicate keys. Never use repeated `add`/`singleton`
    /// in a hot loop — that is quadratic; this is the builder path.
    pub fn from_tuples(entries: Vec<(K, R)>) -> Self {
        let mut z = Self::empty();
        z.extend(entries);
        z
    }

    pub fn layout(&self) -> Layout {
        match &self.storage {
            Storage::Small(_) => Layout::SmallVec,
            Storage::Mem(_) => Layout::Memtable,
            Storage::Trace(_) => Layout::Trace,
        }
    }

    /// Number of distinct keys with nonzero weight (the support size).
    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Small(v) => v.len(),
            Storage::Mem(m) => m.len(),
            Storage::Trace(t) => t.consolidated().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Weight associated with `key`, or zero if absent (§4.1).
    pub fn get_weight(&self, key: &K) -> R {
        match &self.storage {
            Storage::Small(v) => v
                .binary_search_by(|(k, _)| k.cmp(key))
                .ok()
                .map(|i| v[i].1.clone())
                .unwrap_or_else(R::zero),
            Storage::Mem(m) => m.get(key).cloned().unwrap_or_else(R::zero),
            Storage::Trace(t) => t.get(key).unwrap_or_else(R::zero),
        }
    }

    /// Sum of absolute weights: the multiset cardinality (§4.1 `count`).
    pub fn count(&self) -> R {
        let mut total = R::zero();
        for (_, w) in self.consolidated().iter() {
            let abs = if w.clone() < R::zero() {
                w.clone().neg()
            } else {
                w.clone()
            };
            total += abs;
        }
        total
    }

    /// Consolidated `(key, weight)` pairs in key order, flushing any
    /// pending memtable entries into a merged view on demand. This is
    /// the only way code outside this module observes a Z-set's content.
    pub fn consolidated(&self) -> Vec<(K, R)> {
        match &self.storage {
            Storage::Small(v) => v.clone(),
            Storage::Mem(m) => {
                let mut v: Vec<(K, R)> = m.iter().map(|(k, r)| (k.clone(), r.clone())).collect();
                consolidate(&mut v);
                v
            }
            Storage::Trace(t) => t.consolidated(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, R)> {
        self.consolidated().into_iter()
    }

    /// Takes an arranged view: a key-ordered iterator over the current
    /// consolidated content. Forces a flush of pending memtable entries
    /// and tightens future flush thresholds by recording one more
    /// subscriber (§4.1 "Arranged views").
    pub fn arrange(&mut self) -> Vec<(K, R)> {
        self.stats.arranged_subscribers += 1;
        self.flush();
        self.consolidated()
    }

    /// Inserts a batch of `(key, weight)` pairs, applying the adaptive
    /// backend policy (§4.1.1) after the insert.
    pub fn extend(&mut self, entries: Vec<(K, R)>) {
        if entries.is_empty() {
            return;
        }
        let cancellations = entries.iter().filter(|(_, w)| *w < R::zero()).count();
        self.stats.record_inserts(entries.len(), cancellations);

        match &mut self.storage {
            Storage::Small(v) => {
                v.extend(entries);
                consolidate(v);
                if v.len() > self.policy.smallset_n {
                    self.promote_to_memtable();
                }
            }
            Storage::Mem(m) => {
                for (k, w) in entries {
                    upsert(m, k, w);
                }
            }
            Storage::Trace(t) => {
                // Entries land in a fresh overlay memtable sitting logically
                // atop the trace; the overlay is represented here simply as
                // another trace batch, flushed immediately so that
                // `consolidated` never has to special-case it.
                t.append_batch(Batch::from_tuples(entries));
            }
        }

        self.maybe_flush();
    }

    fn promote_to_memtable(&mut self) {
        if let Storage::Small(v) = &mut self.storage {
            let mut map = HashMap::with_capacity(v.len());
            for (k, w) in v.drain(..) {
                upsert(&mut map, k, w);
            }
            self.storage = Storage::Mem(map);
        }
    }

    /// Decides whether the memtable should be sealed into the trace,
    /// per the four triggers in §4.1.1.
    fn maybe_flush(&mut self) {
        let should_flush = match &self.storage {
            Storage::Mem(m) => {
                m.len() >= self.policy.flush_size
                    || self.stats.since_last_flush() >= self.policy.flush_time
                    || self.stats.arranged_subscribers > 0
                    || self.stats.cancel_rate_ewma > self.policy.cancel_ewma
            }
            _ => false,
        };
        if should_flush {
            log::debug!(
                "flushing memtable: len={} since_last_flush={:?} cancel_rate_ewma={:.3}",
                match &self.storage {
                    Storage::Mem(m) => m.len(),
                    _ => 0,
                },
                self.stats.since_last_flush(),
                self.stats.cancel_rate_ewma,
            );
            self.flush();
        }
    }

    /// Seals the memtable (sort, consolidate, drop zeros) and appends it
    /// as a new trace batch. A no-op if already in Trace layout with
    /// nothing pending, or still in SmallVec layout.
    pub fn flush(&mut self) {
        if let Storage::Mem(m) = &mut self.storage {
            let entries: Vec<(K, R)> = std::mem::take(m).into_iter().collect();
            let batch = Batch::from_tuples(entries);
            let mut trace = TraceState::new(self.policy);
            trace.append_batch(batch);
            self.storage = Storage::Trace(trace);
            self.stats.last_flush = Some(Instant::now());
        } else if let Storage::Trace(t) = &mut self.storage {
            log::debug!("compacting one trace step");
            t.compact_step();
        }
    }

    /// Merges every batch in the trace down to one, so no pre-existing
    /// batch remains separately addressable (§8 invariant on compaction).
    pub fn compact(&mut self) {
        self.flush();
        if let Storage::Trace(t) = &mut self.storage {
            log::debug!("compacting trace fully");
            t.compact_fully();
        }
    }

    /// Pointwise weight sum; commutative and associative (§4.1 `add`).
    pub fn add(&self, other: &Self) -> Self {
        let mut entries = self.consolidated();
        entries.extend(other.consolidated());
        Self::from_tuples(entries)
    }

    /// Pointwise weight negation; `add(a, negate(a)) = empty`.
    pub fn negate(&self) -> Self {
        let entries = self
            .consolidated()
            .into_iter()
            .map(|(k, w)| (k, w.neg()))
            .collect();
        Self::from_tuples(entries)
    }

    /// Multiplies all weights by `c`; `c = 0` yields the empty set.
    pub fn scalar_mul(&self, c: R) -> Self {
        if c.is_zero() {
            return Self::empty();
        }
        let entries = self
            .consolidated()
            .into_iter()
            .map(|(k, w)| (k, w.mul_by_ref(&c)))
            .collect();
        Self::from_tuples(entries)
    }

    /// Sugar for `add`.
    pub fn union(&self, other: &Self) -> Self {
        self.add(other)
    }

    /// Sugar for `add(a, negate(b))`.
    pub fn difference(&self, other: &Self) -> Self {
        self.add(&other.negate())
    }

    /// Maps keys through `f`, combining weights when `f` collapses
    /// distinct keys to the same output key. Preserves the total weight
    /// sum (§4.1 `map_keys`).
    pub fn map_keys<K2, F>(&self, f: F) -> ZSet<K2, R>
    where
        K2: Ord + Clone + Hash + Eq,
        F: Fn(&K) -> K2,
    {
        let entries = self
            .consolidated()
            .into_iter()
            .map(|(k, w)| (f(&k), w))
            .collect();
        ZSet::from_tuples(entries)
    }

    /// Keeps entries whose key satisfies `p`; weights unchanged.
    pub fn filter<F>(&self, p: F) -> Self
    where
        F: Fn(&K) -> bool,
    {
        let entries = self
            .consolidated()
            .into_iter()
            .filter(|(k, _)| p(k))
            .collect();
        Self::from_tuples(entries)
    }

    /// Maps each key to a sequence of output keys, each carrying the
    /// input weight; weights distribute over the produced sequence
    /// (§4.3 `flat_map`).
    pub fn flat_map<K2, I, F>(&self, f: F) -> ZSet<K2, R>
    where
        K2: Ord + Clone + Hash + Eq,
        I: IntoIterator<Item = K2>,
        F: Fn(&K) -> I,
    {
        let entries = self
            .consolidated()
            .into_iter()
            .flat_map(|(k, w)| f(&k).into_iter().map(move |k2| (k2, w.clone())))
            .collect();
        ZSet::from_tuples(entries)
    }

    /// Normalizes each weight to its sign in `{-1, 0, +1}`; zero entries
    /// are dropped (§4.1 `distinct`).
    pub fn distinct(&self) -> Self
    where
        R: From<i8>,
    {
        let entries = self
            .consolidated()
            .into_iter()
            .map(|(k, w)| {
                let sign: R = if w > R::zero() {
                    R::from(1)
                } else {
                    R::from(-1)
                };
                (k, sign)
            })
            .collect();
        Self::from_tuples(entries)
    }
}

fn upsert<K, R>(map: &mut HashMap<K, R>, key: K, weight: R)
where
    K: Hash + Eq,
    R: ZRingValue,
{
    match map.raw_entry_mut().from_key(&key) {
        hashbrown::hash_map::RawEntryMut::Vacant(v) => {
            if !weight.is_zero() {
                v.insert(key, weight);
            }
        }
        hashbrown::hash_map::RawEntryMut::Occupied(mut o) => {
            o.get_mut().add_assign_by_ref(&weight);
            if o.get().is_zero() {
                o.remove();
            }
        }
    }
}

impl<K, R> Clone for ZSet<K, R>
where
    K: Ord + Clone + Hash + Eq,
    R: ZRingValue,
{
    fn clone(&self) -> Self {
        // Cloning always yields the consolidated (SmallVec or Mem) form;
        // a cloned value re-adapts its own layout independently.
        let entries = self.consolidated();
        let storage = if entries.len() > self.policy.smallset_n {
            let mut map = HashMap::with_capacity(entries.len());
            for (k, w) in entries {
                map.insert(k, w);
            }
            Storage::Mem(map)
        } else {
            Storage::Small(entries)
        };
        Self {
            storage,
            stats: self.stats,
            policy: self.policy,
        }
    }
}

impl<K, R> PartialEq for ZSet<K, R>
where
    K: Ord + Clone + Hash + Eq,
    R: ZRingValue,
{
    /// Equality of the consolidated logical view; iteration order and
    /// physical layout are irrelevant (§3.1, §8).
    fn eq(&self, other: &Self) -> bool {
        self.consolidated() == other.consolidated()
    }
}

impl<K, R> Eq for ZSet<K, R>
where
    K: Ord + Clone + Hash + Eq,
    R: ZRingValue,
{
}

impl<K, R> fmt::Debug for ZSet<K, R>
where
    K: Ord + Clone + Hash + Eq + fmt::Debug,
    R: ZRingValue + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.consolidated()).finish()
    }
}

impl<K, R> FromIterator<(K, R)> for ZSet<K, R>
where
    K: Ord + Clone + Hash + Eq,
    R: ZRingValue,
{
    fn from_iter<I: IntoIterator<Item = (K, R)>>(iter: I) -> Self {
        Self::from_tuples(iter.into_iter().collect())
    }
}

/// Convenience macro for building Z-set literals in tests, e.g.
/// `zset!{ "a" => 1, "b" => -2 }`.
#[macro_export]
macro_rules! zset {
    () => { $crate::zset::ZSet::empty() };
    ($($key:expr => $weight:expr),+ $(,)?) => {
        $crate::zset::ZSet::from_tuples(vec![$(($key, $weight)),+])
    };
}
