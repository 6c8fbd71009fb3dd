//! Incremental join operators (§4.4).
//!
//! Each join operator maintains indexed state for both inputs and, given
//! deltas `ΔL, ΔR`, computes `δ(L⋈R) = (ΔL⋈R) ⊕ (L⋈ΔR) ⊕ (ΔL⋈ΔR)` against
//! the state *before* the step, then commits the new state.

use crate::{
    algebra::ZRingValue,
    indexed::IndexedZSet,
    zset::{policy::EWMA_ALPHA, ZSet},
};
use std::hash::Hash;

/// Tracks the relative size of left/right deltas with hysteresis, to pick
/// between the hash-overlay fast path and the generic indexed path
/// without thrashing on every step (§4.4 "Dispatch").
pub struct JoinDispatcher {
    left_ewma: f64,
    right_ewma: f64,
    current: DispatchPath,
    hysteresis: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchPath {
    /// Hash-overlay fast path: cheap for small, skewed deltas.
    HashOverlay,
    /// Generic indexed-Z-set path: arranged iteration, better for large
    /// balanced deltas.
    Indexed,
}

impl Default for JoinDispatcher {
    fn default() -> Self {
        Self {
            left_ewma: 0.0,
            right_ewma: 0.0,
            current: DispatchPath::HashOverlay,
            hysteresis: 0.2,
        }
    }
}

impl JoinDispatcher {
    /// Updates the size EWMAs and returns the path to use for this step.
    /// Only switches paths when the new candidate's score beats the
    /// current path's score by more than `hysteresis`, preventing
    /// oscillation around the threshold.
    pub fn dispatch(&mut self, left_delta_len: usize, right_delta_len: usize) -> DispatchPath {
        self.left_ewma = EWMA_ALPHA * left_delta_len as f64 + (1.0 - EWMA_ALPHA) * self.left_ewma;
        self.right_ewma =
            EWMA_ALPHA * right_delta_len as f64 + (1.0 - EWMA_ALPHA) * self.right_ewma;

        let total = self.left_ewma + self.right_ewma;
        const SMALL_DELTA_THRESHOLD: f64 = 64.0;
        let candidate = if total <= SMALL_DELTA_THRESHOLD {
            DispatchPath::HashOverlay
        } else {
            DispatchPath::Indexed
        };

        if candidate != self.current {
            let switch_clears_hysteresis = (total - SMALL_DELTA_THRESHOLD).abs()
                > SMALL_DELTA_THRESHOLD * self.hysteresis;
            if switch_clears_hysteresis {
                self.current = candidate;
            }
        }
        self.current
    }
}

/// Incremental inner-join operator: output shape `(K, V1, V2)`.
pub struct Join<K, V1, V2, R> {
    left: IndexedZSet<K, V1, R>,
    right: IndexedZSet<K, V2, R>,
    dispatcher: JoinDispatcher,
}

impl<K, V1, V2, R> Default for Join<K, V1, V2, R>
where
    K: Ord + Clone + Hash + Eq,
    V1: Ord + Clone + Hash + Eq,
    V2: Ord + Clone + Hash + Eq,
    R: ZRingValue,
{
    fn default() -> Self {
        Self {
            left: IndexedZSet::empty(),
            right: IndexedZSet::empty(),
            dispatcher: JoinDispatcher::default(),
        }
    }
}

impl<K, V1, V2, R> Join<K, V1, V2, R>
where
    K: Ord + Clone + Hash + Eq,
    V1: Ord + Clone + Hash + Eq,
    V2: Ord + Clone + Hash + Eq,
    R: ZRingValue,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// The dispatch path the last `step` call chose (for tests/metrics).
    pub fn last_dispatch(&mut self, left_delta_len: usize, right_delta_len: usize) -> DispatchPath {
        self.dispatcher.dispatch(left_delta_len, right_delta_len)
    }

    /// `δ(L⋈R) = (ΔL⋈R) ⊕ (L⋈ΔR) ⊕ (ΔL⋈ΔR)` against the pre-step state,
    /// then commits `left += ΔL`, `right += ΔR`.
    pub fn step(
        &mut self,
        delta_left: &IndexedZSet<K, V1, R>,
        delta_right: &IndexedZSet<K, V2, R>,
    ) -> ZSet<(K, V1, V2), R> {
        self.dispatcher
            .dispatch(delta_left.len(), delta_right.len());

        let combine = |k: &K, v1: &V1, v2: &V2| (k.clone(), v1.clone(), v2.clone());

        let dl_r = delta_left.join_core(&self.right, combine).to_zset();
        let l_dr = self.left.join_core(delta_right, combine).to_zset();
        let dl_dr = delta_left.join_core(delta_right, combine).to_zset();

        self.left = self.left.add(delta_left);
        self.right = self.right.add(delta_right);

        dl_r.add(&l_dr).add(&dl_dr)
    }
}

/// Incremental left-outer-join operator: output shape `(K, V1, Option<V2>)`.
///
/// Previously-unmatched left rows carry `None`; when such a key first
/// gains a match, a negative for the `None` row and a positive for the
/// matched pair are both emitted so the accumulated view tracks the
/// batch left-outer-join.
pub struct LeftOuterJoin<K, V1, V2, R> {
    inner: Join<K, V1, V2, R>,
    left: IndexedZSet<K, V1, R>,
    right: IndexedZSet<K, V2, R>,
}

impl<K, V1, V2, R> Default for LeftOuterJoin<K, V1, V2, R>
where
    K: Ord + Clone + Hash + Eq,
    V1: Ord + Clone + Hash + Eq,
    V2: Ord + Clone + Hash + Eq,
    R: ZRingValue,
{
    fn default() -> Self {
        Self {
            inner: Join::default(),
            left: IndexedZSet::empty(),
            right: IndexedZSet::empty(),
        }
    }
}

impl<K, V1, V2, R> LeftOuterJoin<K, V1, V2, R>
where
    K: Ord + Clone + Hash + Eq,
    V1: Ord + Clone + Hash + Eq,
    V2: Ord + Clone + Hash + Eq,
    R: ZRingValue,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(
        &mut self,
        delta_left: &IndexedZSet<K, V1, R>,
        delta_right: &IndexedZSet<K, V2, R>,
    ) -> ZSet<(K, V1, Option<V2>), R> {
        let matched = self.inner.step(delta_left, delta_right);
        let matched_some: ZSet<(K, V1, Option<V2>), R> =
            matched.map_keys(|(k, v1, v2)| (k.clone(), v1.clone(), Some(v2.clone())));

        // Unmatched rows before this step, for keys touched by this step.
        let touched_keys: Vec<K> = delta_left
            .keys()
            .chain(delta_right.keys())
            .cloned()
            .collect();

        let mut none_delta = ZSet::empty();
        for k in &touched_keys {
            let was_matched = self.right.contains_key(k);
            let now_matched = {
                let mut r = self.right.clone();
                r = r.add(delta_right);
                r.contains_key(k)
            };

            // None-output(k) = leftRows(k) if right is absent for k, else 0.
            // The emitted delta is None-output(after) - None-output(before):
            // absent throughout only the fresh delta_left rows are new;
            // present throughout nothing changes; a transition retracts or
            // adds the *old* (gaining a match) or *full* (losing one) rows.
            let delta_none = match (was_matched, now_matched) {
                (false, false) => delta_left.lookup(k),
                (true, true) => ZSet::empty(),
                (false, true) => self.left.lookup(k).negate(),
                (true, false) => self.left.lookup(k).add(&delta_left.lookup(k)),
            };
            for (v1, w) in delta_none.consolidated() {
                none_delta = none_delta.add(&ZSet::singleton((k.clone(), v1, None), w));
            }
        }

        self.left = self.left.add(delta_left);
        self.right = self.right.add(delta_right);

        matched_some.add(&none_delta)
    }
}

/// Incremental right-outer-join operator: output shape
/// `(K, Option<V1>, V2)`. Symmetric to [`LeftOuterJoin`].
pub struct RightOuterJoin<K, V1, V2, R> {
    inner: LeftOuterJoin<K, V2, V1, R>,
}

impl<K, V1, V2, R> Default for RightOuterJoin<K, V1, V2, R>
where
    K: Ord + Clone + Hash + Eq,
    V1: Ord + Clone + Hash + Eq,
    V2: Ord + Clone + Hash + Eq,
    R: ZRingValue,
{
    fn default() -> Self {
        Self {
            inner: LeftOuterJoin::default(),
        }
    }
}

impl<K, V1, V2, R> RightOuterJoin<K, V1, V2, R>
where
    K: Ord + Clone + Hash + Eq,
    V1: Ord + Clone + Hash + Eq,
    V2: Ord + Clone + Hash + Eq,
    R: ZRingValue,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(
        &mut self,
        delta_left: &IndexedZSet<K, V1, R>,
        delta_right: &IndexedZSet<K, V2, R>,
    ) -> ZSet<(K, Option<V1>, V2), R> {
        let swapped = self.inner.step(delta_right, delta_left);
        swapped.map_keys(|(k, v2, v1)| (k.clone(), v1.clone(), v2.clone()))
    }
}

/// Incremental full-outer-join operator: output shape
/// `(K, Option<V1>, Option<V2>)`. Computed as the union of the inner
/// join, the left-only rows, and the right-only rows.
pub struct FullOuterJoin<K, V1, V2, R> {
    left_outer: LeftOuterJoin<K, V1, V2, R>,
    right_outer: RightOuterJoin<K, V1, V2, R>,
}

impl<K, V1, V2, R> Default for FullOuterJoin<K, V1, V2, R>
where
    K: Ord + Clone + Hash + Eq,
    V1: Ord + Clone + Hash + Eq,
    V2: Ord + Clone + Hash + Eq,
    R: ZRingValue,
{
    fn default() -> Self {
        Self {
            left_outer: LeftOuterJoin::default(),
            right_outer: RightOuterJoin::default(),
        }
    }
}

impl<K, V1, V2, R> FullOuterJoin<K, V1, V2, R>
where
    K: Ord + Clone + Hash + Eq,
    V1: Ord + Clone + Hash + Eq,
    V2: Ord + Clone + Hash + Eq,
    R: ZRingValue,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs both outer directions against independently-maintained
    /// copies of the state and unions the matched/left-only rows from
    /// the left-outer pass with the right-only rows from the
    /// right-outer pass, avoiding double-counting matched pairs.
    pub fn step(
        &mut self,
        delta_left: &IndexedZSet<K, V1, R>,
        delta_right: &IndexedZSet<K, V2, R>,
    ) -> ZSet<(K, Option<V1>, Option<V2>), R> {
        let lo = self.left_outer.step(delta_left, delta_right);
        let lo_full: ZSet<(K, Option<V1>, Option<V2>), R> =
            lo.map_keys(|(k, v1, v2)| (k.clone(), Some(v1.clone()), v2.clone()));

        let ro = self.right_outer.step(delta_left, delta_right);
        let right_only: ZSet<(K, Option<V1>, Option<V2>), R> = ro
            .filter(|(_, v1, _)| v1.is_none())
            .map_keys(|(k, v1, v2)| (k.clone(), v1.clone(), Some(v2.clone())));

        lo_full.add(&right_only)
    }
}

/// Incremental anti-join: left rows whose key is absent from the right
/// side, output shape `(K, V1)`.
pub struct AntiJoin<K, V1, V2, R> {
    left: IndexedZSet<K, V1, R>,
    right: IndexedZSet<K, V2, R>,
}

impl<K, V1, V2, R> Default for AntiJoin<K, V1, V2, R>
where
    K: Ord + Clone + Hash + Eq,
    V1: Ord + Clone + Hash + Eq,
    V2: Ord + Clone + Hash + Eq,
    R: ZRingValue,
{
    fn default() -> Self {
        Self {
            left: IndexedZSet::empty(),
            right: IndexedZSet::empty(),
        }
    }
}

impl<K, V1, V2, R> AntiJoin<K, V1, V2, R>
where
    K: Ord + Clone + Hash + Eq,
    V1: Ord + Clone + Hash + Eq,
    V2: Ord + Clone + Hash + Eq,
    R: ZRingValue,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(
        &mut self,
        delta_left: &IndexedZSet<K, V1, R>,
        delta_right: &IndexedZSet<K, V2, R>,
    ) -> ZSet<(K, V1), R> {
        let new_left = self.left.add(delta_left);
        let new_right = self.right.add(delta_right);

        let touched_keys: Vec<K> = delta_left
            .keys()
            .chain(delta_right.keys())
            .cloned()
            .collect();

        let mut delta = ZSet::empty();
        for k in &touched_keys {
            let was_absent = !self.right.contains_key(k);
            let now_absent = !new_right.contains_key(k);

            // output(k) = leftRows(k) if right absent for k, else 0. Absent
            // throughout: only delta_left is new. Present throughout:
            // nothing changes. Gaining a match retracts the *old* rows
            // (delta_left's own rows were never emitted); losing one adds
            // the *full* (old + delta) rows.
            let delta_rows = match (was_absent, now_absent) {
                (true, true) => delta_left.lookup(k),
                (false, false) => ZSet::empty(),
                (true, false) => self.left.lookup(k).negate(),
                (false, true) => new_left.lookup(k),
            };
            for (v1, w) in delta_rows.consolidated() {
                delta = delta.add(&ZSet::singleton((k.clone(), v1), w));
            }
        }

        self.left = new_left;
        self.right = new_right;
        delta
    }
}

/// Incremental semi-join: left rows whose key exists in the right side,
/// output shape `(K, V1)`. Dual of [`AntiJoin`].
pub struct SemiJoin<K, V1, V2, R> {
    left: IndexedZSet<K, V1, R>,
    right: IndexedZSet<K, V2, R>,
}

impl<K, V1, V2, R> Default for SemiJoin<K, V1, V2, R>
where
    K: Ord + Clone + Hash + Eq,
    V1: Ord + Clone + Hash + Eq,
    V2: Ord + Clone + Hash + Eq,
    R: ZRingValue,
{
    fn default() -> Self {
        Self {
            left: IndexedZSet::empty(),
            right: IndexedZSet::empty(),
        }
    }
}

impl<K, V1, V2, R> SemiJoin<K, V1, V2, R>
where
    K: Ord + Clone + Hash + Eq,
    V1: Ord + Clone + Hash + Eq,
    V2: Ord + Clone + Hash + Eq,
    R: ZRingValue,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(
        &mut self,
        delta_left: &IndexedZSet<K, V1, R>,
        delta_right: &IndexedZSet<K, V2, R>,
    ) -> ZSet<(K, V1), R> {
        let new_left = self.left.add(delta_left);
        let new_right = self.right.add(delta_right);

        let touched_keys: Vec<K> = delta_left
            .keys()
            .chain(delta_right.keys())
            .cloned()
            .collect();

        let mut delta = ZSet::empty();
        for k in &touched_keys {
            let was_present = self.right.contains_key(k);
            let now_present = new_right.contains_key(k);

            // Dual of AntiJoin: output(k) = leftRows(k) if right present.
            let delta_rows = match (was_present, now_present) {
                (true, true) => delta_left.lookup(k),
                (false, false) => ZSet::empty(),
                (false, true) => new_left.lookup(k),
                (true, false) => self.left.lookup(k).negate(),
            };
            for (v1, w) in delta_rows.consolidated() {
                delta = delta.add(&ZSet::singleton((k.clone(), v1), w));
            }
        }

        self.left = new_left;
        self.right = new_right;
        delta
    }
}

/// Incremental cross join (no key): maintains both sides in full and
/// applies the three-term incremental formula without indexing, output
/// shape `(V1, V2)`.
pub struct CrossJoin<V1, V2, R> {
    left: ZSet<V1, R>,
    right: ZSet<V2, R>,
}

impl<V1, V2, R> Default for CrossJoin<V1, V2, R>
where
    V1: Ord + Clone + Hash + Eq,
    V2: Ord + Clone + Hash + Eq,
    R: ZRingValue,
{
    fn default() -> Self {
        Self {
            left: ZSet::empty(),
            right: ZSet::empty(),
        }
    }
}

impl<V1, V2, R> CrossJoin<V1, V2, R>
where
    V1: Ord + Clone + Hash + Eq,
    V2: Ord + Clone + Hash + Eq,
    R: ZRingValue,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn product(a: &ZSet<V1, R>, b: &ZSet<V2, R>) -> ZSet<(V1, V2), R> {
        let mut entries = Vec::new();
        for (v1, w1) in a.consolidated() {
            for (v2, w2) in b.consolidated() {
                let w = w1.mul_by_ref(&w2);
                if !crate::algebra::HasZero::is_zero(&w) {
                    entries.push(((v1.clone(), v2), w));
                }
            }
        }
        ZSet::from_tuples(entries)
    }

    pub fn step(&mut self, delta_left: &ZSet<V1, R>, delta_right: &ZSet<V2, R>) -> ZSet<(V1, V2), R> {
        let dl_r = Self::product(delta_left, &self.right);
        let l_dr = Self::product(&self.left, delta_right);
        let dl_dr = Self::product(delta_left, delta_right);

        self.left = self.left.add(delta_left);
        self.right = self.right.add(delta_right);

        dl_r.add(&l_dr).add(&dl_dr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zset::zset;

    fn idx<K: Ord + Clone + Hash + Eq, V: Ord + Clone + Hash + Eq>(
        pairs: Vec<((K, V), i64)>,
    ) -> IndexedZSet<K, V, i64> {
        IndexedZSet::from_zset(&ZSet::from_tuples(pairs))
    }

    #[test]
    fn inner_join_incremental_matches_batch() {
        let mut join = Join::<u32, &'static str, &'static str, i64>::new();

        let l1 = idx(vec![((1, "a"), 1)]);
        let r1 = idx(vec![((1, "x"), 1)]);
        let out1 = join.step(&l1, &r1);
        assert_eq!(out1.get_weight(&(1, "a", "x")), 1);

        let l2 = idx(vec![((2, "b"), 1)]);
        let r2 = idx(vec![]);
        let out2 = join.step(&l2, &r2);
        assert!(out2.is_empty());

        let r3 = idx(vec![((2, "y"), 1)]);
        let out3 = join.step(&idx(vec![]), &r3);
        assert_eq!(out3.get_weight(&(2, "b", "y")), 1);
    }

    #[test]
    fn inner_join_steps_are_observable_via_inspect() {
        use crate::operator::temporal::Inspect;

        let mut join = Join::<u32, &'static str, &'static str, i64>::new();
        let mut sizes = Vec::new();
        let mut inspect = Inspect::new(|z: &ZSet<(u32, &'static str, &'static str), i64>| {
            sizes.push(z.len())
        });

        let l1 = idx(vec![((1, "a"), 1)]);
        let r1 = idx(vec![((1, "x"), 1)]);
        let out1 = inspect.step(&join.step(&l1, &r1));
        assert_eq!(out1.get_weight(&(1, "a", "x")), 1);

        let l2 = idx(vec![((2, "b"), 1)]);
        let out2 = inspect.step(&join.step(&l2, &idx(vec![])));
        assert!(out2.is_empty());

        assert_eq!(sizes, vec![1, 0]);
    }

    #[test]
    fn anti_join_retracts_on_match() {
        let mut anti = AntiJoin::<u32, &'static str, &'static str, i64>::new();
        let l1 = idx(vec![((1, "a"), 1)]);
        let out1 = anti.step(&l1, &idx(vec![]));
        assert_eq!(out1.get_weight(&(1, "a")), 1);

        let r2 = idx(vec![((1, "x"), 1)]);
        let out2 = anti.step(&idx(vec![]), &r2);
        assert_eq!(out2.get_weight(&(1, "a")), -1);
    }

    #[test]
    fn left_outer_join_none_then_match() {
        let mut lo = LeftOuterJoin::<u32, &'static str, &'static str, i64>::new();
        let l1 = idx(vec![((1, "a"), 1)]);
        let out1 = lo.step(&l1, &idx(vec![]));
        assert_eq!(out1.get_weight(&(1, "a", None)), 1);

        let r2 = idx(vec![((1, "x"), 1)]);
        let out2 = lo.step(&idx(vec![]), &r2);
        assert_eq!(out2.get_weight(&(1, "a", None)), -1);
        assert_eq!(out2.get_weight(&(1, "a", Some("x"))), 1);
    }

    #[test]
    fn left_outer_join_simultaneous_new_match_emits_no_phantom_none() {
        // Left and right both gain a key in the same step: the matched row
        // must not also retract a None row that was never emitted.
        let mut lo = LeftOuterJoin::<u32, &'static str, &'static str, i64>::new();
        let left = idx(vec![((1, "a"), 1), ((2, "b"), 1), ((3, "c"), 1)]);
        let right = idx(vec![((1, "x"), 1), ((2, "y"), 1)]);
        let out = lo.step(&left, &right);
        assert_eq!(out.get_weight(&(1, "a", Some("x"))), 1);
        assert_eq!(out.get_weight(&(2, "b", Some("y"))), 1);
        assert_eq!(out.get_weight(&(3, "c", None)), 1);
        assert_eq!(out.get_weight(&(1, "a", None)), 0);
    }

    #[test]
    fn anti_join_simultaneous_new_match_emits_no_phantom_row() {
        let mut anti = AntiJoin::<u32, &'static str, &'static str, i64>::new();
        let left = idx(vec![((1, "a"), 1), ((2, "b"), 1), ((3, "c"), 1)]);
        let right = idx(vec![((1, "x"), 1)]);
        let out = anti.step(&left, &right);
        assert_eq!(out.get_weight(&(2, "b")), 1);
        assert_eq!(out.get_weight(&(3, "c")), 1);
        assert_eq!(out.get_weight(&(1, "a")), 0);
    }

    #[test]
    fn semi_join_simultaneous_new_match_emits_row_once() {
        let mut semi = SemiJoin::<u32, &'static str, &'static str, i64>::new();
        let left = idx(vec![((1, "a"), 1), ((2, "b"), 1)]);
        let right = idx(vec![((1, "x"), 1)]);
        let out = semi.step(&left, &right);
        assert_eq!(out.get_weight(&(1, "a")), 1);
        assert_eq!(out.get_weight(&(2, "b")), 0);
    }

    #[test]
    fn cross_join_applies_three_term_formula() {
        let mut cj = CrossJoin::<i64, i64, i64>::new();
        let l1 = zset! { 1 => 1, 2 => 1 };
        let r1 = zset! { 10 => 1 };
        let out1 = cj.step(&l1, &r1);
        assert_eq!(out1.get_weight(&(1, 10)), 1);
        assert_eq!(out1.get_weight(&(2, 10)), 1);

        let r2 = zset! { 20 => 1 };
        let out2 = cj.step(&ZSet::empty(), &r2);
        assert_eq!(out2.get_weight(&(1, 20)), 1);
        assert_eq!(out2.get_weight(&(2, 20)), 1);
    }

    #[test]
    fn dispatcher_prefers_hash_overlay_for_small_deltas() {
        let mut d = JoinDispatcher::default();
        assert_eq!(d.dispatch(1, 1), DispatchPath::HashOverlay);
        assert_eq!(d.dispatch(1000, 1000), DispatchPath::Indexed);
    }
}
