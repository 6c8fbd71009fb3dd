//! Stateless linear operators and their fused variants (§4.3).
//!
//! A "fused" operator performs what would otherwise be two passes over the
//! input — a map and a filter, say — in a single pass over a single
//! builder. The externally observable result is identical to running the
//! two operators in sequence; fusion only saves an intermediate
//! allocation and consolidation pass.

use crate::{algebra::ZRingValue, indexed::IndexedZSet, zset::ZSet};
use std::hash::Hash;

/// `filter(map_keys(z, f), p)` in one pass: map every key through `f`,
/// then keep only those satisfying `p`.
pub fn map_filter<K, K2, R, F, P>(z: &ZSet<K, R>, f: F, p: P) -> ZSet<K2, R>
where
    K: Ord + Clone + Hash + Eq,
    K2: Ord + Clone + Hash + Eq,
    R: ZRingValue,
    F: Fn(&K) -> K2,
    P: Fn(&K2) -> bool,
{
    let entries = z
        .consolidated()
        .into_iter()
        .map(|(k, w)| (f(&k), w))
        .filter(|(k2, _)| p(k2))
        .collect();
    ZSet::from_tuples(entries)
}

/// `map_keys(filter(z, p), f)` in one pass: keep keys satisfying `p`,
/// then map the survivors through `f`.
pub fn filter_map<K, K2, R, P, F>(z: &ZSet<K, R>, p: P, f: F) -> ZSet<K2, R>
where
    K: Ord + Clone + Hash + Eq,
    K2: Ord + Clone + Hash + Eq,
    R: ZRingValue,
    P: Fn(&K) -> bool,
    F: Fn(&K) -> K2,
{
    let entries = z
        .consolidated()
        .into_iter()
        .filter(|(k, _)| p(k))
        .map(|(k, w)| (f(&k), w))
        .collect();
    ZSet::from_tuples(entries)
}

/// `group_by(key_fn, map_keys(z, f))` in one pass: map every key through
/// `f`, then route the result into an indexed Z-set keyed by `key_fn`.
pub fn map_group_by<K, K2, GK, GV, R, F, G>(z: &ZSet<K, R>, f: F, key_fn: G) -> IndexedZSet<GK, GV, R>
where
    K: Ord + Clone + Hash + Eq,
    K2: Ord + Clone + Hash + Eq,
    GK: Ord + Clone + Hash + Eq,
    GV: Ord + Clone + Hash + Eq,
    R: ZRingValue,
    F: Fn(&K) -> K2,
    G: Fn(&K2) -> (GK, GV),
{
    let mapped = z.map_keys(f);
    IndexedZSet::group_by(key_fn, &mapped)
}

/// `aggregate(group_by(key_fn, filter(z, p)))` in one pass: keep keys
/// satisfying `p`, route survivors into groups, and fold each group with
/// `agg`.
pub fn filter_group_by_aggregate<K, GK, GV, Acc, R, P, G, Seed, Step>(
    z: &ZSet<K, R>,
    p: P,
    key_fn: G,
    seed: Seed,
    step: Step,
) -> ZSet<(GK, Acc), R>
where
    K: Ord + Clone + Hash + Eq,
    GK: Ord + Clone + Hash + Eq,
    GV: Ord + Clone + Hash + Eq,
    Acc: Ord + Clone + Hash + Eq,
    R: ZRingValue,
    P: Fn(&K) -> bool,
    G: Fn(&K) -> (GK, GV),
    Seed: Fn() -> Acc,
    Step: Fn(&Acc, &GV, R) -> Acc,
{
    use hashbrown::HashMap;
    let mut groups: HashMap<GK, Vec<(GV, R)>> = HashMap::new();
    for (k, w) in z.consolidated() {
        if !p(&k) {
            continue;
        }
        let (gk, gv) = key_fn(&k);
        groups.entry(gk).or_default().push((gv, w));
    }
    let entries = groups
        .into_iter()
        .map(|(gk, vs)| {
            let mut acc = seed();
            for (v, w) in vs {
                acc = step(&acc, &v, w);
            }
            ((gk, acc), R::one())
        })
        .collect();
    ZSet::from_tuples(entries)
}

/// `map_keys(join_core(left, right, combine), f)` in one pass: join,
/// then transform every output pair through `f`.
pub fn join_map<K, V1, V2, VO, VO2, R, Combine, F>(
    left: &IndexedZSet<K, V1, R>,
    right: &IndexedZSet<K, V2, R>,
    combine: Combine,
    f: F,
) -> ZSet<VO2, R>
where
    K: Ord + Clone + Hash + Eq,
    V1: Ord + Clone + Hash + Eq,
    V2: Ord + Clone + Hash + Eq,
    VO: Ord + Clone + Hash + Eq,
    VO2: Ord + Clone + Hash + Eq,
    R: ZRingValue,
    Combine: Fn(&K, &V1, &V2) -> VO,
    F: Fn(&VO) -> VO2,
{
    let joined = left.join_core(right, combine);
    joined.to_zset().map_keys(|(_k, vo)| f(vo))
}

/// `join_core(left, right, combine)` with the join key projected away,
/// i.e. `join_map` specialized to dropping the key from the output.
pub fn join_project<K, V1, V2, VO, R, Combine>(
    left: &IndexedZSet<K, V1, R>,
    right: &IndexedZSet<K, V2, R>,
    combine: Combine,
) -> ZSet<VO, R>
where
    K: Ord + Clone + Hash + Eq,
    V1: Ord + Clone + Hash + Eq,
    V2: Ord + Clone + Hash + Eq,
    VO: Ord + Clone + Hash + Eq,
    R: ZRingValue,
    Combine: Fn(&K, &V1, &V2) -> VO,
{
    let joined = left.join_core(right, combine);
    joined.to_zset().map_keys(|(_k, vo)| vo.clone())
}
