//! Fixed-point iteration (§4.6 "Fixed-point"): iterates `f: Z -> Z` until
//! `f(x) = x` or `max_iter` is reached, with optional tolerance-based
//! convergence for cases where exact equality never stabilizes.

use crate::{algebra::ZRingValue, zset::ZSet};
use std::hash::Hash;

/// Outcome of a fixed-point computation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// `f(x) = x` (or within tolerance) was reached after this many
    /// iterations.
    Converged { iterations: u64 },
    /// `max_iter` was reached without convergence; the caller decides
    /// whether to treat this as success, retry, or error.
    MaxIterReached { iterations: u64 },
}

/// Convergence tolerance, checked against consolidated snapshots of
/// successive iterations rather than requiring bit-for-bit equality.
#[derive(Clone, Copy, Debug, Default)]
pub struct Tolerance {
    /// Converged if the number of entries changes by at most this much.
    pub size_delta: Option<usize>,
    /// Converged if the sum of absolute weights changes by at most this
    /// much (compared via `R`'s ordering after negation, so callers
    /// supply a non-negative bound in `R`).
    pub weight_sum_delta: Option<i64>,
}

/// Runs `f` starting from `seed`, stopping at exact equality (or within
/// `tolerance`, if given) of successive consolidated views, or after
/// `max_iter` iterations.
pub fn fixed_point<K, R, F>(
    seed: ZSet<K, R>,
    max_iter: u64,
    tolerance: Tolerance,
    mut f: F,
) -> (ZSet<K, R>, Termination)
where
    K: Ord + Clone + Hash + Eq,
    R: ZRingValue + Into<i64>,
    F: FnMut(&ZSet<K, R>) -> ZSet<K, R>,
{
    let mut current = seed;
    let mut iterations = 0u64;

    loop {
        let next = f(&current);
        iterations += 1;

        if converged(&current, &next, &tolerance) {
            return (
                next,
                Termination::Converged {
                    iterations,
                },
            );
        }

        current = next;
        if iterations >= max_iter {
            return (current, Termination::MaxIterReached { iterations });
        }
    }
}

fn converged<K, R>(prev: &ZSet<K, R>, next: &ZSet<K, R>, tolerance: &Tolerance) -> bool
where
    K: Ord + Clone + Hash + Eq,
    R: ZRingValue + Into<i64>,
{
    if prev == next {
        return true;
    }

    if let Some(bound) = tolerance.size_delta {
        let delta = prev.len().abs_diff(next.len());
        if delta <= bound {
            return true;
        }
    }

    if let Some(bound) = tolerance.weight_sum_delta {
        let prev_sum: i64 = prev.count().into();
        let next_sum: i64 = next.count().into();
        if (prev_sum - next_sum).abs() <= bound {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Transitive closure of a small graph edge set via repeated
    /// join-then-union, grounded on the classic DBSP reachability example.
    #[test]
    fn fixed_point_computes_transitive_closure() {
        let edges: ZSet<(i64, i64), i64> =
            ZSet::from_tuples(vec![((1, 2), 1), ((2, 3), 1), ((3, 4), 1)]);

        let (closure, term) = fixed_point(edges.clone(), 100, Tolerance::default(), |reach| {
            let mut extended = Vec::new();
            for (a, b) in reach.consolidated() {
                for (c, d) in edges.consolidated() {
                    if b == c {
                        extended.push(((a, d), 1i64));
                    }
                }
            }
            reach.union(&ZSet::from_tuples(extended)).distinct()
        });

        assert!(matches!(term, Termination::Converged { .. }));
        assert_eq!(closure.get_weight(&(1, 4)), 1);
        assert_eq!(closure.get_weight(&(1, 2)), 1);
        assert_eq!(closure.get_weight(&(4, 1)), 0);
    }

    #[test]
    fn fixed_point_growth_is_observable_via_inspect() {
        use crate::operator::temporal::Inspect;

        let edges: ZSet<(i64, i64), i64> =
            ZSet::from_tuples(vec![((1, 2), 1), ((2, 3), 1), ((3, 4), 1)]);

        let mut sizes = Vec::new();
        let mut inspect = Inspect::new(|z: &ZSet<(i64, i64), i64>| sizes.push(z.len()));

        let (closure, term) = fixed_point(edges.clone(), 100, Tolerance::default(), |reach| {
            let mut extended = Vec::new();
            for (a, b) in reach.consolidated() {
                for (c, d) in edges.consolidated() {
                    if b == c {
                        extended.push(((a, d), 1i64));
                    }
                }
            }
            inspect.step(&reach.union(&ZSet::from_tuples(extended)).distinct())
        });

        assert!(matches!(term, Termination::Converged { .. }));
        assert_eq!(closure.get_weight(&(1, 4)), 1);
        // Each iteration's size is non-decreasing up to convergence.
        assert!(sizes.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn fixed_point_stops_at_max_iter_without_convergence() {
        let mut n = 0i64;
        let (_result, term) = fixed_point(
            ZSet::from_tuples(vec![(0i64, 1i64)]),
            5,
            Tolerance::default(),
            move |_| {
                n += 1;
                ZSet::from_tuples(vec![(n, 1)])
            },
        );
        assert_eq!(term, Termination::MaxIterReached { iterations: 5 });
    }
}
