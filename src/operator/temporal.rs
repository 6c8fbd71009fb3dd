//! Temporal operators (§4.6): operators whose output depends on state
//! carried across steps rather than purely on the current input.

use crate::{algebra::ZRingValue, zset::ZSet};
use std::hash::Hash;

/// One-step delay (`z^{-1}`). The first step emits the algebra's zero
/// value; thereafter it emits the previous step's input.
pub struct Delay<K, R> {
    previous: ZSet<K, R>,
}

impl<K, R> Default for Delay<K, R>
where
    K: Ord + Clone + Hash + Eq,
    R: ZRingValue,
{
    fn default() -> Self {
        Self {
            previous: ZSet::empty(),
        }
    }
}

impl<K, R> Delay<K, R>
where
    K: Ord + Clone + Hash + Eq,
    R: ZRingValue,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&mut self, input: &ZSet<K, R>) -> ZSet<K, R> {
        std::mem::replace(&mut self.previous, input.clone())
    }
}

/// Maintains a running sum: `acc <- acc (+) input`, outputs `acc`.
pub struct Integrate<K, R> {
    acc: ZSet<K, R>,
}

impl<K, R> Default for Integrate<K, R>
where
    K: Ord + Clone + Hash + Eq,
    R: ZRingValue,
{
    fn default() -> Self {
        Self { acc: ZSet::empty() }
    }
}

impl<K, R> Integrate<K, R>
where
    K: Ord + Clone + Hash + Eq,
    R: ZRingValue,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&mut self, input: &ZSet<K, R>) -> ZSet<K, R> {
        self.acc = self.acc.add(input);
        self.acc.clone()
    }
}

/// Outputs `input (-) previous`; the first step outputs `input` unchanged
/// (previous defaults to the zero value).
pub struct Differentiate<K, R> {
    previous: ZSet<K, R>,
}

impl<K, R> Default for Differentiate<K, R>
where
    K: Ord + Clone + Hash + Eq,
    R: ZRingValue,
{
    fn default() -> Self {
        Self {
            previous: ZSet::empty(),
        }
    }
}

impl<K, R> Differentiate<K, R>
where
    K: Ord + Clone + Hash + Eq,
    R: ZRingValue,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&mut self, input: &ZSet<K, R>) -> ZSet<K, R> {
        let delta = input.difference(&self.previous);
        self.previous = input.clone();
        delta
    }
}

/// Deterministic generator: `step -> Seq<K>`, producing a Z-set with
/// weight `+1` per yielded item each call.
pub struct Generator<K, R, F> {
    f: F,
    step_count: u64,
    _marker: std::marker::PhantomData<(K, R)>,
}

impl<K, R, F, I> Generator<K, R, F>
where
    K: Ord + Clone + Hash + Eq,
    R: ZRingValue + From<i8>,
    F: FnMut(u64) -> I,
    I: IntoIterator<Item = K>,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            step_count: 0,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn step(&mut self) -> ZSet<K, R> {
        let items = (self.f)(self.step_count);
        self.step_count += 1;
        let entries = items.into_iter().map(|k| (k, R::from(1))).collect();
        ZSet::from_tuples(entries)
    }
}

/// Identity on data with a side-effecting observer, used for tracing and
/// tests. Never modifies the Z-set it passes through.
pub struct Inspect<F> {
    observer: F,
}

impl<F> Inspect<F> {
    pub fn new(observer: F) -> Self {
        Self { observer }
    }
}

impl<K, R, F> Inspect<F>
where
    K: Ord + Clone + Hash + Eq,
    R: ZRingValue,
    F: FnMut(&ZSet<K, R>),
{
    pub fn step(&mut self, input: &ZSet<K, R>) -> ZSet<K, R> {
        (self.observer)(input);
        input.clone()
    }
}

/// Monotonic `i64` counter, incrementing by one per step.
#[derive(Default)]
pub struct Clock {
    current: i64,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&mut self) -> i64 {
        let v = self.current;
        self.current += 1;
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_emits_zero_then_previous() {
        let mut d = Delay::<i64, i64>::new();
        let a = ZSet::from_tuples(vec![(1, 1)]);
        let b = ZSet::from_tuples(vec![(2, 1)]);
        assert!(d.step(&a).is_empty());
        assert_eq!(d.step(&b), a);
    }

    #[test]
    fn integrate_accumulates() {
        let mut i = Integrate::<i64, i64>::new();
        let a = ZSet::from_tuples(vec![(1, 1)]);
        let b = ZSet::from_tuples(vec![(1, 1), (2, 1)]);
        assert_eq!(i.step(&a), a.clone());
        assert_eq!(i.step(&b).get_weight(&1), 2);
    }

    #[test]
    fn differentiate_is_inverse_of_integrate() {
        let mut integ = Integrate::<i64, i64>::new();
        let mut diff = Differentiate::<i64, i64>::new();
        let a = ZSet::from_tuples(vec![(1, 1)]);
        let b = ZSet::from_tuples(vec![(1, -1), (2, 1)]);
        let s1 = integ.step(&a);
        let s2 = integ.step(&b);
        assert_eq!(diff.step(&s1), a);
        assert_eq!(diff.step(&s2), b);
    }

    #[test]
    fn clock_is_monotonic() {
        let mut c = Clock::new();
        assert_eq!(c.step(), 0);
        assert_eq!(c.step(), 1);
        assert_eq!(c.step(), 2);
    }

    #[test]
    fn inspect_is_identity_and_observes() {
        let mut seen = Vec::new();
        let mut inspect = Inspect::new(|z: &ZSet<i64, i64>| seen.push(z.len()));
        let a = ZSet::from_tuples(vec![(1, 1), (2, 1)]);
        assert_eq!(inspect.step(&a), a);
        assert_eq!(seen, vec![2]);
    }
}
