//! Common logic for consolidating vectors of `(key, weight)` pairs.
//!
//! Often we find ourselves with a collection of records with associated
//! weights (here, integers) where we want to reduce the collection to the
//! point that each record occurs at most once, with the accumulated
//! weight. These methods supply that functionality.

use crate::algebra::{AddAssignByRef, HasZero};
use std::ptr;

/// Sorts and consolidates `vec`.
///
/// Sorts `vec` and then consolidates runs of entries with identical first
/// elements by accumulating the second elements. An accumulation that
/// lands on zero is discarded.
pub fn consolidate<T, R>(vec: &mut Vec<(T, R)>)
where
    T: Ord,
    R: AddAssignByRef + HasZero,
{
    consolidate_from(vec, 0);
}

/// Sorts and consolidates `vec[offset..]`.
pub fn consolidate_from<T, R>(vec: &mut Vec<(T, R)>, offset: usize)
where
    T: Ord,
    R: AddAssignByRef + HasZero,
{
    let length = consolidate_slice(&mut vec[offset..]);
    vec.truncate(offset + length);
}

/// Sorts and consolidates a slice, returning the valid prefix length.
pub fn consolidate_slice<T, R>(slice: &mut [(T, R)]) -> usize
where
    T: Ord,
    R: AddAssignByRef + HasZero,
{
    slice.sort_by(|(key1, _), (key2, _)| key1.cmp(key2));

    let slice_ptr = slice.as_mut_ptr();

    // `offset` indexes the write location and is always `<= index`.
    let mut offset = 0;
    for index in 1..slice.len() {
        // SAFETY: `offset < index <= slice.len()` throughout the loop, so
        // both pointers stay in bounds.
        unsafe {
            debug_assert!(offset < index);

            let ptr1 = slice_ptr.add(offset);
            let ptr2 = slice_ptr.add(index);

            if (*ptr1).0 == (*ptr2).0 {
                (*ptr1).1.add_assign_by_ref(&(*ptr2).1);
            } else {
                if !(*ptr1).1.is_zero() {
                    offset += 1;
                }

                let ptr1 = slice_ptr.add(offset);
                ptr::swap(ptr1, ptr2);
            }
        }
    }

    if offset < slice.len() && !slice[offset].1.is_zero() {
        offset += 1;
    }

    offset
}

/// Merges two sorted, consolidated `(key, weight)` slices into a sorted,
/// consolidated vector, dropping zero-weight results.
pub fn merge_sorted<T, R>(a: &[(T, R)], b: &[(T, R)]) -> Vec<(T, R)>
where
    T: Ord + Clone,
    R: AddAssignByRef + HasZero + Clone,
{
    let mut result = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => {
                result.push(a[i].clone());
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                result.push(b[j].clone());
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                let mut weight = a[i].1.clone();
                weight.add_assign_by_ref(&b[j].1);
                if !weight.is_zero() {
                    result.push((a[i].0.clone(), weight));
                }
                i += 1;
                j += 1;
            }
        }
    }
    result.extend_from_slice(&a[i..]);
    result.extend_from_slice(&b[j..]);
    result
}
