//! Lockstep walks over two sorted sequences.
//!
//! Method matching, metadata synchronization and link-time symbol
//! resolution all reduce to one of these linear merges.

use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merged<A, B> {
    Left(A),
    Right(B),
    Both(A, B),
}

/// Reports every element of two sequences sorted under `cmp` exactly once,
/// pairing up elements that compare equal.
pub fn merge_join<A, B>(
    left: impl IntoIterator<Item = A>,
    right: impl IntoIterator<Item = B>,
    mut cmp: impl FnMut(&A, &B) -> Ordering,
    mut f: impl FnMut(Merged<A, B>),
) {
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        let order = match (left.peek(), right.peek()) {
            (Some(a), Some(b)) => cmp(a, b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => return,
        };
        match order {
            Ordering::Less => {
                if let Some(a) = left.next() {
                    f(Merged::Left(a));
                }
            }
            Ordering::Greater => {
                if let Some(b) = right.next() {
                    f(Merged::Right(b));
                }
            }
            Ordering::Equal => {
                if let (Some(a), Some(b)) = (left.next(), right.next()) {
                    f(Merged::Both(a, b));
                }
            }
        }
    }
}

pub fn for_each_intersection<A, B>(
    left: impl IntoIterator<Item = A>,
    right: impl IntoIterator<Item = B>,
    cmp: impl FnMut(&A, &B) -> Ordering,
    mut f: impl FnMut(A, B),
) {
    merge_join(left, right, cmp, |m| {
        if let Merged::Both(a, b) = m {
            f(a, b);
        }
    });
}

pub fn for_each_symmetric_difference<A, B>(
    left: impl IntoIterator<Item = A>,
    right: impl IntoIterator<Item = B>,
    cmp: impl FnMut(&A, &B) -> Ordering,
    mut only_left: impl FnMut(A),
    mut only_right: impl FnMut(B),
) {
    merge_join(left, right, cmp, |m| match m {
        Merged::Left(a) => only_left(a),
        Merged::Right(b) => only_right(b),
        Merged::Both(..) => {}
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersection_pairs_equal_keys() {
        let mut pairs = Vec::new();
        for_each_intersection([1, 3, 5, 7], ["3", "4", "7"], |a, b| a.cmp(&b.parse::<i32>().unwrap()), |a, b| {
            pairs.push((a, b))
        });
        assert_eq!(pairs, vec![(3, "3"), (7, "7")]);
    }

    #[test]
    fn symmetric_difference_reports_each_side() {
        let (mut left, mut right) = (Vec::new(), Vec::new());
        for_each_symmetric_difference(
            [1, 2, 4],
            [2, 3, 4, 5],
            |a: &i32, b: &i32| a.cmp(b),
            |a| left.push(a),
            |b| right.push(b),
        );
        assert_eq!(left, vec![1]);
        assert_eq!(right, vec![3, 5]);
    }

    #[test]
    fn empty_sides_are_fine() {
        let mut seen = Vec::new();
        merge_join(Vec::<i32>::new(), [1, 2], |a, b| a.cmp(b), |m| seen.push(m));
        assert_eq!(seen, vec![Merged::Right(1), Merged::Right(2)]);
    }
}
