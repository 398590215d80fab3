// SPDX-License-Identifier: MPL-2.0

//! Version constraints as unions of disjoint intervals.
//!
//! A [Constraint] is an ordered list of contiguous intervals (segments) with
//! inclusive, exclusive or open-ended bounds over the dewey version order,
//! similar to a `Vec<(Bound<Version>, Bound<Version>)>`. It can represent
//! selectors such as `(>=1, <2) OR (=3) OR (>4)`. The empty union allows no
//! version at all and a single `(Unbounded, Unbounded)` segment allows any.
//!
//! Empty results from [intersection](Constraint::intersection) and
//! [difference](Constraint::difference) mean "no common version"; the solver
//! uses them directly to detect that a pair of terms cannot be satisfied
//! together.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Bound::{self, Excluded, Included, Unbounded};

use smallvec::{smallvec, SmallVec};

use crate::version::Version;

type Interval = (Bound<Version>, Bound<Version>);

/// A set of versions, kept as sorted disjoint intervals.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Constraint {
    segments: SmallVec<[Interval; 1]>,
}

impl Constraint {
    /// No version at all.
    pub fn empty() -> Self {
        Self {
            segments: SmallVec::new(),
        }
    }

    /// Every possible version.
    pub fn any() -> Self {
        Self {
            segments: smallvec![(Unbounded, Unbounded)],
        }
    }

    /// Exactly one version.
    pub fn exactly(v: impl Into<Version>) -> Self {
        let v = v.into();
        Self {
            segments: smallvec![(Included(v.clone()), Included(v))],
        }
    }

    /// All versions greater or equal to `v`.
    pub fn higher_than(v: impl Into<Version>) -> Self {
        Self {
            segments: smallvec![(Included(v.into()), Unbounded)],
        }
    }

    /// All versions strictly greater than `v`.
    pub fn strictly_higher_than(v: impl Into<Version>) -> Self {
        Self {
            segments: smallvec![(Excluded(v.into()), Unbounded)],
        }
    }

    /// All versions lower or equal to `v`.
    pub fn lower_than(v: impl Into<Version>) -> Self {
        Self {
            segments: smallvec![(Unbounded, Included(v.into()))],
        }
    }

    /// All versions strictly lower than `v`.
    pub fn strictly_lower_than(v: impl Into<Version>) -> Self {
        Self {
            segments: smallvec![(Unbounded, Excluded(v.into()))],
        }
    }

    /// Versions greater or equal to `v1` but strictly lower than `v2`.
    pub fn between(v1: impl Into<Version>, v2: impl Into<Version>) -> Self {
        let (start, end) = (Included(v1.into()), Excluded(v2.into()));
        if valid_segment(&start, &end) {
            Self {
                segments: smallvec![(start, end)],
            }
        } else {
            Self::empty()
        }
    }

    /// A single interval with explicit bounds; empty when the bounds admit
    /// no version.
    pub fn interval(start: Bound<Version>, end: Bound<Version>) -> Self {
        if valid_segment(&start, &end) {
            Self {
                segments: smallvec![(start, end)],
            }
        } else {
            Self::empty()
        }
    }

    /// The union of singletons over an explicit version list.
    pub fn enumerated(versions: impl IntoIterator<Item = Version>) -> Self {
        versions
            .into_iter()
            .fold(Self::empty(), |acc, v| acc.union(&Self::exactly(v)))
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_any(&self) -> bool {
        matches!(self.segments.as_slice(), [(Unbounded, Unbounded)])
    }

    /// If the set contains exactly one version, return it.
    pub fn as_singleton(&self) -> Option<&Version> {
        match self.segments.as_slice() {
            [(Included(v1), Included(v2))] if v1 == v2 => Some(v1),
            _ => None,
        }
    }

    /// Point membership.
    pub fn contains(&self, version: &Version) -> bool {
        self.segments
            .binary_search_by(|segment| within_bounds(version, segment).reverse())
            .is_ok()
    }

    /// Everything not contained in `self`.
    pub fn complement(&self) -> Self {
        match self.segments.first() {
            None => Self::any(),
            Some((Unbounded, Unbounded)) => Self::empty(),
            Some((Included(v), Unbounded)) => Self::strictly_lower_than(v.clone()),
            Some((Excluded(v), Unbounded)) => Self::lower_than(v.clone()),
            Some((Unbounded, Included(v))) => {
                Self::negate_segments(Excluded(v.clone()), &self.segments[1..])
            }
            Some((Unbounded, Excluded(v))) => {
                Self::negate_segments(Included(v.clone()), &self.segments[1..])
            }
            Some(_) => Self::negate_segments(Unbounded, &self.segments),
        }
    }

    fn negate_segments(start: Bound<Version>, segments: &[Interval]) -> Self {
        let mut complement = SmallVec::new();
        let mut start = start;
        for (v1, v2) in segments {
            complement.push((
                start,
                match v1 {
                    Included(v) => Excluded(v.clone()),
                    Excluded(v) => Included(v.clone()),
                    Unbounded => unreachable!(),
                },
            ));
            start = match v2 {
                Included(v) => Excluded(v.clone()),
                Excluded(v) => Included(v.clone()),
                Unbounded => Unbounded,
            };
        }
        if !matches!(start, Unbounded) {
            complement.push((start, Unbounded));
        }
        Self {
            segments: complement,
        }
    }

    /// Union of both sets, merging touching segments.
    pub fn union(&self, other: &Self) -> Self {
        let mut output: SmallVec<[Interval; 1]> = SmallVec::new();
        let mut accumulator: Option<(&Bound<_>, &Bound<_>)> = None;
        let mut left_iter = self.segments.iter().peekable();
        let mut right_iter = other.segments.iter().peekable();
        loop {
            let smaller = match (left_iter.peek(), right_iter.peek()) {
                (Some((left_start, left_end)), Some((right_start, right_end))) => {
                    if start_is_smaller(left_start.as_ref(), right_start.as_ref()) {
                        left_iter.next();
                        (left_start, left_end)
                    } else {
                        right_iter.next();
                        (right_start, right_end)
                    }
                }
                (Some((left_start, left_end)), None) => {
                    left_iter.next();
                    (left_start, left_end)
                }
                (None, Some((right_start, right_end))) => {
                    right_iter.next();
                    (right_start, right_end)
                }
                (None, None) => break,
            };

            if let Some(accum) = accumulator {
                if end_before_start_with_gap(accum.1, smaller.0) {
                    output.push((accum.0.clone(), accum.1.clone()));
                    accumulator = Some(smaller);
                } else {
                    let end = match (accum.1, smaller.1) {
                        (_, Unbounded) | (Unbounded, _) => &Unbounded,
                        (Included(l), Excluded(r) | Included(r)) if l == r => accum.1,
                        (Included(l) | Excluded(l), Included(r) | Excluded(r)) => {
                            if l > r {
                                accum.1
                            } else {
                                smaller.1
                            }
                        }
                    };
                    accumulator = Some((accum.0, end));
                }
            } else {
                accumulator = Some(smaller);
            }
        }
        if let Some(accum) = accumulator {
            output.push((accum.0.clone(), accum.1.clone()));
        }
        Self { segments: output }
    }

    /// Versions contained in both sets.
    pub fn intersection(&self, other: &Self) -> Self {
        let mut output: SmallVec<[Interval; 1]> = SmallVec::new();
        let mut left_iter = self.segments.iter().peekable();
        let mut right_iter = other.segments.iter().peekable();
        // Candidate segments are generated with an increasing end bound, so
        // the output needs no sorting pass.
        while let Some(((left_start, left_end), (right_start, right_end))) =
            left_iter.peek().zip(right_iter.peek())
        {
            let (other_start, end) = if end_is_smaller(left_end.as_ref(), right_end.as_ref()) {
                left_iter.next();
                (right_start, left_end)
            } else {
                right_iter.next();
                (left_start, right_end)
            };
            if !valid_segment(other_start, end) {
                continue;
            }
            let start = match (left_start, right_start) {
                (Included(l), Included(r)) => Included(std::cmp::max(l, r)),
                (Excluded(l), Excluded(r)) => Excluded(std::cmp::max(l, r)),
                (Included(i), Excluded(e)) | (Excluded(e), Included(i)) => {
                    if i <= e {
                        Excluded(e)
                    } else {
                        Included(i)
                    }
                }
                (s, Unbounded) | (Unbounded, s) => s.as_ref(),
            };
            output.push((start.cloned(), end.clone()));
        }
        Self { segments: output }
    }

    /// Versions contained in `self` but not in `other`.
    pub fn difference(&self, other: &Self) -> Self {
        self.intersection(&other.complement())
    }

    /// True when no version can be contained in both sets.
    pub fn is_disjoint(&self, other: &Self) -> bool {
        let mut left_iter = self.segments.iter().peekable();
        let mut right_iter = other.segments.iter().peekable();
        while let Some((left, right)) = left_iter.peek().zip(right_iter.peek()) {
            if !valid_segment(&right.0, &left.1) {
                left_iter.next();
            } else if !valid_segment(&left.0, &right.1) {
                right_iter.next();
            } else {
                return false;
            }
        }
        true
    }

    /// True when every version contained in `self` is contained in `other`.
    pub fn subset_of(&self, other: &Self) -> bool {
        let mut containing_iter = other.segments.iter();
        let mut subset_iter = self.segments.iter();
        let Some(mut containing) = containing_iter.next() else {
            return subset_iter.next().is_none();
        };
        for subset in subset_iter {
            while !valid_segment(&subset.0, &containing.1) {
                match containing_iter.next() {
                    Some(c) => containing = c,
                    None => return false,
                }
            }
            if !start_is_smaller(containing.0.as_ref(), subset.0.as_ref()) {
                return false;
            }
            if !end_is_smaller(subset.1.as_ref(), containing.1.as_ref()) {
                return false;
            }
        }
        true
    }

    /// Iterate over the segments of the set.
    pub fn iter(&self) -> impl Iterator<Item = (&Bound<Version>, &Bound<Version>)> {
        self.segments.iter().map(|(start, end)| (start, end))
    }
}

/// The ordering of the version wrt the segment.
/// ```text
///      |-------|
///   ^      ^      ^
///   less   equal  greater
/// ```
fn within_bounds(version: &Version, segment: &Interval) -> Ordering {
    let below_lower = match segment {
        (Excluded(start), _) => version <= start,
        (Included(start), _) => version < start,
        (Unbounded, _) => false,
    };
    if below_lower {
        return Ordering::Less;
    }
    let below_upper = match segment {
        (_, Unbounded) => true,
        (_, Included(end)) => version <= end,
        (_, Excluded(end)) => version < end,
    };
    if below_upper {
        Ordering::Equal
    } else {
        Ordering::Greater
    }
}

/// A valid segment is one where at least one version fits between start and end.
fn valid_segment(start: &Bound<Version>, end: &Bound<Version>) -> bool {
    match (start, end) {
        (Included(s), Included(e)) => s <= e,
        (Included(s), Excluded(e)) => s < e,
        (Excluded(s), Included(e)) => s < e,
        (Excluded(s), Excluded(e)) => s < e,
        (Unbounded, _) | (_, Unbounded) => true,
    }
}

/// The end of one interval lies before the start of the next one, with room
/// for a version in between, so the two cannot be merged in a union.
fn end_before_start_with_gap(end: &Bound<Version>, start: &Bound<Version>) -> bool {
    match (end, start) {
        (_, Unbounded) => false,
        (Unbounded, _) => false,
        (Included(l), Included(r)) => l < r,
        (Included(l), Excluded(r)) => l < r,
        (Excluded(l), Included(r)) => l < r,
        (Excluded(l), Excluded(r)) => l <= r,
    }
}

fn start_is_smaller(left: Bound<&Version>, right: Bound<&Version>) -> bool {
    match (left, right) {
        (Unbounded, _) => true,
        (_, Unbounded) => false,
        (Included(l), Included(r)) => l <= r,
        (Excluded(l), Excluded(r)) => l <= r,
        (Included(l), Excluded(r)) => l <= r,
        (Excluded(l), Included(r)) => l < r,
    }
}

fn end_is_smaller(left: Bound<&Version>, right: Bound<&Version>) -> bool {
    match (left, right) {
        (_, Unbounded) => true,
        (Unbounded, _) => false,
        (Included(l), Included(r)) => l <= r,
        (Excluded(l), Excluded(r)) => l <= r,
        (Excluded(l), Included(r)) => l <= r,
        (Included(l), Excluded(r)) => l < r,
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "none");
        }
        for (idx, segment) in self.segments.iter().enumerate() {
            if idx > 0 {
                write!(f, " | ")?;
            }
            match segment {
                (Unbounded, Unbounded) => write!(f, "*")?,
                (Unbounded, Included(v)) => write!(f, "<={v}")?,
                (Unbounded, Excluded(v)) => write!(f, "<{v}")?,
                (Included(v), Unbounded) => write!(f, ">={v}")?,
                (Excluded(v), Unbounded) => write!(f, ">{v}")?,
                (Included(a), Included(b)) if a == b => write!(f, "{a}")?,
                (Included(a), Included(b)) => write!(f, ">={a}<={b}")?,
                (Included(a), Excluded(b)) => write!(f, ">={a}<{b}")?,
                (Excluded(a), Included(b)) => write!(f, ">{a}<={b}")?,
                (Excluded(a), Excluded(b)) => write!(f, ">{a}<{b}")?,
            }
        }
        Ok(())
    }
}

/// Generate constraints from random unions of half-lines and singletons,
/// for property tests of downstream code.
#[cfg(any(feature = "proptest", test))]
pub fn proptest_strategy() -> impl proptest::strategy::Strategy<Value = Constraint> {
    use proptest::prelude::*;
    let version = (0u32..40, 0u32..4)
        .prop_map(|(n, rev)| Version::new(format!("{}.{}_{}", n / 10, n % 10, rev)));
    proptest::collection::vec((version, any::<bool>(), any::<bool>()), 0..6).prop_map(|parts| {
        parts
            .into_iter()
            .fold(Constraint::empty(), |acc, (v, open, inclusive)| {
                let seg = match (open, inclusive) {
                    (true, true) => Constraint::higher_than(v),
                    (true, false) => Constraint::strictly_higher_than(v),
                    (false, true) => Constraint::lower_than(v),
                    (false, false) => Constraint::exactly(v),
                };
                acc.union(&seg)
            })
    })
}
