//! Half-open intervals over a single day and normalized sets of them.

use std::fmt;

use serde::Serialize;

use crate::error::EvaluationError;
use crate::time::TimeOfDay;

/// Half-open range `[lower, upper)` over [`TimeOfDay`].
///
/// An interval is never empty: `lower < upper` is enforced at construction,
/// so a degenerate range cannot be inserted anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Interval {
    lower: TimeOfDay,
    upper: TimeOfDay,
}

impl Interval {
    /// The whole day, `[START_OF_DAY, END_OF_DAY)`.
    pub const FULL_DAY: Self = Self {
        lower: TimeOfDay::START_OF_DAY,
        upper: TimeOfDay::END_OF_DAY,
    };

    /// Build `[lower, upper)`. Returns `None` when `lower >= upper`.
    #[must_use]
    pub fn new(lower: TimeOfDay, upper: TimeOfDay) -> Option<Self> {
        (lower < upper).then_some(Self { lower, upper })
    }

    /// Turn a `start`/`end` pair into the intervals it covers.
    ///
    /// - `start < end` gives one interval.
    /// - `start == end` gives nothing (no effect).
    /// - `start > end` wraps past midnight: with `allow_wrap` it is split into
    ///   `[start, END_OF_DAY)` and `[START_OF_DAY, end)`, otherwise it fails.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluationError::WrapNotAllowed`] when the range wraps and
    /// wrapping is not permitted.
    pub fn split_day(
        start: TimeOfDay,
        end: TimeOfDay,
        allow_wrap: bool,
    ) -> Result<Vec<Self>, EvaluationError> {
        if start <= end {
            return Ok(Self::new(start, end).into_iter().collect());
        }
        if !allow_wrap {
            return Err(EvaluationError::WrapNotAllowed { start, end });
        }
        Ok([
            Self::new(start, TimeOfDay::END_OF_DAY),
            Self::new(TimeOfDay::START_OF_DAY, end),
        ]
        .into_iter()
        .flatten()
        .collect())
    }

    #[must_use]
    pub fn lower(&self) -> TimeOfDay {
        self.lower
    }

    #[must_use]
    pub fn upper(&self) -> TimeOfDay {
        self.upper
    }

    /// Whether `t` lies in `[lower, upper)`.
    #[must_use]
    pub fn contains(&self, t: TimeOfDay) -> bool {
        self.lower <= t && t < self.upper
    }

    /// Whether the two intervals share at least one instant.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.lower < other.upper && other.lower < self.upper
    }

    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        Self::new(self.lower.max(other.lower), self.upper.min(other.upper))
    }

    /// `self − other`, zero, one or two pieces.
    #[must_use]
    pub fn difference(&self, other: &Self) -> IntervalSet {
        if !self.overlaps(other) {
            return IntervalSet::from(*self);
        }
        let mut out = IntervalSet::new();
        if let Some(left) = Self::new(self.lower, other.lower) {
            out.insert(left);
        }
        if let Some(right) = Self::new(other.upper, self.upper) {
            out.insert(right);
        }
        out
    }

    /// `self ∪ other`, merged when they touch or overlap.
    #[must_use]
    pub fn union(&self, other: &Self) -> IntervalSet {
        let mut out = IntervalSet::from(*self);
        out.insert(*other);
        out
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.lower, self.upper)
    }
}

/// A union of disjoint intervals, kept sorted and merged.
///
/// Adjacent intervals (`[a, b)` and `[b, c)`) are coalesced, so two sets
/// covering the same instants always compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntervalSet {
    intervals: Vec<Interval>,
}

impl IntervalSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// The disjoint pieces, in ascending order.
    #[must_use]
    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.intervals.iter()
    }

    /// Union a single interval into the set.
    pub fn insert(&mut self, interval: Interval) {
        let at = self
            .intervals
            .partition_point(|existing| existing.lower < interval.lower);
        self.intervals.insert(at, interval);
        self.normalize();
    }

    /// Remove every instant of `interval` from the set.
    pub fn subtract(&mut self, interval: &Interval) {
        if !self.overlaps(interval) {
            return;
        }
        self.intervals = self
            .intervals
            .iter()
            .flat_map(|piece| piece.difference(interval).intervals)
            .collect();
    }

    /// The part of the set that falls inside `interval`.
    #[must_use]
    pub fn intersection(&self, interval: &Interval) -> Self {
        Self {
            intervals: self
                .intervals
                .iter()
                .filter_map(|piece| piece.intersection(interval))
                .collect(),
        }
    }

    #[must_use]
    pub fn overlaps(&self, interval: &Interval) -> bool {
        self.intervals.iter().any(|piece| piece.overlaps(interval))
    }

    #[must_use]
    pub fn contains(&self, t: TimeOfDay) -> bool {
        self.interval_containing(t).is_some()
    }

    /// The contiguous piece that contains `t`, if any.
    #[must_use]
    pub fn interval_containing(&self, t: TimeOfDay) -> Option<Interval> {
        self.intervals.iter().copied().find(|piece| piece.contains(t))
    }

    fn normalize(&mut self) {
        let mut merged: Vec<Interval> = Vec::with_capacity(self.intervals.len());
        for piece in self.intervals.drain(..) {
            match merged.last_mut() {
                Some(last) if piece.lower <= last.upper => {
                    last.upper = last.upper.max(piece.upper);
                }
                _ => merged.push(piece),
            }
        }
        self.intervals = merged;
    }
}

impl From<Interval> for IntervalSet {
    fn from(interval: Interval) -> Self {
        Self {
            intervals: vec![interval],
        }
    }
}

impl fmt::Display for IntervalSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.intervals.is_empty() {
            return f.write_str("()");
        }
        let pieces: Vec<String> = self.intervals.iter().map(ToString::to_string).collect();
        f.write_str(&pieces.join(" | "))
    }
}
