//! Fixed-precision time primitives for scheduling.
//!
//! All times and durations are integer tick counts (one tick = one
//! microsecond). Integer ticks keep window arithmetic and root-finding free
//! of floating-point drift; fractional intermediate values only ever appear
//! transiently inside the secant iteration.
//!
//! # Concepts
//!
//! - [`Duration`]: a signed tick count, used both for instants relative to
//!   the plan epoch and for durations proper
//! - [`Interval`]: a closed `[start, end]` interval
//! - [`Windows`]: a normalized set of disjoint intervals representing the
//!   instants where some condition holds

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg, Sub};

/// A span of time in integer ticks (microseconds).
///
/// Doubles as an instant relative to the plan epoch. Negative values are
/// legal for offsets; the grounding pass rejects any directive that
/// resolves to a negative absolute start.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Duration(i64);

impl Duration {
    /// The zero duration.
    pub const ZERO: Duration = Duration(0);

    /// Creates a duration from a raw tick count.
    pub const fn of_ticks(ticks: i64) -> Self {
        Duration(ticks)
    }

    /// Creates a duration from whole microseconds (one tick each).
    pub const fn from_micros(micros: i64) -> Self {
        Duration(micros)
    }

    /// Creates a duration from whole seconds.
    pub const fn from_secs(secs: i64) -> Self {
        Duration(secs * 1_000_000)
    }

    /// Raw tick count.
    pub const fn ticks(&self) -> i64 {
        self.0
    }

    /// Whether this duration is negative.
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Component-wise minimum.
    pub fn min(self, other: Duration) -> Duration {
        Duration(self.0.min(other.0))
    }

    /// Component-wise maximum.
    pub fn max(self, other: Duration) -> Duration {
        Duration(self.0.max(other.0))
    }

    /// Absolute value.
    pub fn abs(self) -> Duration {
        Duration(self.0.abs())
    }

    /// Midpoint of two durations, rounded toward the first.
    pub fn midpoint(self, other: Duration) -> Duration {
        Duration(self.0 + (other.0 - self.0) / 2)
    }
}

impl Add for Duration {
    type Output = Duration;
    fn add(self, rhs: Duration) -> Duration {
        Duration(self.0 + rhs.0)
    }
}

impl Sub for Duration {
    type Output = Duration;
    fn sub(self, rhs: Duration) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

impl Neg for Duration {
    type Output = Duration;
    fn neg(self) -> Duration {
        Duration(-self.0)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}

/// A closed time interval `[start, end]`.
///
/// Membership tests are closed on both ends unless a constraint library
/// documents otherwise. Invariant: `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    /// Inclusive lower bound.
    pub start: Duration,
    /// Inclusive upper bound.
    pub end: Duration,
}

impl Interval {
    /// Creates a closed interval between two instants.
    ///
    /// # Panics
    /// Panics if `start > end`.
    pub fn between(start: Duration, end: Duration) -> Self {
        assert!(start <= end, "interval start must not exceed end");
        Interval { start, end }
    }

    /// A single-instant interval `[t, t]`.
    pub fn at(t: Duration) -> Self {
        Interval { start: t, end: t }
    }

    /// Length of the interval (`end - start`).
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Whether the instant lies within the closed interval.
    pub fn contains(&self, t: Duration) -> bool {
        self.start <= t && t <= self.end
    }

    /// Whether `other` lies entirely within this interval.
    pub fn encloses(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Intersection of two closed intervals, if non-empty.
    pub fn intersect(&self, other: &Interval) -> Option<Interval> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start <= end {
            Some(Interval { start, end })
        } else {
            None
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// A boolean-valued time set: the instants where some condition holds.
///
/// Stored as a normalized sequence of disjoint, ascending closed intervals.
/// Touching or overlapping intervals are merged on insertion, so equality
/// on `Windows` is semantic equality of the underlying time sets.
///
/// # Narrowing Invariant
///
/// Every operation offered here either preserves or shrinks the time set
/// (`intersect`, `subtract`, `clip`); union is the only growing operation
/// and is never used by the window-narrowing passes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Windows {
    intervals: Vec<Interval>,
}

impl Windows {
    /// The empty time set.
    pub fn empty() -> Self {
        Windows::default()
    }

    /// A time set holding a single interval.
    pub fn from_interval(interval: Interval) -> Self {
        Windows {
            intervals: vec![interval],
        }
    }

    /// Adds an interval, merging with any overlapping or touching spans.
    pub fn add(&mut self, interval: Interval) {
        self.intervals.push(interval);
        self.normalize();
    }

    fn normalize(&mut self) {
        self.intervals.sort_by_key(|iv| (iv.start, iv.end));
        let mut merged: Vec<Interval> = Vec::with_capacity(self.intervals.len());
        for iv in self.intervals.drain(..) {
            match merged.last_mut() {
                Some(last) if iv.start <= last.end => {
                    last.end = last.end.max(iv.end);
                }
                _ => merged.push(iv),
            }
        }
        self.intervals = merged;
    }

    /// Whether no instant is in the set.
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Number of disjoint intervals.
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// Iterates the disjoint intervals in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = Interval> + '_ {
        self.intervals.iter().copied()
    }

    /// The earliest interval, if any.
    pub fn first(&self) -> Option<Interval> {
        self.intervals.first().copied()
    }

    /// The enclosing interval from earliest start to latest end.
    pub fn span(&self) -> Option<Interval> {
        match (self.intervals.first(), self.intervals.last()) {
            (Some(first), Some(last)) => Some(Interval::between(first.start, last.end)),
            _ => None,
        }
    }

    /// Whether the instant is a member of the set.
    pub fn contains(&self, t: Duration) -> bool {
        self.intervals.iter().any(|iv| iv.contains(t))
    }

    /// Whether every instant of `other` is also in `self`.
    pub fn includes(&self, other: &Windows) -> bool {
        other
            .intervals
            .iter()
            .all(|o| self.intervals.iter().any(|s| s.encloses(o)))
    }

    /// Set intersection. The result is always a subset of both operands.
    pub fn intersect(&self, other: &Windows) -> Windows {
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.intervals.len() && j < other.intervals.len() {
            let a = self.intervals[i];
            let b = other.intervals[j];
            if let Some(iv) = a.intersect(&b) {
                out.push(iv);
            }
            if a.end <= b.end {
                i += 1;
            } else {
                j += 1;
            }
        }
        Windows { intervals: out }
    }

    /// Set union.
    pub fn union(&self, other: &Windows) -> Windows {
        let mut all = self.intervals.clone();
        all.extend_from_slice(&other.intervals);
        let mut w = Windows { intervals: all };
        w.normalize();
        w
    }

    /// Removes every instant of `other` from `self`.
    ///
    /// Interval boundaries shared with a removed span are trimmed by one
    /// tick so the result stays a set of closed intervals.
    pub fn subtract(&self, other: &Windows) -> Windows {
        let mut current = self.intervals.clone();
        for cut in &other.intervals {
            let mut next = Vec::with_capacity(current.len() + 1);
            for iv in current {
                if cut.end < iv.start || iv.end < cut.start {
                    next.push(iv);
                    continue;
                }
                if iv.start < cut.start {
                    next.push(Interval::between(iv.start, cut.start - Duration::of_ticks(1)));
                }
                if cut.end < iv.end {
                    next.push(Interval::between(cut.end + Duration::of_ticks(1), iv.end));
                }
            }
            current = next;
        }
        Windows { intervals: current }
    }

    /// Restricts the set to a single interval.
    pub fn clip(&self, bounds: Interval) -> Windows {
        self.intersect(&Windows::from_interval(bounds))
    }
}

impl FromIterator<Interval> for Windows {
    fn from_iter<T: IntoIterator<Item = Interval>>(iter: T) -> Self {
        let mut w = Windows {
            intervals: iter.into_iter().collect(),
        };
        w.normalize();
        w
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(a: i64, b: i64) -> Interval {
        Interval::between(Duration::of_ticks(a), Duration::of_ticks(b))
    }

    #[test]
    fn test_duration_arithmetic() {
        let a = Duration::from_secs(2);
        let b = Duration::from_micros(500_000);
        assert_eq!((a + b).ticks(), 2_500_000);
        assert_eq!((a - b).ticks(), 1_500_000);
        assert_eq!((-b).ticks(), -500_000);
        assert!(Duration::of_ticks(-1).is_negative());
    }

    #[test]
    fn test_duration_midpoint() {
        let a = Duration::of_ticks(0);
        let b = Duration::of_ticks(10);
        assert_eq!(a.midpoint(b).ticks(), 5);
        assert_eq!(b.midpoint(a).ticks(), 5);
        assert_eq!(a.midpoint(Duration::of_ticks(1)).ticks(), 0);
    }

    #[test]
    fn test_interval_intersect() {
        assert_eq!(iv(0, 10).intersect(&iv(5, 15)), Some(iv(5, 10)));
        assert_eq!(iv(0, 10).intersect(&iv(10, 20)), Some(iv(10, 10)));
        assert_eq!(iv(0, 10).intersect(&iv(11, 20)), None);
    }

    #[test]
    fn test_interval_contains() {
        let i = iv(5, 10);
        assert!(i.contains(Duration::of_ticks(5)));
        assert!(i.contains(Duration::of_ticks(10)));
        assert!(!i.contains(Duration::of_ticks(11)));
    }

    #[test]
    fn test_windows_merge_on_add() {
        let mut w = Windows::empty();
        w.add(iv(0, 5));
        w.add(iv(5, 9));
        w.add(iv(20, 30));
        assert_eq!(w.len(), 2);
        assert_eq!(w.first(), Some(iv(0, 9)));
    }

    #[test]
    fn test_windows_intersect() {
        let a: Windows = [iv(0, 10), iv(20, 30)].into_iter().collect();
        let b: Windows = [iv(5, 25)].into_iter().collect();
        let c = a.intersect(&b);
        let expected: Windows = [iv(5, 10), iv(20, 25)].into_iter().collect();
        assert_eq!(c, expected);
    }

    #[test]
    fn test_windows_intersect_is_subset() {
        let a: Windows = [iv(0, 10), iv(40, 50)].into_iter().collect();
        let b: Windows = [iv(8, 45)].into_iter().collect();
        let c = a.intersect(&b);
        assert!(a.includes(&c));
        assert!(b.includes(&c));
    }

    #[test]
    fn test_windows_union() {
        let a: Windows = [iv(0, 10)].into_iter().collect();
        let b: Windows = [iv(10, 20), iv(30, 40)].into_iter().collect();
        let u = a.union(&b);
        let expected: Windows = [iv(0, 20), iv(30, 40)].into_iter().collect();
        assert_eq!(u, expected);
    }

    #[test]
    fn test_windows_subtract() {
        let a: Windows = [iv(0, 100)].into_iter().collect();
        let b: Windows = [iv(10, 20), iv(50, 60)].into_iter().collect();
        let d = a.subtract(&b);
        let expected: Windows = [iv(0, 9), iv(21, 49), iv(61, 100)].into_iter().collect();
        assert_eq!(d, expected);
        assert!(a.includes(&d));
    }

    #[test]
    fn test_windows_includes() {
        let a: Windows = [iv(0, 10), iv(20, 30)].into_iter().collect();
        let b: Windows = [iv(2, 8)].into_iter().collect();
        let c: Windows = [iv(8, 22)].into_iter().collect();
        assert!(a.includes(&b));
        assert!(!a.includes(&c));
        assert!(a.includes(&Windows::empty()));
    }

    #[test]
    fn test_windows_span() {
        let a: Windows = [iv(5, 10), iv(20, 30)].into_iter().collect();
        assert_eq!(a.span(), Some(iv(5, 30)));
        assert_eq!(Windows::empty().span(), None);
    }

    #[test]
    fn test_windows_clip() {
        let a: Windows = [iv(0, 10), iv(20, 30)].into_iter().collect();
        let clipped = a.clip(iv(5, 25));
        let expected: Windows = [iv(5, 10), iv(20, 25)].into_iter().collect();
        assert_eq!(clipped, expected);
    }
}
