//! Time interval overlap checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A `{start, end}` pair of absolute timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timespan {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Timespan {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Returns true unless one span ends at or before the other one starts.
    ///
    /// Spans that merely touch (`a.end == b.start`) do not intersect.
    pub fn intersects(&self, other: &Timespan) -> bool {
        !(self.end <= other.start || other.end <= self.start)
    }

    /// Returns true if `instant` lies within `[start, end)`.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

/// Counts the pairs `(a, b)` with `a` from `first` and `b` from `second` that intersect.
///
/// The count is symmetric in its arguments. Comparing a set of spans with
/// itself reports every non-empty span, so callers exclude self-comparison.
pub fn overlaps(first: &[Timespan], second: &[Timespan]) -> usize {
    first
        .iter()
        .map(|a| second.iter().filter(|b| a.intersects(b)).count())
        .sum()
}
