use crate::{Error, HlsResult};
use std::{collections::BTreeMap, fmt};

/// A set of disjoint closed integer intervals `[lo, hi]`.
///
/// Intervals are stored in a map keyed by their left bound. Because no two
/// stored intervals overlap, the only candidate for overlapping a query range
/// `[lo, hi]` is the stored interval with the largest left bound not exceeding
/// `hi`, which makes [IntervalSet::intersects] a single logarithmic lookup.
/// Adjacent intervals are kept apart rather than merged.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IntervalSet {
    intervals: BTreeMap<i64, i64>,
}

impl IntervalSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Returns true iff some stored interval shares an integer point with
    /// `[lo, hi]`. An empty range (`lo > hi`) never intersects.
    pub fn intersects(&self, lo: i64, hi: i64) -> bool {
        if lo > hi {
            return false;
        }
        self.intervals
            .range(..=hi)
            .next_back()
            .is_some_and(|(_, &right)| right >= lo)
    }

    /// Returns true iff `point` lies inside a stored interval.
    pub fn contains_point(&self, point: i64) -> bool {
        self.intersects(point, point)
    }

    /// Returns true iff exactly `[lo, hi]` is stored.
    pub fn contains(&self, lo: i64, hi: i64) -> bool {
        self.intervals.get(&lo) == Some(&hi)
    }

    /// Inserts `[lo, hi]`. Empty ranges are ignored. Inserting a range that
    /// overlaps a stored interval is rejected and leaves the set unchanged.
    pub fn add(&mut self, lo: i64, hi: i64) -> HlsResult<()> {
        if lo > hi {
            return Ok(());
        }
        if self.intersects(lo, hi) {
            return Err(Error::IntervalOverlap { lo, hi });
        }
        self.intervals.insert(lo, hi);
        Ok(())
    }

    /// Stored intervals in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.intervals.iter().map(|(&lo, &hi)| (lo, hi))
    }

    /// Number of integer points covered by the set.
    pub fn covered(&self) -> i64 {
        self.iter().map(|(lo, hi)| hi - lo + 1).sum()
    }

    pub fn clear(&mut self) {
        self.intervals.clear();
    }
}

impl fmt::Display for IntervalSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (lo, hi) in self.iter() {
            if !first {
                write!(f, "; ")?;
            }
            first = false;
            write!(f, "[{lo}-{hi}]")?;
        }
        Ok(())
    }
}
