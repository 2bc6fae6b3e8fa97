use hls_utils::IntervalSet;

/// The c-steps `[start, end]` during which `instr` occupies a unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reservation<T> {
    pub start: i64,
    pub end: i64,
    pub instr: T,
}

/// Occupation of a single functional-unit instance.
#[derive(Clone, Debug)]
pub struct ReservationTable<T> {
    intervals: IntervalSet,
    reservations: Vec<Reservation<T>>,
}

impl<T> Default for ReservationTable<T> {
    fn default() -> Self {
        Self {
            intervals: IntervalSet::new(),
            reservations: Vec::new(),
        }
    }
}

impl<T> ReservationTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty range is never reserved.
    pub fn is_reserved(&self, start: i64, end: i64) -> bool {
        self.intervals.intersects(start, end)
    }

    /// Reserves `[start, end]` for `instr` unless some of it is taken. Leaves
    /// the table untouched on failure.
    pub fn try_reserve(&mut self, start: i64, end: i64, instr: T) -> bool {
        if start > end {
            return true;
        }
        if self.is_reserved(start, end) || self.intervals.add(start, end).is_err() {
            return false;
        }
        self.reservations.push(Reservation { start, end, instr });
        true
    }

    pub fn reservations(&self) -> &[Reservation<T>] {
        &self.reservations
    }

    /// Number of occupied c-steps.
    pub fn occupation(&self) -> i64 {
        self.reservations.iter().map(|r| r.end - r.start + 1).sum()
    }

    pub fn utilization(&self, total_csteps: i64) -> f64 {
        if total_csteps <= 0 {
            return 0.0;
        }
        self.occupation() as f64 / total_csteps as f64
    }

    pub fn clear(&mut self) {
        self.intervals.clear();
        self.reservations.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn overlapping_reservation_is_refused() {
        let mut table = ReservationTable::new();
        assert!(table.try_reserve(0, 3, "a"));
        assert!(!table.try_reserve(2, 5, "b"));
        assert!(table.try_reserve(4, 5, "b"));
        assert_eq!(table.occupation(), 6);
        assert_eq!(
            table.reservations().iter().map(|r| r.instr).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert!((table.utilization(12) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_range_is_free() {
        let mut table = ReservationTable::new();
        assert!(table.try_reserve(0, 0, 1));
        assert!(!table.is_reserved(3, 2));
        assert!(table.try_reserve(3, 2, 2));
        assert_eq!(table.reservations().len(), 1);
        assert_eq!(table.utilization(0), 0.0);
    }

    proptest! {
        #[test]
        fn reservations_stay_disjoint(
            ranges in prop::collection::vec((0i64..40, 0i64..5), 1..30)
        ) {
            let mut table = ReservationTable::new();
            let mut expected = 0;
            for (i, (start, len)) in ranges.into_iter().enumerate() {
                let before = table.occupation();
                let end = start + len;
                let free = !table.is_reserved(start, end);
                prop_assert_eq!(table.try_reserve(start, end, i), free);
                if free {
                    expected += len + 1;
                    prop_assert!(table.occupation() > before);
                } else {
                    prop_assert_eq!(table.occupation(), before);
                }
            }
            prop_assert_eq!(table.occupation(), expected);
            let rs = table.reservations();
            for (i, a) in rs.iter().enumerate() {
                for b in &rs[i + 1..] {
                    prop_assert!(a.end < b.start || b.end < a.start);
                }
            }
        }
    }
}
