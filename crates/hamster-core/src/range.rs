//! Time ranges and hamster days.
//!
//! A hamster day is a 24-hour accounting period that begins at the configured
//! day-start offset instead of midnight. With a 05:30 day start, a fact at
//! 02:00 on March 15 belongs to the hamster day of March 14.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::fact::Fact;

/// A time interval with a required start and an optional end.
///
/// An open end means "until now". [`Range::bounded`] resolves it against a
/// clock; the matching methods treat a range that was never resolved as
/// unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: NaiveDateTime,
    #[serde(default)]
    pub end: Option<NaiveDateTime>,
}

impl Range {
    /// Builds a range from a start and an optional end.
    pub const fn from_start_end(start: NaiveDateTime, end: Option<NaiveDateTime>) -> Self {
        Self { start, end }
    }

    /// Resolves an open end to `now`.
    ///
    /// Stored times are whole seconds, so the resolved end is the second after
    /// `now` and facts starting at `now` still fall inside.
    #[must_use]
    pub fn bounded(self, now: NaiveDateTime) -> Self {
        Self {
            start: self.start,
            end: Some(self.end.unwrap_or_else(|| {
                crate::fact::truncate_to_seconds(now) + Duration::seconds(1)
            })),
        }
    }

    /// The range covering one hamster day.
    pub fn hamster_day(day: NaiveDate, day_start: NaiveTime) -> Self {
        let start = day.and_time(day_start);
        Self {
            start,
            end: Some(start + Duration::days(1)),
        }
    }

    /// The hamster day containing `now`.
    pub fn today(now: NaiveDateTime, day_start: NaiveTime) -> Self {
        Self::hamster_day(hamster_day(now, day_start), day_start)
    }

    /// Whether `[start, end)` of the given interval shares any instant with
    /// this range. A missing `end` on either side is unbounded.
    ///
    /// Zero-length intervals count when they sit inside the range.
    pub fn intersects(&self, start: NaiveDateTime, end: Option<NaiveDateTime>) -> bool {
        let starts_before_range_ends = self.end.is_none_or(|range_end| start < range_end);
        let ends_after_range_starts =
            end.is_none_or(|end| end > self.start || (end == start && start >= self.start));
        starts_before_range_ends && ends_after_range_starts
    }

    /// Whether a fact falls within this range. Facts without a start never do.
    pub fn contains_fact(&self, fact: &Fact) -> bool {
        fact.start_time
            .is_some_and(|start| self.intersects(start, fact.end_time))
    }
}

/// The hamster day a timestamp belongs to.
pub fn hamster_day(timestamp: NaiveDateTime, day_start: NaiveTime) -> NaiveDate {
    if timestamp.time() < day_start {
        timestamp.date() - Duration::days(1)
    } else {
        timestamp.date()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn day_start() -> NaiveTime {
        NaiveTime::from_hms_opt(5, 30, 0).unwrap()
    }

    #[test]
    fn test_early_morning_belongs_to_previous_day() {
        assert_eq!(
            hamster_day(dt(15, 2, 0), day_start()),
            NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
        );
        assert_eq!(
            hamster_day(dt(15, 5, 30), day_start()),
            NaiveDate::from_ymd_opt(2025, 3, 15).unwrap()
        );
    }

    #[test]
    fn test_today_spans_from_day_start_to_day_start() {
        let range = Range::today(dt(15, 2, 0), day_start());
        assert_eq!(range.start, dt(14, 5, 30));
        assert_eq!(range.end, Some(dt(15, 5, 30)));
    }

    #[test]
    fn test_intersects_is_half_open() {
        let range = Range::from_start_end(dt(14, 9, 0), Some(dt(14, 17, 0)));
        assert!(range.intersects(dt(14, 8, 0), Some(dt(14, 9, 30))));
        assert!(range.intersects(dt(14, 16, 0), None));
        assert!(range.intersects(dt(14, 8, 0), None));
        assert!(!range.intersects(dt(14, 8, 0), Some(dt(14, 9, 0))));
        assert!(!range.intersects(dt(14, 17, 0), Some(dt(14, 18, 0))));
    }

    #[test]
    fn test_open_range_extends_forever() {
        let range = Range::from_start_end(dt(14, 9, 0), None);
        assert!(range.intersects(dt(20, 9, 0), Some(dt(20, 10, 0))));
        assert!(!range.intersects(dt(13, 9, 0), Some(dt(13, 10, 0))));
    }

    #[test]
    fn test_bounded_resolves_open_end_to_now() {
        let now = dt(14, 12, 0);
        let range = Range::from_start_end(dt(14, 9, 0), None).bounded(now);

        assert_eq!(range.end, Some(now + Duration::seconds(1)));
        assert!(range.contains_fact(&Fact::new("Coding").with_start(now)));
        assert!(!range.contains_fact(&Fact::new("Planned").with_start(dt(16, 9, 0))));
    }

    #[test]
    fn test_bounded_keeps_explicit_end() {
        let range = Range::from_start_end(dt(14, 9, 0), Some(dt(20, 0, 0)));
        assert_eq!(range.bounded(dt(14, 12, 0)), range);
    }

    #[test]
    fn test_zero_length_fact_inside_range_counts() {
        let range = Range::from_start_end(dt(14, 9, 0), Some(dt(14, 17, 0)));
        assert!(range.intersects(dt(14, 12, 0), Some(dt(14, 12, 0))));
        assert!(!range.intersects(dt(14, 8, 0), Some(dt(14, 8, 0))));
    }

    #[test]
    fn test_contains_fact_requires_start() {
        let range = Range::today(dt(14, 12, 0), day_start());
        assert!(range.contains_fact(&Fact::new("Coding").with_start(dt(14, 10, 0))));
        assert!(!range.contains_fact(&Fact::new("Coding")));
    }
}
