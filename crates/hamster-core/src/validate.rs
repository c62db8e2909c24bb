//! Fact validation rules.
//!
//! [`validate_fact`] holds the rules that need nothing but the fact itself.
//! [`check_overlap`] compares a fact against facts already stored; record
//! stores call it from their own `check_fact` with the candidates they load.
//! Neither function has side effects.

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::fact::Fact;
use crate::types::ValidationError;

/// Longest duration a single fact may span.
pub const MAX_FACT_HOURS: i64 = 24;

/// Checks the rules that do not depend on stored facts.
pub fn validate_fact(fact: &Fact) -> Result<(), ValidationError> {
    let Some(start) = fact.start_time else {
        return Err(ValidationError::MissingStartTime);
    };
    if fact.activity.trim().is_empty() {
        return Err(ValidationError::MissingActivity);
    }
    if let Some(category) = fact.category.as_deref() {
        if category.contains(',') {
            return Err(ValidationError::ForbiddenComma {
                field: "category",
                value: category.to_string(),
            });
        }
    }
    if let Some(end) = fact.end_time {
        if end < start {
            return Err(ValidationError::NegativeDuration);
        }
        if end - start > Duration::hours(MAX_FACT_HOURS) {
            return Err(ValidationError::TooLong {
                max_hours: MAX_FACT_HOURS,
            });
        }
    }
    Ok(())
}

/// Whether adding `fact` closes `other` instead of conflicting with it.
///
/// Starting a new ongoing fact stops whatever ongoing fact was started before
/// it, at the new fact's start.
pub fn supersedes(fact: &Fact, other: &Fact) -> bool {
    match (fact.start_time, other.start_time) {
        (Some(start), Some(other_start)) => {
            fact.is_ongoing() && other.is_ongoing() && other_start < start
        }
        _ => false,
    }
}

/// Checks `fact` against stored facts for overlaps.
///
/// Intervals are half-open and an ongoing fact extends indefinitely. Facts in
/// `existing` carrying the same id as `fact`, and ongoing facts that `fact`
/// [`supersedes`], are skipped. `default_day` only shortens the message:
/// times on that day are printed without their date.
pub fn check_overlap(
    fact: &Fact,
    existing: &[Fact],
    default_day: Option<NaiveDate>,
) -> Result<(), ValidationError> {
    let Some(start) = fact.start_time else {
        return Err(ValidationError::MissingStartTime);
    };

    let conflict = existing.iter().find(|other| {
        if fact.id.is_some() && other.id == fact.id {
            return false;
        }
        if supersedes(fact, other) {
            return false;
        }
        let Some(other_start) = other.start_time else {
            return false;
        };
        intervals_overlap(start, fact.end_time, other_start, other.end_time)
    });

    match conflict {
        Some(other) => Err(ValidationError::Overlap {
            reason: overlap_reason(other, default_day),
        }),
        None => Ok(()),
    }
}

fn intervals_overlap(
    start: NaiveDateTime,
    end: Option<NaiveDateTime>,
    other_start: NaiveDateTime,
    other_end: Option<NaiveDateTime>,
) -> bool {
    let before_other_ends = other_end.is_none_or(|other_end| start < other_end);
    let after_other_starts = end.is_none_or(|end| other_start < end);
    before_other_ends && after_other_starts
}

fn overlap_reason(other: &Fact, default_day: Option<NaiveDate>) -> String {
    let start = other
        .start_time
        .map(|start| format_time(start, default_day))
        .unwrap_or_default();
    let end = other
        .end_time
        .map_or_else(|| "now".to_string(), |end| format_time(end, default_day));
    let id = other
        .id
        .map(|id| format!(" #{id}"))
        .unwrap_or_default();
    format!("overlaps with '{}'{id} ({start} - {end})", other.activity)
}

fn format_time(timestamp: NaiveDateTime, default_day: Option<NaiveDate>) -> String {
    if default_day == Some(timestamp.date()) {
        timestamp.format("%H:%M").to_string()
    } else {
        timestamp.format("%Y-%m-%d %H:%M").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FactId;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        day().and_hms_opt(hour, minute, 0).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    fn stored(id: i64, activity: &str, start: NaiveDateTime, end: Option<NaiveDateTime>) -> Fact {
        let mut fact = Fact::new(activity).with_start(start);
        fact.end_time = end;
        fact.id = Some(FactId::new(id).unwrap());
        fact
    }

    #[test]
    fn test_missing_start_time_is_rejected() {
        let err = validate_fact(&Fact::new("Coding")).unwrap_err();
        assert_eq!(err, ValidationError::MissingStartTime);
        assert_eq!(err.to_string(), "missing start time");
    }

    #[test]
    fn test_blank_activity_is_rejected() {
        let fact = Fact::new("  ").with_start(at(9, 0));
        assert_eq!(
            validate_fact(&fact).unwrap_err(),
            ValidationError::MissingActivity
        );
    }

    #[test]
    fn test_end_before_start_is_rejected() {
        let fact = Fact::new("Coding").with_start(at(10, 0)).with_end(at(9, 0));
        assert_eq!(
            validate_fact(&fact).unwrap_err(),
            ValidationError::NegativeDuration
        );
    }

    #[test]
    fn test_overly_long_fact_is_rejected() {
        let fact = Fact::new("Coding")
            .with_start(at(9, 0))
            .with_end(at(9, 0) + Duration::hours(25));
        assert!(matches!(
            validate_fact(&fact),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_comma_in_category_is_rejected() {
        let fact = Fact::new("Coding")
            .with_category("work, home")
            .with_start(at(9, 0));
        assert!(matches!(
            validate_fact(&fact),
            Err(ValidationError::ForbiddenComma { field: "category", .. })
        ));
    }

    #[test]
    fn test_zero_length_fact_is_valid() {
        let fact = Fact::new("Call").with_start(at(9, 0)).with_end(at(9, 0));
        assert!(validate_fact(&fact).is_ok());
    }

    #[test]
    fn test_overlapping_fact_is_rejected_with_short_message() {
        let existing = [stored(1, "Meeting", at(9, 0), Some(at(10, 0)))];
        let fact = Fact::new("Coding").with_start(at(9, 30)).with_end(at(11, 0));

        let err = check_overlap(&fact, &existing, Some(day())).unwrap_err();
        assert_eq!(
            err.to_string(),
            "overlaps with 'Meeting' #1 (09:00 - 10:00)"
        );

        let err = check_overlap(&fact, &existing, None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "overlaps with 'Meeting' #1 (2025-03-14 09:00 - 2025-03-14 10:00)"
        );
    }

    #[test]
    fn test_default_day_never_changes_outcome() {
        let existing = [stored(1, "Meeting", at(9, 0), Some(at(10, 0)))];
        let fine = Fact::new("Coding").with_start(at(10, 0)).with_end(at(11, 0));
        let other_day = NaiveDate::from_ymd_opt(2020, 1, 1);

        assert!(check_overlap(&fine, &existing, None).is_ok());
        assert!(check_overlap(&fine, &existing, Some(day())).is_ok());
        assert!(check_overlap(&fine, &existing, other_day).is_ok());
    }

    #[test]
    fn test_adjacent_facts_do_not_overlap() {
        let existing = [stored(1, "Meeting", at(9, 0), Some(at(10, 0)))];
        let before = Fact::new("Email").with_start(at(8, 0)).with_end(at(9, 0));
        assert!(check_overlap(&before, &existing, None).is_ok());
    }

    #[test]
    fn test_new_ongoing_fact_supersedes_earlier_ongoing_fact() {
        let existing = [stored(1, "Meeting", at(9, 0), None)];
        let next = Fact::new("Coding").with_start(at(10, 0));
        assert!(supersedes(&next, &existing[0]));
        assert!(check_overlap(&next, &existing, None).is_ok());
    }

    #[test]
    fn test_closed_fact_inside_ongoing_fact_overlaps() {
        let existing = [stored(1, "Meeting", at(9, 0), None)];
        let past = Fact::new("Coding").with_start(at(10, 0)).with_end(at(10, 30));
        let err = check_overlap(&past, &existing, Some(day())).unwrap_err();
        assert_eq!(err.to_string(), "overlaps with 'Meeting' #1 (09:00 - now)");
    }

    #[test]
    fn test_ongoing_fact_before_later_fact_overlaps() {
        let existing = [stored(1, "Meeting", at(11, 0), Some(at(12, 0)))];
        let fact = Fact::new("Coding").with_start(at(10, 0));
        assert!(check_overlap(&fact, &existing, None).is_err());
    }

    #[test]
    fn test_fact_does_not_overlap_itself() {
        let existing = [stored(4, "Meeting", at(9, 0), Some(at(10, 0)))];
        let mut edited = existing[0].clone();
        edited.end_time = Some(at(10, 30));
        assert!(check_overlap(&edited, &existing, None).is_ok());
    }
}
