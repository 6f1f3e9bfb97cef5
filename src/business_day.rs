// 📅 Business-Day Adjuster - Move due dates past weekends and holidays
// Forward-only, bounded, pure

use crate::holidays::HolidaySet;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Upper bound on forward steps before giving up
pub const MAX_ADJUST_ATTEMPTS: u32 = 10;

/// Result of moving a date to the next business day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
    /// Adjusted date (the last candidate when exhausted)
    pub date: NaiveDate,
    pub original: NaiveDate,
    pub steps: u32,
    /// Holiday names stepped over, in order
    pub skipped_holidays: Vec<String>,
    /// The bound was hit while the candidate was still not a business day
    pub exhausted: bool,
}

impl Adjustment {
    pub fn moved(&self) -> bool {
        self.date != self.original
    }
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

pub fn is_business_day(date: NaiveDate, holidays: &HolidaySet) -> bool {
    !is_weekend(date) && !holidays.contains(date)
}

/// Advance one day at a time while the candidate is a weekend or a holiday
///
/// Stops after `MAX_ADJUST_ATTEMPTS` steps; `exhausted` tells whether the
/// returned date is still not a business day.
pub fn adjust(date: NaiveDate, holidays: &HolidaySet) -> Adjustment {
    let mut candidate = date;
    let mut steps = 0;
    let mut skipped_holidays = Vec::new();

    while !is_business_day(candidate, holidays) {
        if steps >= MAX_ADJUST_ATTEMPTS {
            log::warn!(
                "event=adjust_exhausted original={} last_candidate={} steps={}",
                date, candidate, steps
            );
            return Adjustment {
                date: candidate,
                original: date,
                steps,
                skipped_holidays,
                exhausted: true,
            };
        }

        if let Some(name) = holidays.name(candidate) {
            skipped_holidays.push(name.to_string());
        }

        candidate = match candidate.checked_add_signed(Duration::days(1)) {
            Some(next) => next,
            None => break,
        };
        steps += 1;
    }

    Adjustment {
        date: candidate,
        original: date,
        steps,
        skipped_holidays,
        exhausted: !is_business_day(candidate, holidays),
    }
}

/// Gregorian leap year
pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub fn last_day_of_month(year: i32, month: u32) -> Option<u32> {
    if !(1..=12).contains(&month) {
        return None;
    }
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
}

/// Nominal (pre-adjustment) due date of a template in a given month
///
/// February day 28 is promoted to 29 in leap years; any day past the end
/// of the month clamps to its last day.
pub fn nominal_due_date(year: i32, month: u32, due_day: u32) -> Option<NaiveDate> {
    if due_day == 0 {
        return None;
    }
    let last = last_day_of_month(year, month)?;

    let day = if month == 2 && due_day == 28 && is_leap_year(year) {
        29
    } else {
        due_day.min(last)
    };

    NaiveDate::from_ymd_opt(year, month, day)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn national_2025() -> HolidaySet {
        HolidaySet::from_entries(
            2025,
            [
                (1, 1, "Confraternização mundial"),
                (4, 18, "Sexta-feira Santa"),
                (4, 21, "Tiradentes"),
                (9, 7, "Independência do Brasil"),
                (12, 25, "Natal"),
            ],
        )
    }

    #[test]
    fn test_adjusted_date_is_business_day_and_not_earlier() {
        let holidays = national_2025();
        let mut day = date(2025, 1, 1);

        while day.year() == 2025 {
            let result = adjust(day, &holidays);
            assert!(result.date >= day, "{} moved backwards", day);
            assert!(!result.exhausted);
            assert!(!is_weekend(result.date), "{} landed on a weekend", day);
            assert!(!holidays.contains(result.date), "{} landed on a holiday", day);
            day = day.succ_opt().unwrap();
        }
    }

    #[test]
    fn test_year_boundary() {
        // 2023-12-31 is a Sunday; New Year's Day comes from the December set
        let holidays = HolidaySet::from_entries(2023, [(1, 1, "Confraternização mundial"), (12, 25, "Natal")]);

        let result = adjust(date(2023, 12, 31), &holidays);
        assert_eq!(result.date, date(2024, 1, 2));
        assert_eq!(result.steps, 2);
        assert_eq!(result.skipped_holidays, vec!["Confraternização mundial".to_string()]);
        assert!(!result.exhausted);
    }

    #[test]
    fn test_idempotent_on_business_days() {
        let holidays = national_2025();
        let tuesday = date(2025, 9, 23);

        let once = adjust(tuesday, &holidays);
        assert_eq!(once.date, tuesday);
        assert!(!once.moved());
        assert_eq!(once.steps, 0);

        let twice = adjust(once.date, &holidays);
        assert_eq!(twice.date, once.date);
    }

    #[test]
    fn test_saturday_then_monday_holiday() {
        let holidays = HolidaySet::from_entries(2025, [(9, 22, "Feriado de teste")]);

        let result = adjust(date(2025, 9, 20), &holidays);

        assert_eq!(result.date, date(2025, 9, 23));
        assert_eq!(result.steps, 3);
        assert_eq!(result.skipped_holidays, vec!["Feriado de teste".to_string()]);
        assert!(result.moved());
    }

    #[test]
    fn test_easter_weekend() {
        // Good Friday + weekend + Tiradentes on Monday
        let result = adjust(date(2025, 4, 18), &national_2025());
        assert_eq!(result.date, date(2025, 4, 22));
        assert_eq!(result.skipped_holidays.len(), 2);
    }

    #[test]
    fn test_bound_is_enforced() {
        let entries: Vec<(u32, u32, &str)> = (1..=31).map(|d| (7, d, "Recesso")).collect();
        let holidays = HolidaySet::from_entries(2025, entries);

        let result = adjust(date(2025, 7, 1), &holidays);
        assert!(result.exhausted);
        assert_eq!(result.steps, MAX_ADJUST_ATTEMPTS);
        assert_eq!(result.date, date(2025, 7, 11));
    }

    #[test]
    fn test_leap_year_promotion() {
        assert!(is_leap_year(2024));
        assert!(!is_leap_year(2025));
        assert!(!is_leap_year(1900));
        assert!(is_leap_year(2000));

        assert_eq!(nominal_due_date(2024, 2, 28), Some(date(2024, 2, 29)));
        assert_eq!(nominal_due_date(2025, 2, 28), Some(date(2025, 2, 28)));

        // 2024-02-29 is a Thursday, so adjustment keeps it
        let nominal = nominal_due_date(2024, 2, 28).unwrap();
        assert_eq!(adjust(nominal, &HolidaySet::new(2024)).date, date(2024, 2, 29));
    }

    #[test]
    fn test_clamp_to_month_length() {
        assert_eq!(nominal_due_date(2025, 2, 31), Some(date(2025, 2, 28)));
        assert_eq!(nominal_due_date(2024, 2, 30), Some(date(2024, 2, 29)));
        assert_eq!(nominal_due_date(2025, 4, 31), Some(date(2025, 4, 30)));
        assert_eq!(nominal_due_date(2025, 12, 31), Some(date(2025, 12, 31)));

        assert_eq!(nominal_due_date(2025, 13, 10), None);
        assert_eq!(nominal_due_date(2025, 0, 10), None);
        assert_eq!(nominal_due_date(2025, 5, 0), None);
        assert_eq!(nominal_due_date(2025, u32::MAX, 10), None);
    }

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(last_day_of_month(2024, 2), Some(29));
        assert_eq!(last_day_of_month(2025, 2), Some(28));
        assert_eq!(last_day_of_month(2025, 12), Some(31));
        assert_eq!(last_day_of_month(2025, 13), None);
    }
}
