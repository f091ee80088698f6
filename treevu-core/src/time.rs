//! Time utilities: calendar days are Lima-local.

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use chrono_tz::America::Lima;

/// The calendar day in Lima for a UTC instant.
///
/// Streaks, budgets and "this month" all key off this day rather than the UTC date.
pub fn lima_date(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&Lima).date_naive()
}

/// Today in Lima.
pub fn lima_today() -> NaiveDate {
    lima_date(Utc::now())
}

/// True if `a` is exactly the day before `b`.
pub fn is_day_before(a: NaiveDate, b: NaiveDate) -> bool {
    a.succ_opt() == Some(b)
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Same calendar month and year.
pub fn same_month(a: NaiveDate, b: NaiveDate) -> bool {
    a.year() == b.year() && a.month() == b.month()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_lima_date_lags_utc() {
        // 03:00 UTC is still the previous evening in Lima (UTC-5)
        let utc = Utc.with_ymd_and_hms(2026, 3, 2, 3, 0, 0).unwrap();
        assert_eq!(lima_date(utc), NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
    }

    #[test]
    fn test_day_helpers() {
        let fri = NaiveDate::from_ymd_opt(2026, 3, 6).unwrap();
        let sat = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert!(is_day_before(fri, sat));
        assert!(!is_day_before(sat, fri));
        assert!(is_weekend(sat));
        assert!(!is_weekend(fri));
        assert!(same_month(fri, sat));
    }
}
