// Business-day calendar: Monday–Friday, no holiday table. Holidays simply
// have no bars and are skipped by the driver's no-price rule.

use chrono::{Datelike, Days, NaiveDate, Weekday};

pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// All business days in `[start, end]`, in order. Empty when the range is
/// empty or inverted.
pub fn business_days(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut current = start;
    while current <= end {
        if is_business_day(current) {
            days.push(current);
        }
        match current.checked_add_days(Days::new(1)) {
            Some(next) => current = next,
            None => break,
        }
    }
    days
}

/// `date` advanced by `n` business days.
pub fn add_business_days(date: NaiveDate, n: u32) -> NaiveDate {
    let mut current = date;
    let mut remaining = n;
    while remaining > 0 {
        current = current
            .checked_add_days(Days::new(1))
            .expect("date overflow walking business days");
        if is_business_day(current) {
            remaining -= 1;
        }
    }
    current
}
