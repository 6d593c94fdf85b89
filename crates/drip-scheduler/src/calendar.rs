use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Weekday that is not a US federal holiday the campaigns observe.
///
/// Fixed-date holidays (New Year's Day, Independence Day, Christmas) are
/// matched on the calendar date; no observed-day shift onto a Friday or
/// Monday is applied.
pub fn is_business_day(date: NaiveDate) -> bool {
    if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }
    !is_holiday(date)
}

fn is_holiday(date: NaiveDate) -> bool {
    let fixed = matches!((date.month(), date.day()), (1, 1) | (7, 4) | (12, 25));
    fixed
        || Some(date) == last_weekday_of_month(date.year(), 5, Weekday::Mon) // Memorial Day
        || Some(date) == nth_weekday_of_month(date.year(), 9, Weekday::Mon, 1) // Labor Day
        || Some(date) == nth_weekday_of_month(date.year(), 11, Weekday::Thu, 4) // Thanksgiving
}

/// The `n`th (1-based) `weekday` in a month.
fn nth_weekday_of_month(year: i32, month: u32, weekday: Weekday, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
}

fn last_weekday_of_month(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let mut day = NaiveDate::from_ymd_opt(next_year, next_month, 1)? - Duration::days(1);
    while day.weekday() != weekday {
        day -= Duration::days(1);
    }
    Some(day)
}
