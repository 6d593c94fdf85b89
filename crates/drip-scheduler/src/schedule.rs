use chrono::{DateTime, Datelike, Duration, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScheduleError};

/// Daily run at HH:MM UTC, optionally Monday to Friday only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub hour: u32,
    pub minute: u32,
    pub weekends: bool,
}

impl Schedule {
    /// Build from an "HH:MM" string.
    pub fn daily(time: &str, weekends: bool) -> Result<Self> {
        let (hour, minute) = parse_time(time)?;
        Ok(Self {
            hour,
            minute,
            weekends,
        })
    }

    /// EventBridge form of this schedule.
    pub fn cron_expression(&self) -> String {
        if self.weekends {
            format!("cron({} {} * * ? *)", self.minute, self.hour)
        } else {
            // EventBridge rejects `*` in both day-of-month and day-of-week.
            format!("cron({} {} ? * MON-FRI *)", self.minute, self.hour)
        }
    }

    /// Next fire instant strictly after `after`.
    ///
    /// Returns `None` only when `hour`/`minute` were set out of range by hand.
    pub fn next_run(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut day = after.date_naive();
        // At most one weekend plus today's passed slot stands in the way.
        for _ in 0..4 {
            let candidate = Utc.from_utc_datetime(&day.and_hms_opt(self.hour, self.minute, 0)?);
            if candidate > after && (self.weekends || !is_weekend(day.weekday())) {
                return Some(candidate);
            }
            day += Duration::days(1);
        }
        None
    }
}

/// Convert "HH:MM" (UTC) into an EventBridge cron expression.
///
/// ```
/// use drip_scheduler::create_cron_expression;
/// assert_eq!(create_cron_expression("09:30", true).unwrap(), "cron(30 9 * * ? *)");
/// assert_eq!(create_cron_expression("09:30", false).unwrap(), "cron(30 9 ? * MON-FRI *)");
/// ```
pub fn create_cron_expression(time: &str, include_weekends: bool) -> Result<String> {
    Schedule::daily(time, include_weekends).map(|s| s.cron_expression())
}

fn parse_time(time: &str) -> Result<(u32, u32)> {
    let invalid = || ScheduleError::InvalidTime(time.to_string());

    let (h, m) = time.trim().split_once(':').ok_or_else(invalid)?;
    let digits = |s: &str| !s.is_empty() && s.len() <= 2 && s.bytes().all(|b| b.is_ascii_digit());
    if !digits(h) || m.len() != 2 || !digits(m) {
        return Err(invalid());
    }

    let hour: u32 = h.parse().map_err(|_| invalid())?;
    let minute: u32 = m.parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok((hour, minute))
}

fn is_weekend(day: Weekday) -> bool {
    matches!(day, Weekday::Sat | Weekday::Sun)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cron_with_weekends() {
        assert_eq!(
            create_cron_expression("09:30", true).unwrap(),
            "cron(30 9 * * ? *)"
        );
        assert_eq!(
            create_cron_expression("00:00", true).unwrap(),
            "cron(0 0 * * ? *)"
        );
    }

    #[test]
    fn cron_weekdays_only() {
        assert_eq!(
            create_cron_expression("09:30", false).unwrap(),
            "cron(30 9 ? * MON-FRI *)"
        );
        assert_eq!(
            create_cron_expression("23:05", false).unwrap(),
            "cron(5 23 ? * MON-FRI *)"
        );
    }

    #[test]
    fn malformed_times_are_rejected() {
        for bad in ["", "9", "24:00", "12:60", "12:5", "ab:cd", "12:30:00", "-1:30"] {
            assert!(
                matches!(create_cron_expression(bad, true), Err(ScheduleError::InvalidTime(_))),
                "{bad:?} should be rejected"
            );
        }
        assert!(create_cron_expression("7:45", true).is_ok());
    }

    #[test]
    fn next_run_later_today() {
        let s = Schedule::daily("14:00", true).unwrap();
        let from = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();
        assert_eq!(
            s.next_run(from),
            Some(Utc.with_ymd_and_hms(2026, 3, 10, 14, 0, 0).unwrap())
        );
    }

    #[test]
    fn next_run_exact_time_moves_to_tomorrow() {
        let s = Schedule::daily("09:00", true).unwrap();
        let from = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();
        assert_eq!(
            s.next_run(from),
            Some(Utc.with_ymd_and_hms(2026, 3, 11, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn out_of_range_fields_have_no_next_run() {
        let s = Schedule {
            hour: 25,
            minute: 0,
            weekends: true,
        };
        assert_eq!(s.next_run(Utc::now()), None);
    }

    #[test]
    fn next_run_skips_weekend_when_excluded() {
        // 2026-03-13 is a Friday.
        let from = Utc.with_ymd_and_hms(2026, 3, 13, 10, 0, 0).unwrap();
        let weekdays = Schedule::daily("09:00", false).unwrap();
        assert_eq!(
            weekdays.next_run(from),
            Some(Utc.with_ymd_and_hms(2026, 3, 16, 9, 0, 0).unwrap())
        );
        let every_day = Schedule::daily("09:00", true).unwrap();
        assert_eq!(
            every_day.next_run(from),
            Some(Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap())
        );
    }
}
