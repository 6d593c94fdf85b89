//! Small text helpers shared by the email templates.

use chrono::{DateTime, Datelike, Utc};

/// Fallback when a churned owner's dates are missing.
pub const A_WHILE_BACK: &str = "a while back";

/// Coarse, friendly phrasing of when something happened relative to `now`.
///
/// Same month: "a few weeks ago". Same year: "back in Jan".
/// Otherwise: "back in Jan 2024".
pub fn format_relative_time(ts: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(ts) = ts else {
        return A_WHILE_BACK.to_string();
    };
    if ts.year() == now.year() && ts.month() == now.month() {
        "a few weeks ago".to_string()
    } else if ts.year() == now.year() {
        format!("back in {}", ts.format("%b"))
    } else {
        format!("back in {}", ts.format("%b %Y"))
    }
}

/// "Hi Ada," or "Hi there," when no first name is known.
pub fn greeting(first_name: Option<&str>) -> String {
    match first_name.map(str::trim) {
        Some(name) if !name.is_empty() => format!("Hi {name},"),
        _ => "Hi there,".to_string(),
    }
}

/// Whole-number percentage, e.g. "57%".
pub fn format_pct(pct: f64) -> String {
    format!("{}%", pct.round() as i64)
}

pub fn plural<'a>(n: usize, one: &'a str, many: &'a str) -> &'a str {
    if n == 1 {
        one
    } else {
        many
    }
}
