// src/normalize/dates.rs
use chrono::{DateTime, Duration, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static RELATIVE_AGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+)\+?\s*(seconds?|secs?|minutes?|mins?|hours?|hrs?|days?|weeks?|wks?|months?|mos?|years?|yrs?)\b")
        .expect("relative age pattern is valid")
});

/// Posting time from the phrasings listing sites use ("3 days ago",
/// "Just posted", "30+ days ago", ISO dates in `datetime` attributes)
pub fn parse_posted(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(exact) = DateTime::parse_from_rfc3339(text) {
        return Some(exact.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|d| d.and_utc());
    }

    let lower = text.to_lowercase();
    if lower == "new"
        || ["just now", "just posted", "today", "moments ago"]
            .iter()
            .any(|p| lower.contains(p))
    {
        return Some(now);
    }
    if lower.contains("yesterday") {
        return now.checked_sub_signed(Duration::days(1));
    }

    let captures = RELATIVE_AGE.captures(&lower)?;
    let amount: i64 = captures.get(1)?.as_str().parse().ok()?;
    let unit = captures.get(2)?.as_str();
    // Ages come from third-party text; out-of-range values yield no date
    let age = match unit.chars().next()? {
        's' => Duration::try_seconds(amount),
        'h' => Duration::try_hours(amount),
        'd' => Duration::try_days(amount),
        'w' => Duration::try_weeks(amount),
        'y' => amount.checked_mul(365).and_then(Duration::try_days),
        'm' if unit.starts_with("mi") => Duration::try_minutes(amount),
        'm' => amount.checked_mul(30).and_then(Duration::try_days),
        _ => None,
    }?;
    now.checked_sub_signed(age)
}
