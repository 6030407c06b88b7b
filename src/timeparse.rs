//! Relative time labels ("3小時前", "2 days ago", "昨天") to absolute instants.
//!
//! Resolution is coarse. It only feeds the scroll stopping
//! heuristic; whether an article is kept is decided later from the exact
//! timestamp on its own page.
//!
//! The resolver never reads the clock. Callers pass the run's anchor
//! instant so that every label resolved during one run agrees with every
//! other, however long the run takes.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static RELATIVE_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(\d+)\s*(天|日|days?|小時|小时|hours?|hrs?|分鐘|分钟|minutes?|mins?)\s*(?:前|ago)",
    )
    .unwrap()
});

static YESTERDAY_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)昨天|\byesterday\b").unwrap());

/// Resolve a relative label against `now`.
///
/// # Arguments
///
/// * `label` - Feed text such as `"3小時前"`, `"15 minutes ago"` or `"昨天"`
/// * `now` - The run's anchor instant
///
/// # Returns
///
/// `now` minus the labelled amount, or `None` for anything outside the
/// recognized families (days, hours, minutes ago, and yesterday) and for
/// amounts too large to subtract.
///
/// # Examples
///
/// ```ignore
/// let now = Utc.with_ymd_and_hms(2025, 10, 16, 12, 0, 0).unwrap();
/// assert_eq!(resolve("3小時前", now), Some(now - Duration::hours(3)));
/// assert_eq!(resolve("Yesterday", now), Some(now - Duration::hours(24)));
/// assert_eq!(resolve("10:30", now), None);
/// ```
pub fn resolve(label: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let label = label.trim();

    if let Some(caps) = RELATIVE_LABEL.captures(label) {
        let amount: i64 = caps[1].parse().ok()?;
        let unit = caps[2].to_lowercase();
        let offset = match unit.as_str() {
            "天" | "日" | "day" | "days" => Duration::try_days(amount)?,
            "小時" | "小时" | "hour" | "hours" | "hr" | "hrs" => Duration::try_hours(amount)?,
            _ => Duration::try_minutes(amount)?,
        };
        return now.checked_sub_signed(offset);
    }

    if YESTERDAY_LABEL.is_match(label) {
        return now.checked_sub_signed(Duration::days(1));
    }

    None
}

/// Cheap pre-check used by the listing scan to skip spans that cannot be labels.
pub fn looks_relative(label: &str) -> bool {
    RELATIVE_LABEL.is_match(label) || YESTERDAY_LABEL.is_match(label)
}
