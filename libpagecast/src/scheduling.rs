//! Schedule time parsing and validation
//!
//! A schedule time must be strictly in the future and no further ahead than
//! the configured horizon. Times are accepted as RFC 3339 timestamps or as
//! relative humantime durations ("2h", "3days").

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::{PagecastError, Result};

/// Parse a schedule time relative to `now`
///
/// # Errors
///
/// Returns `InvalidScheduleTime` if the input is neither an RFC 3339
/// timestamp nor a duration.
pub fn parse_schedule_time(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(PagecastError::InvalidScheduleTime(
            "Schedule time cannot be empty".to_string(),
        ));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    let relative = input.strip_prefix("in ").unwrap_or(input);
    if let Ok(duration) = humantime::parse_duration(relative) {
        let offset = chrono::Duration::from_std(duration)
            .map_err(|_| PagecastError::InvalidScheduleTime("Duration out of range".to_string()))?;
        return now.checked_add_signed(offset).ok_or_else(|| {
            PagecastError::InvalidScheduleTime("Duration out of range".to_string())
        });
    }

    Err(PagecastError::InvalidScheduleTime(format!(
        "Could not parse schedule time: {}",
        input
    )))
}

/// Check a schedule timestamp (unix seconds) against `now` and the horizon
pub fn validate_schedule_time(scheduled_at: i64, now: i64, max_ahead: Duration) -> Result<()> {
    if scheduled_at <= now {
        return Err(PagecastError::InvalidScheduleTime(format!(
            "Scheduled time {} must be in the future",
            format_timestamp(scheduled_at)
        )));
    }

    let horizon = now.saturating_add(max_ahead.as_secs() as i64);
    if scheduled_at > horizon {
        return Err(PagecastError::InvalidScheduleTime(format!(
            "Scheduled time {} is more than {} ahead",
            format_timestamp(scheduled_at),
            humantime::format_duration(max_ahead)
        )));
    }

    Ok(())
}

/// RFC 3339 rendering of a unix timestamp
pub fn format_timestamp(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| timestamp.to_string())
}
