//! Formatting utilities

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Format a duration in human-readable form
pub fn duration(d: Duration) -> String {
    let seconds = d.as_secs();
    if seconds < 60 {
        if seconds == 0 && d.as_millis() > 0 {
            format!("{}ms", d.as_millis())
        } else {
            format!("{}s", seconds)
        }
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

/// Format a timestamp as relative (e.g., "2m ago")
pub fn relative_time(dt: DateTime<Utc>) -> String {
    relative_to(dt, Utc::now())
}

fn relative_to(dt: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now.signed_duration_since(dt);

    if diff.num_seconds() < 60 {
        format!("{}s ago", diff.num_seconds().max(0))
    } else if diff.num_minutes() < 60 {
        format!("{}m ago", diff.num_minutes())
    } else if diff.num_hours() < 24 {
        format!("{}h ago", diff.num_hours())
    } else {
        format!("{}d ago", diff.num_days())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration() {
        assert_eq!(duration(Duration::from_millis(250)), "250ms");
        assert_eq!(duration(Duration::from_secs(2)), "2s");
        assert_eq!(duration(Duration::from_secs(60)), "1m 0s");
        assert_eq!(duration(Duration::from_secs(3725)), "1h 2m");
    }

    #[test]
    fn test_relative_time() {
        let now = Utc::now();
        assert_eq!(relative_to(now - chrono::Duration::seconds(5), now), "5s ago");
        assert_eq!(relative_to(now - chrono::Duration::minutes(3), now), "3m ago");
        assert_eq!(relative_to(now - chrono::Duration::hours(2), now), "2h ago");
        assert_eq!(relative_to(now + chrono::Duration::seconds(2), now), "0s ago");
    }
}
