// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
///
/// Devices parse `serverTime` with a small fixed-format parser, so the
/// output never carries fractional seconds.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Clamp a requested history window to `1..=max_days`, defaulting when absent.
pub fn history_window_days(requested: Option<u32>, default_days: u32, max_days: u32) -> u32 {
    requested.unwrap_or(default_days).clamp(1, max_days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_drops_subseconds() {
        let date = Utc.with_ymd_and_hms(2026, 3, 1, 7, 30, 5).unwrap()
            + chrono::Duration::milliseconds(250);
        assert_eq!(format_utc_rfc3339(date), "2026-03-01T07:30:05Z");
    }

    #[test]
    fn test_history_window() {
        assert_eq!(history_window_days(None, 7, 90), 7);
        assert_eq!(history_window_days(Some(0), 7, 90), 1);
        assert_eq!(history_window_days(Some(365), 7, 90), 90);
    }
}
