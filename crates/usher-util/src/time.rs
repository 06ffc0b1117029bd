//! Time utilities for usherd
//!
//! Provides both monotonic time (for countdown and timeout enforcement) and
//! wall-clock time (for daily rule windows).
//!
//! # Mock Time for Development
//!
//! In debug builds, the `USHER_MOCK_TIME` environment variable can be set to
//! override the system time for all wall-clock-sensitive operations. This is
//! useful for testing daily windows without waiting for the right hour.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 14:30:00`)

use chrono::{DateTime, Local, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "USHER_MOCK_TIME";

/// Cached mock time offset from the real time when the process started.
/// This allows mock time to advance naturally.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                if let Ok(naive_dt) =
                    NaiveDateTime::parse_from_str(&mock_time_str, "%Y-%m-%d %H:%M:%S")
                {
                    if let Some(mock_dt) = Local.from_local_datetime(&naive_dt).single() {
                        let real_now = chrono::Local::now();
                        let offset = mock_dt.signed_duration_since(real_now);
                        tracing::info!(
                            mock_time = %mock_time_str,
                            offset_secs = offset.num_seconds(),
                            "Mock time enabled"
                        );
                        return Some(offset);
                    } else {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            "Failed to convert mock time to local timezone"
                        );
                    }
                } else {
                    tracing::warn!(
                        mock_time = %mock_time_str,
                        expected_format = "%Y-%m-%d %H:%M:%S",
                        "Invalid mock time format"
                    );
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Get the current local time, respecting mock time settings in debug builds.
///
/// In release builds, this always returns the real system time.
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();

    if let Some(offset) = get_mock_time_offset() {
        real_now + offset
    } else {
        real_now
    }
}

/// Represents a point in monotonic time for countdown enforcement.
/// This is immune to wall-clock changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MonotonicInstant(Instant);

impl MonotonicInstant {
    pub fn now() -> Self {
        Self(Instant::now())
    }

    pub fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }

    pub fn duration_since(&self, earlier: MonotonicInstant) -> Duration {
        self.0.duration_since(earlier.0)
    }

    pub fn checked_add(&self, duration: Duration) -> Option<MonotonicInstant> {
        self.0.checked_add(duration).map(MonotonicInstant)
    }

    /// Returns duration until `self`, or zero if `self` is in the past
    pub fn saturating_duration_until(&self, from: MonotonicInstant) -> Duration {
        if self.0 > from.0 {
            self.0.duration_since(from.0)
        } else {
            Duration::ZERO
        }
    }
}

impl std::ops::Add<Duration> for MonotonicInstant {
    type Output = MonotonicInstant;

    fn add(self, rhs: Duration) -> Self::Output {
        MonotonicInstant(self.0 + rhs)
    }
}

/// Wall-clock time of day for daily windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallClock {
    pub hour: u8,
    pub minute: u8,
}

impl WallClock {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    pub fn from_naive_time(time: NaiveTime) -> Self {
        Self {
            hour: time.hour() as u8,
            minute: time.minute() as u8,
        }
    }

    /// Returns seconds since midnight
    pub fn as_seconds_from_midnight(&self) -> u32 {
        (self.hour as u32) * 3600 + (self.minute as u32) * 60
    }
}

impl PartialOrd for WallClock {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WallClock {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_seconds_from_midnight()
            .cmp(&other.as_seconds_from_midnight())
    }
}

impl std::fmt::Display for WallClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// A daily time window during which a rule is enforced.
///
/// The start is inclusive and the end is exclusive. A window whose end is
/// earlier than its start crosses midnight (e.g. 22:00 - 02:00).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyWindow {
    pub start: WallClock,
    pub end: WallClock,
}

impl DailyWindow {
    pub fn new(start: WallClock, end: WallClock) -> Self {
        Self { start, end }
    }

    /// Check if the given local datetime falls within this window
    pub fn contains(&self, dt: &DateTime<Local>) -> bool {
        let time = WallClock::from_naive_time(dt.time());

        if self.start <= self.end {
            time >= self.start && time < self.end
        } else {
            // Window crosses midnight (e.g., 22:00 - 02:00)
            time >= self.start || time < self.end
        }
    }

    /// Calculate duration remaining in this window from the given time
    pub fn remaining_duration(&self, dt: &DateTime<Local>) -> Option<Duration> {
        if !self.contains(dt) {
            return None;
        }

        let now_time = WallClock::from_naive_time(dt.time());
        let now_secs = now_time.as_seconds_from_midnight();
        let end_secs = self.end.as_seconds_from_midnight();

        let remaining_secs = if self.start <= self.end {
            end_secs.saturating_sub(now_secs)
        } else if now_secs >= self.start.as_seconds_from_midnight() {
            // Evening portion of a cross-midnight window
            (86400 - now_secs) + end_secs
        } else {
            // Morning portion
            end_secs.saturating_sub(now_secs)
        };

        Some(Duration::from_secs(remaining_secs as u64))
    }
}

/// Helper to format durations in human-readable form
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_wall_clock_ordering() {
        let morning = WallClock::new(8, 0).unwrap();
        let noon = WallClock::new(12, 0).unwrap();
        let evening = WallClock::new(18, 30).unwrap();

        assert!(morning < noon);
        assert!(noon < evening);
        assert!(morning < evening);
    }

    #[test]
    fn test_wall_clock_bounds() {
        assert!(WallClock::new(24, 0).is_none());
        assert!(WallClock::new(12, 60).is_none());
        assert!(WallClock::new(23, 59).is_some());
    }

    #[test]
    fn test_daily_window_contains() {
        let window = DailyWindow::new(
            WallClock::new(14, 0).unwrap(), // 2 PM
            WallClock::new(18, 0).unwrap(), // 6 PM
        );

        let dt = Local.with_ymd_and_hms(2025, 12, 29, 15, 0, 0).unwrap();
        assert!(window.contains(&dt));

        let dt = Local.with_ymd_and_hms(2025, 12, 29, 10, 0, 0).unwrap();
        assert!(!window.contains(&dt));

        // Start is inclusive, end is exclusive
        let dt = Local.with_ymd_and_hms(2025, 12, 29, 14, 0, 0).unwrap();
        assert!(window.contains(&dt));
        let dt = Local.with_ymd_and_hms(2025, 12, 29, 18, 0, 0).unwrap();
        assert!(!window.contains(&dt));
    }

    #[test]
    fn test_daily_window_cross_midnight() {
        let window = DailyWindow::new(
            WallClock::new(22, 0).unwrap(),
            WallClock::new(2, 0).unwrap(),
        );

        let dt = Local.with_ymd_and_hms(2025, 12, 29, 23, 30, 0).unwrap();
        assert!(window.contains(&dt));

        let dt = Local.with_ymd_and_hms(2025, 12, 29, 1, 0, 0).unwrap();
        assert!(window.contains(&dt));

        let dt = Local.with_ymd_and_hms(2025, 12, 29, 12, 0, 0).unwrap();
        assert!(!window.contains(&dt));
    }

    #[test]
    fn test_daily_window_remaining() {
        let window = DailyWindow::new(
            WallClock::new(14, 0).unwrap(),
            WallClock::new(18, 0).unwrap(),
        );

        let dt = Local.with_ymd_and_hms(2025, 12, 26, 15, 0, 0).unwrap(); // 3 PM
        let remaining = window.remaining_duration(&dt).unwrap();
        assert_eq!(remaining, Duration::from_secs(3 * 3600)); // 3 hours

        let dt = Local.with_ymd_and_hms(2025, 12, 26, 10, 0, 0).unwrap();
        assert!(window.remaining_duration(&dt).is_none());
    }

    #[test]
    fn test_daily_window_remaining_cross_midnight() {
        let window = DailyWindow::new(
            WallClock::new(22, 0).unwrap(),
            WallClock::new(2, 0).unwrap(),
        );

        // 23:00 -> one hour to midnight plus two to close
        let dt = Local.with_ymd_and_hms(2025, 12, 26, 23, 0, 0).unwrap();
        let remaining = window.remaining_duration(&dt).unwrap();
        assert_eq!(remaining, Duration::from_secs(3 * 3600));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m 1s");
    }

    #[test]
    fn test_monotonic_instant() {
        let t1 = MonotonicInstant::now();
        std::thread::sleep(Duration::from_millis(10));
        let t2 = MonotonicInstant::now();

        assert!(t2 > t1);
        assert!(t2.duration_since(t1) >= Duration::from_millis(10));
    }

    #[test]
    fn test_saturating_duration_until() {
        let t1 = MonotonicInstant::now();
        let t2 = t1 + Duration::from_secs(10);

        assert_eq!(t2.saturating_duration_until(t1), Duration::from_secs(10));
        assert_eq!(t1.saturating_duration_until(t2), Duration::ZERO);
    }

    #[test]
    fn test_parse_mock_time_format() {
        let valid = "2025-12-25 14:30:00";
        assert!(NaiveDateTime::parse_from_str(valid, "%Y-%m-%d %H:%M:%S").is_ok());

        let invalid = ["2025-12-25", "14:30:00", "2025-12-25T14:30:00", ""];
        for s in &invalid {
            assert!(
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").is_err(),
                "Expected '{}' to fail parsing",
                s
            );
        }
    }

    #[test]
    fn test_mock_time_defaults_inactive() {
        // Without USHER_MOCK_TIME set before the first call, the cached
        // offset stays empty and now() tracks the real clock
        if std::env::var(MOCK_TIME_ENV_VAR).is_err() {
            assert!(!is_mock_time_active());
        }
    }

    #[test]
    fn test_now_consistency() {
        let t1 = now();
        std::thread::sleep(Duration::from_millis(50));
        let t2 = now();

        assert!(t2 > t1, "Time should advance forward");
    }
}
