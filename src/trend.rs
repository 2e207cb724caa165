//! Open/closed trend over a rolling window of days.
//!
//! Trackers only report current state, so history is rebuilt from `created_at` and the best
//! available closure time. An issue that was reopened and closed again is indistinguishable from
//! one closed once, at its latest closure.

use chrono::{DateTime, Days, Duration, NaiveDate, NaiveTime, Utc};

use crate::models::{DailySnapshot, Issue};

pub const DEFAULT_WINDOW_DAYS: u32 = 30;
/// Longest window the dashboard accepts from config or the command line, about ten years.
pub const MAX_WINDOW_DAYS: u32 = 3660;

enum DayState {
    Absent,
    Open,
    Closed,
}

/// UTC span of one calendar day: `(start, end]` with `end` the last instant before the next day.
fn day_bounds(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day.and_time(NaiveTime::MIN).and_utc();
    let end = start
        .checked_add_signed(Duration::days(1))
        .map_or(DateTime::<Utc>::MAX_UTC, |next| next - Duration::nanoseconds(1));
    (start, end)
}

fn state_on(issue: &Issue, start: DateTime<Utc>, end: DateTime<Utc>) -> DayState {
    if issue.created_at > end {
        return DayState::Absent;
    }

    match issue.effective_closed_at() {
        None => DayState::Open,
        Some(closed) if closed <= start => DayState::Absent,
        Some(closed) if closed > end => DayState::Open,
        Some(_) => DayState::Closed,
    }
}

/// Per-day counts for the `window_days` days ending on `today`, oldest first.
///
/// A window reaching back past the earliest representable date starts at that date instead.
pub fn reconstruct_time_series(
    issues: &[Issue],
    window_days: u32,
    today: NaiveDate,
) -> Vec<DailySnapshot> {
    if window_days == 0 {
        return Vec::new();
    }
    let first = today
        .checked_sub_days(Days::new(u64::from(window_days - 1)))
        .unwrap_or(NaiveDate::MIN);
    let len = (today - first).num_days() as usize + 1;
    let mut series = Vec::with_capacity(len);

    for date in first.iter_days().take(len) {
        let (start, end) = day_bounds(date);

        let mut snapshot = DailySnapshot {
            date,
            open_count: 0,
            closed_count: 0,
        };
        for issue in issues {
            match state_on(issue, start, end) {
                DayState::Open => snapshot.open_count += 1,
                DayState::Closed => snapshot.closed_count += 1,
                DayState::Absent => {}
            }
        }
        series.push(snapshot);
    }

    series
}

/// Same as [`reconstruct_time_series`], with the window ending on the current UTC date.
pub fn reconstruct_time_series_now(issues: &[Issue], window_days: u32) -> Vec<DailySnapshot> {
    reconstruct_time_series(issues, window_days, Utc::now().date_naive())
}
