//! Bar layout for issues with start and/or due dates.

use chrono::NaiveDate;

use crate::models::{Issue, TimelineBar};

/// Lay out every dated issue against `[view_start, view_end]`, in snapshot order.
///
/// Positions are fractions of the viewport. A missing start falls back to `view_start` and a
/// missing due date to one day after the start. Bars never run past the right edge, but an issue
/// starting after `view_end` gets `left >= 1`; use [`TimelineBar::is_visible`] to cull those.
pub fn layout_timeline(
    issues: &[Issue],
    view_start: NaiveDate,
    view_end: NaiveDate,
) -> Vec<TimelineBar> {
    let total_days = (view_end - view_start).num_days().max(1) as f64;

    issues
        .iter()
        .filter(|issue| issue.has_schedule())
        .map(|issue| {
            let start = issue.start_date.unwrap_or(view_start);
            let end = issue.due_date.unwrap_or_else(|| start.succ_opt().unwrap_or(start));

            let days_from_view_start = (start - view_start).num_days().max(0) as f64;
            let duration_days = (end - start).num_days().max(1) as f64;

            let left = days_from_view_start / total_days;
            let width = (duration_days / total_days).min(1.0 - left).max(0.0);

            TimelineBar {
                issue_id: issue.id,
                left,
                width,
            }
        })
        .collect()
}
