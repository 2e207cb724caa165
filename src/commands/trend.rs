use anyhow::Result;

use trackdash::config::check_days;
use trackdash::models::{DailySnapshot, IssueFilter};
use trackdash::trend::{reconstruct_time_series_now, MAX_WINDOW_DAYS};
use trackdash::IssueStore;

const BAR_WIDTH: u32 = 40;

pub fn run<S: IssueStore + ?Sized>(
    store: &S,
    filter: &IssueFilter,
    window_days: u32,
    json: bool,
) -> Result<()> {
    check_days("--days", window_days, MAX_WINDOW_DAYS)?;

    let issues = store.fetch(filter)?;
    let series = reconstruct_time_series_now(&issues, window_days);

    if json {
        println!("{}", serde_json::to_string_pretty(&series)?);
    } else {
        print!("{}", render(&series));
    }
    Ok(())
}

/// One line per day: date, open and closed counts, and a bar scaled to the busiest day.
pub fn render(series: &[DailySnapshot]) -> String {
    let peak = series
        .iter()
        .map(|s| s.open_count + s.closed_count)
        .max()
        .unwrap_or(0)
        .max(1);

    let mut out = String::new();
    for snapshot in series {
        let open = (snapshot.open_count * BAR_WIDTH).div_ceil(peak);
        let closed = (snapshot.closed_count * BAR_WIDTH).div_ceil(peak);
        out.push_str(&format!(
            "{} {:>5} open {:>5} closed  {}{}\n",
            snapshot.key(),
            snapshot.open_count,
            snapshot.closed_count,
            "#".repeat(open as usize),
            ".".repeat(closed as usize)
        ));
    }
    out
}
