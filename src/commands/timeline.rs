use anyhow::{bail, Result};
use chrono::NaiveDate;
use std::collections::HashMap;

use super::truncate;
use trackdash::models::{Issue, IssueFilter, TimelineBar};
use trackdash::timeline::layout_timeline;
use trackdash::IssueStore;

const CHART_COLUMNS: usize = 60;

pub fn run<S: IssueStore + ?Sized>(
    store: &S,
    filter: &IssueFilter,
    from: NaiveDate,
    to: NaiveDate,
    json: bool,
) -> Result<()> {
    if to <= from {
        bail!("--to ({}) must be after --from ({})", to, from);
    }

    let issues = store.fetch(filter)?;
    let bars = layout_timeline(&issues, from, to);

    if json {
        println!("{}", serde_json::to_string_pretty(&bars)?);
        return Ok(());
    }

    if bars.is_empty() {
        println!("No scheduled issues.");
        return Ok(());
    }
    println!("{} .. {}", from, to);
    print!("{}", render(&issues, &bars));
    Ok(())
}

pub fn render(issues: &[Issue], bars: &[TimelineBar]) -> String {
    let subjects: HashMap<i64, &str> = issues.iter().map(|i| (i.id, i.subject.as_str())).collect();

    let mut out = String::new();
    for bar in bars.iter().filter(|b| b.is_visible()) {
        // Visible bars have left < 1, so start is at most CHART_COLUMNS - 1.
        let start = ((bar.left * CHART_COLUMNS as f64).floor() as usize).min(CHART_COLUMNS - 1);
        let len = ((bar.width * CHART_COLUMNS as f64).round() as usize)
            .max(1)
            .min(CHART_COLUMNS - start);
        let subject = subjects.get(&bar.issue_id).copied().unwrap_or("");

        out.push_str(&format!(
            "#{:<4} {:<24} |{}{}{}|\n",
            bar.issue_id,
            truncate(subject, 24),
            " ".repeat(start),
            "=".repeat(len),
            " ".repeat(CHART_COLUMNS - start - len)
        ));
    }
    out
}
