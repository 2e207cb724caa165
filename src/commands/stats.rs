use anyhow::Result;
use chrono::Utc;

use trackdash::models::IssueFilter;
use trackdash::stats::{summarize, ProjectStats};
use trackdash::IssueStore;

pub fn run<S: IssueStore + ?Sized>(store: &S, filter: &IssueFilter, json: bool) -> Result<()> {
    let issues = store.fetch(filter)?;
    let stats = summarize(&issues, Utc::now().date_naive());

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("{}", render(&stats));
    }
    Ok(())
}

pub fn render(stats: &ProjectStats) -> String {
    let mut out = format!(
        "Issues: {} total, {} open, {} closed ({:.0}% done), {} overdue",
        stats.total,
        stats.open,
        stats.closed,
        stats.completion_percent(),
        stats.overdue
    );

    if !stats.by_priority.is_empty() {
        out.push_str("\nBy priority:");
        for (name, count) in &stats.by_priority {
            out.push_str(&format!("\n  {:<12} {}", name, count));
        }
    }
    if !stats.by_assignee.is_empty() {
        out.push_str("\nBy assignee:");
        for (name, count) in &stats.by_assignee {
            out.push_str(&format!("\n  {:<12} {}", name, count));
        }
    }
    out
}
