use anyhow::Result;

use super::truncate;
use trackdash::models::{Issue, IssueFilter};
use trackdash::IssueStore;

pub fn run<S: IssueStore + ?Sized>(store: &S, filter: &IssueFilter) -> Result<()> {
    let issues = store.fetch(filter)?;

    if issues.is_empty() {
        println!("No issues found.");
        return Ok(());
    }

    for issue in &issues {
        println!("{}", format_row(issue));
    }

    Ok(())
}

fn format_row(issue: &Issue) -> String {
    let status_display = format!("[{}]", issue.status);
    let assignee = issue.assignee.as_ref().map_or("-", |a| a.name.as_str());
    let due = issue
        .due_date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    format!(
        "#{:<4} {:13} {:<40} {:9} {:<12} {}",
        issue.id,
        status_display,
        truncate(&issue.subject, 40),
        issue.priority,
        truncate(assignee, 12),
        due
    )
}
