pub mod bulk_create;
pub mod bulk_edit;
pub mod create;
pub mod delete;
pub mod init;
pub mod list;
pub mod project;
pub mod show;
pub mod stats;
pub mod timeline;
pub mod trend;
pub mod user;

use anyhow::Result;
use chrono::Utc;
use std::io::{self, Write};

use trackdash::models::{BatchResult, IssueFilter};
use trackdash::stats::summarize;
use trackdash::IssueStore;

/// Progress line on stderr, overwritten in place.
pub fn report_progress(done: usize, total: usize) {
    let mut stderr = io::stderr().lock();
    let _ = write!(stderr, "\r[{}/{}]", done, total);
    if done == total {
        let _ = writeln!(stderr);
    }
    let _ = stderr.flush();
}

/// Human summary of a batch, one line per failure in submission order.
pub fn render_batch<R>(result: &BatchResult<R>, label: impl Fn(&R) -> String) -> String {
    let mut out = format!(
        "{} succeeded, {} failed",
        result.succeeded.len(),
        result.failed.len()
    );
    for failure in &result.failed {
        out.push_str(&format!("\n  {}: {}", label(&failure.record), failure.reason));
    }
    out
}

/// Re-fetch once after a batch that changed something and print the refreshed numbers.
pub fn refresh_after_batch<S, R>(store: &S, result: &BatchResult<R>, filter: &IssueFilter) -> Result<()>
where
    S: IssueStore + ?Sized,
{
    if !result.needs_refresh() {
        return Ok(());
    }
    let issues = store.fetch(filter)?;
    let stats = summarize(&issues, Utc::now().date_naive());
    println!();
    println!("{}", stats::render(&stats));
    Ok(())
}

pub fn truncate(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars - 3).collect();
        format!("{}...", truncated)
    }
}
