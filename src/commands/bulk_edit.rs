use anyhow::{bail, Result};

use super::{refresh_after_batch, render_batch, report_progress};
use trackdash::bulk::run_bulk_edit_with_progress;
use trackdash::error::BulkError;
use trackdash::models::{IssueFilter, UpdatePayload};
use trackdash::IssueStore;

/// Apply `payload` to every id, then refresh `scope` once if anything changed.
pub fn run<S: IssueStore + ?Sized>(
    store: &S,
    ids: &[i64],
    payload: &UpdatePayload,
    scope: &IssueFilter,
) -> Result<()> {
    eprintln!(
        "Updating {} on {} issues",
        payload.applied_fields().join(", "),
        ids.len()
    );

    let result = match run_bulk_edit_with_progress(store, ids, payload, report_progress) {
        Ok(result) => result,
        Err(BulkError::Aborted {
            partial,
            remaining,
            processed,
            total,
            source,
        }) => {
            eprintln!();
            println!("{}", render_batch(&partial, describe));
            println!("Not applied: {}", render_ids(&remaining));
            bail!("Stopped after {} of {} issues: {}", processed, total, source);
        }
        Err(other) => return Err(other.into()),
    };

    println!("{}", render_batch(&result, describe));
    refresh_after_batch(store, &result, scope)?;
    Ok(())
}

fn describe(id: &i64) -> String {
    format!("#{}", id)
}

fn render_ids(ids: &[i64]) -> String {
    ids.iter().map(describe).collect::<Vec<_>>().join(" ")
}
