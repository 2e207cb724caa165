//! Sequential batch mutation with per-record failure isolation.
//!
//! Records are sent one at a time in input order, so results line up with the input and at most
//! one mutation is ever in flight against the tracker.

pub mod create;
pub mod edit;
pub mod parse;

pub use create::{export_failed, run_bulk_create, submit_records, BulkCreate, BulkState};
pub use edit::{run_bulk_edit, run_bulk_edit_with_progress};
pub use parse::parse_bulk_input;

use std::fmt;
use tracing::{debug, info, warn};

use crate::error::{BulkError, StoreError};
use crate::models::{BatchResult, Failure, IssueRef};

/// Fold `records` through `call`, partitioning outcomes.
///
/// Record-level store errors land in `failed` and the loop moves on. Any other error stops the
/// batch; the error carries everything completed before it and every record not yet applied.
pub(crate) fn run_sequential<R, F, P>(
    records: Vec<R>,
    mut call: F,
    mut progress: P,
) -> Result<BatchResult<R>, BulkError<R>>
where
    R: fmt::Debug,
    F: FnMut(&R) -> Result<IssueRef, StoreError>,
    P: FnMut(usize, usize),
{
    let total = records.len();
    let mut result = BatchResult::default();

    let mut pending = records.into_iter().enumerate();
    while let Some((index, record)) = pending.next() {
        match call(&record) {
            Ok(reference) => {
                debug!(position = index + 1, id = reference.id, "record applied");
                result.succeeded.push(reference);
            }
            Err(err) if err.is_record_level() => {
                warn!(position = index + 1, error = %err, "record failed");
                result.failed.push(Failure {
                    record,
                    reason: err.to_string(),
                });
            }
            Err(err) => {
                warn!(position = index + 1, error = %err, "batch aborted");
                let remaining = std::iter::once(record)
                    .chain(pending.map(|(_, rest)| rest))
                    .collect();
                return Err(BulkError::Aborted {
                    partial: result,
                    remaining,
                    processed: index,
                    total,
                    source: err,
                });
            }
        }
        progress(index + 1, total);
    }

    info!(
        succeeded = result.succeeded.len(),
        failed = result.failed.len(),
        "batch complete"
    );
    Ok(result)
}
