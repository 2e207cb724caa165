#![no_main]

//! Fuzz target for bulk creation against a scratch database.
//!
//! Every parsed record must end up in exactly one of the two partitions, and the database must
//! hold exactly the succeeded issues afterwards.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tempfile::tempdir;

use trackdash::bulk::run_bulk_create;
use trackdash::db::Database;
use trackdash::models::IssueFilter;
use trackdash::IssueStore;

#[derive(Arbitrary, Debug)]
struct BulkInput {
    /// Rows of `subject, description, tracker, status, priority`
    rows: Vec<(String, String, u8, u8, u8)>,
}

fuzz_target!(|input: BulkInput| {
    if input.rows.is_empty() || input.rows.len() > 30 {
        return;
    }

    let raw = input
        .rows
        .iter()
        .map(|(subject, description, tracker, status, priority)| {
            format!(
                "{},{},{},{},{}",
                subject.replace([',', '\n', '\r'], " "),
                description.replace([',', '\n', '\r'], " "),
                tracker % 5,
                status % 8,
                priority % 7
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let dir = match tempdir() {
        Ok(d) => d,
        Err(_) => return,
    };
    let db = match Database::open(&dir.path().join("issues.db")) {
        Ok(d) => d,
        Err(_) => return,
    };
    let project = match db.create_project("fuzz", "Fuzz") {
        Ok(id) => id,
        Err(_) => return,
    };

    let Ok(result) = run_bulk_create(&db, &raw, project) else {
        return;
    };

    // Every row carries commas, so none is skipped as blank.
    assert_eq!(result.total(), input.rows.len());

    let stored = db
        .fetch(&IssueFilter::project(project))
        .map(|issues| issues.len())
        .unwrap_or(0);
    assert_eq!(stored, result.succeeded.len());
});
