use anyhow::{bail, Context, Result};
use std::fs;
use std::io::{self, Read};
use std::path::Path;

use super::{refresh_after_batch, render_batch, report_progress};
use trackdash::bulk::BulkCreate;
use trackdash::error::BulkError;
use trackdash::models::{BulkRecord, IssueFilter};
use trackdash::IssueStore;

/// Read bulk input from `input` or stdin, create every record in `project_id`, and optionally
/// write the failures to `failed_out` in the same format for a retry.
pub fn run<S: IssueStore + ?Sized>(
    store: &S,
    project_id: i64,
    input: Option<&Path>,
    failed_out: Option<&Path>,
) -> Result<()> {
    let raw = match input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut raw = String::new();
            io::stdin()
                .read_to_string(&mut raw)
                .context("Failed to read bulk input from stdin")?;
            raw
        }
    };

    let mut session = BulkCreate::with_input(project_id, raw);
    let count = session.parse()?;
    eprintln!("Creating {} issues in project #{}", count, project_id);

    let result = match session.submit_with_progress(store, report_progress) {
        Ok(result) => result,
        Err(BulkError::Aborted {
            processed,
            total,
            source,
            ..
        }) => {
            eprintln!();
            if let Some(completed) = session.result() {
                println!("{}", render_batch(completed, describe));
            }
            write_failed(&session, failed_out)?;
            bail!(
                "Stopped after {} of {} records: {}",
                processed,
                total,
                source
            );
        }
        Err(other) => return Err(other.into()),
    };

    println!("{}", render_batch(&result, describe));
    write_failed(&session, failed_out)?;
    refresh_after_batch(store, &result, &IssueFilter::project(project_id))?;

    Ok(())
}

fn describe(record: &BulkRecord) -> String {
    format!("\"{}\"", record.subject)
}

fn write_failed(session: &BulkCreate, failed_out: Option<&Path>) -> Result<()> {
    let (Some(path), Some(json)) = (failed_out, session.export_failed()) else {
        return Ok(());
    };
    fs::write(path, json).context("Failed to write failed records")?;
    let count = session.result().map_or(0, |r| r.failed.len());
    eprintln!("Wrote {} failed records to {}", count, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use std::cell::Cell;
    use trackdash::bulk::parse_bulk_input;
    use trackdash::db::Database;
    use trackdash::models::{Issue, UpdatePayload};
    use trackdash::StoreError;

    fn setup_test_db() -> (Database, tempfile::TempDir, i64) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(&db_path).unwrap();
        let project = db.create_project("core", "Core").unwrap();
        (db, dir, project)
    }

    struct DroppingStore<'a> {
        db: &'a Database,
        calls: Cell<usize>,
    }

    impl IssueStore for DroppingStore<'_> {
        fn fetch(&self, filter: &IssueFilter) -> Result<Vec<Issue>, StoreError> {
            self.db.fetch(filter)
        }

        fn create(&self, record: &BulkRecord) -> Result<Issue, StoreError> {
            self.calls.set(self.calls.get() + 1);
            if self.calls.get() > 1 {
                return Err(StoreError::Decode("truncated response".to_string()));
            }
            self.db.create(record)
        }

        fn update(&self, id: i64, payload: &UpdatePayload) -> Result<(), StoreError> {
            self.db.update(id, payload)
        }

        fn delete(&self, id: i64) -> Result<(), StoreError> {
            self.db.delete(id)
        }
    }

    // ==================== Unit Tests ====================

    #[test]
    fn test_bulk_create_from_file() {
        let (db, dir, project) = setup_test_db();
        let input = dir.path().join("issues.json");
        fs::write(
            &input,
            r#"[{"subject": "One"}, {"subject": "Two", "priority_id": 3}]"#,
        )
        .unwrap();

        run(&db, project, Some(&input), None).unwrap();
        let issues = db.fetch(&IssueFilter::project(project)).unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[1].priority, "High");
    }

    #[test]
    fn test_failed_records_written_for_retry() {
        let (db, dir, project) = setup_test_db();
        let input = dir.path().join("issues.csv");
        let failed = dir.path().join("failed.json");
        fs::write(&input, "Good row\nBad status,,1,99\nAlso good\n").unwrap();

        run(&db, project, Some(&input), Some(&failed)).unwrap();

        let exported = fs::read_to_string(&failed).unwrap();
        let retry = parse_bulk_input(&exported, project).unwrap();
        assert_eq!(retry.len(), 1);
        assert_eq!(retry[0].subject, "Bad status");
        assert_eq!(retry[0].status_id, 99);
    }

    #[test]
    fn test_aborted_run_exports_unapplied_records() {
        let (db, dir, project) = setup_test_db();
        let input = dir.path().join("issues.csv");
        let failed = dir.path().join("failed.json");
        fs::write(&input, "First\nSecond\nThird\n").unwrap();

        // Every create after the first gets an undecodable response.
        let store = DroppingStore { db: &db, calls: Cell::new(0) };
        let err = run(&store, project, Some(&input), Some(&failed)).unwrap_err();
        assert!(err.to_string().contains("Stopped after 1 of 3"));

        let retry = parse_bulk_input(&fs::read_to_string(&failed).unwrap(), project).unwrap();
        let subjects: Vec<&str> = retry.iter().map(|r| r.subject.as_str()).collect();
        assert_eq!(subjects, vec!["Second", "Third"]);
    }

    #[test]
    fn test_clean_run_writes_nothing() {
        let (db, dir, project) = setup_test_db();
        let input = dir.path().join("issues.csv");
        let failed = dir.path().join("failed.json");
        fs::write(&input, "Only row\n").unwrap();

        run(&db, project, Some(&input), Some(&failed)).unwrap();
        assert!(!failed.exists());
    }

    #[test]
    fn test_parse_error_creates_nothing() {
        let (db, dir, project) = setup_test_db();
        let input = dir.path().join("issues.csv");
        fs::write(&input, "fine\n,no subject\n").unwrap();

        let err = run(&db, project, Some(&input), None).unwrap_err();
        assert!(err.to_string().contains("Record 2"));
        assert!(db.fetch(&IssueFilter::project(project)).unwrap().is_empty());
    }

    #[test]
    fn test_missing_input_file() {
        let (db, dir, project) = setup_test_db();
        let result = run(&db, project, Some(&dir.path().join("nope.json")), None);
        assert!(result.is_err());
    }
}
