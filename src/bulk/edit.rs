use tracing::info;

use super::run_sequential;
use crate::error::BulkError;
use crate::models::{BatchResult, IssueRef, UpdatePayload};
use crate::store::IssueStore;

/// Apply `payload` to every selected issue, one update at a time.
///
/// Duplicate ids are collapsed, keeping the first occurrence. Failures are reported per id.
pub fn run_bulk_edit<S: IssueStore + ?Sized>(
    store: &S,
    issue_ids: &[i64],
    payload: &UpdatePayload,
) -> Result<BatchResult<i64>, BulkError<i64>> {
    run_bulk_edit_with_progress(store, issue_ids, payload, |_, _| {})
}

pub fn run_bulk_edit_with_progress<S, P>(
    store: &S,
    issue_ids: &[i64],
    payload: &UpdatePayload,
    progress: P,
) -> Result<BatchResult<i64>, BulkError<i64>>
where
    S: IssueStore + ?Sized,
    P: FnMut(usize, usize),
{
    if payload.is_empty() {
        return Err(BulkError::EmptyPayload);
    }

    let mut ids: Vec<i64> = Vec::with_capacity(issue_ids.len());
    for id in issue_ids {
        if !ids.contains(id) {
            ids.push(*id);
        }
    }
    if ids.is_empty() {
        return Err(BulkError::NoIssuesSelected);
    }

    info!(
        count = ids.len(),
        fields = ?payload.applied_fields(),
        "starting bulk edit"
    );
    run_sequential(
        ids,
        |id| {
            store
                .update(*id, payload)
                .map(|()| IssueRef { id: *id, subject: None })
        },
        progress,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{Assignment, BulkRecord, IssueFilter};
    use crate::testing::{open_issue, ts, ScriptedStore};
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn setup_test_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(&db_path).unwrap();
        (db, dir)
    }

    #[test]
    fn test_empty_payload_makes_no_calls() {
        let store = ScriptedStore::new();
        let err = run_bulk_edit(&store, &[1, 2], &UpdatePayload::default()).unwrap_err();
        assert!(matches!(err, BulkError::EmptyPayload));
        assert!(store.calls.borrow().is_empty());
    }

    #[test]
    fn test_no_selection_rejected() {
        let store = ScriptedStore::new();
        let payload = UpdatePayload::default().with_status(5);
        let err = run_bulk_edit(&store, &[], &payload).unwrap_err();
        assert!(matches!(err, BulkError::NoIssuesSelected));
    }

    #[test]
    fn test_missing_issue_isolated() {
        let store = ScriptedStore::new()
            .with_issue(open_issue(1, ts(2024, 1, 1, 0)))
            .with_issue(open_issue(3, ts(2024, 1, 1, 0)))
            .missing(2);
        let payload = UpdatePayload::default().with_priority(4);
        let result = run_bulk_edit(&store, &[1, 2, 3], &payload).unwrap();

        assert_eq!(result.succeeded.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].record, 2);
        assert_eq!(result.failed[0].reason, "Issue #2 not found");
        assert!(store.issues.borrow().iter().all(|i| i.priority_id == 4));
    }

    #[test]
    fn test_duplicate_ids_collapsed() {
        let store = ScriptedStore::new();
        let payload = UpdatePayload::default().with_status(2);
        let result = run_bulk_edit(&store, &[4, 4, 5, 4], &payload).unwrap();
        assert_eq!(result.total(), 2);
        assert_eq!(*store.calls.borrow(), vec!["update 4", "update 5"]);
    }

    #[test]
    fn test_unassign_against_database() {
        let (db, _dir) = setup_test_db();
        let project = db.create_project("ops", "Operations").unwrap();
        let user = db.create_user("Mira").unwrap();
        let mut ids = Vec::new();
        for subject in ["Rotate keys", "Patch hosts"] {
            let mut record = BulkRecord::new(subject, project);
            record.extra.insert("assigned_to_id".into(), user.into());
            ids.push(db.create(&record).unwrap().id);
        }

        let payload = UpdatePayload::default().unassign();
        assert_eq!(payload.assignee, Some(Assignment::Unassign));
        let result = run_bulk_edit(&db, &ids, &payload).unwrap();
        assert!(result.is_clean());

        let issues = db.fetch(&IssueFilter::project(project)).unwrap();
        assert!(issues.iter().all(|i| i.assignee.is_none()));
    }

    #[test]
    fn test_status_only_leaves_assignee() {
        let (db, _dir) = setup_test_db();
        let project = db.create_project("ops", "Operations").unwrap();
        let user = db.create_user("Mira").unwrap();
        let mut record = BulkRecord::new("Rotate keys", project);
        record.extra.insert("assigned_to_id".into(), user.into());
        let id = db.create(&record).unwrap().id;

        run_bulk_edit(&db, &[id], &UpdatePayload::default().with_status(2)).unwrap();

        let issue = db.get_issue(id).unwrap().unwrap();
        assert_eq!(issue.status, "In Progress");
        assert_eq!(issue.assignee.map(|a| a.name), Some("Mira".to_string()));
    }

    #[test]
    fn test_invalid_status_is_per_record() {
        let (db, _dir) = setup_test_db();
        let project = db.create_project("ops", "Operations").unwrap();
        let id = db.create(&BulkRecord::new("Rotate keys", project)).unwrap().id;

        let result = run_bulk_edit(&db, &[id, 9999], &UpdatePayload::default().with_status(77)).unwrap();
        assert_eq!(result.failed.len(), 2);
        assert!(result.failed[0].reason.contains("Status"));
        assert!(result.failed[1].reason.contains("not found"));
    }

    proptest! {
        #[test]
        fn prop_every_id_has_one_outcome(
            ids in proptest::collection::vec(1i64..40, 1..30),
            missing in proptest::collection::hash_set(1i64..40, 0..20),
        ) {
            let mut store = ScriptedStore::new();
            for id in &missing {
                store = store.missing(*id);
            }
            let payload = UpdatePayload::default().with_priority(3);
            let result = run_bulk_edit(&store, &ids, &payload).unwrap();

            let mut unique = ids.clone();
            unique.sort_unstable();
            unique.dedup();
            prop_assert_eq!(result.total(), unique.len());
            prop_assert!(result.failed.iter().all(|f| missing.contains(&f.record)));
            prop_assert!(result.succeeded.iter().all(|r| !missing.contains(&r.id)));
        }
    }
}
