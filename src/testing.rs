//! Shared fixtures for unit tests.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet};

use crate::error::StoreError;
use crate::models::{Assignee, BulkRecord, Issue, IssueFilter, UpdatePayload};
use crate::store::IssueStore;

pub fn ts(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn open_issue(id: i64, created_at: DateTime<Utc>) -> Issue {
    Issue {
        id,
        project_id: 1,
        tracker_id: 1,
        subject: format!("Issue {}", id),
        description: None,
        status_id: 1,
        status: "New".to_string(),
        priority_id: 2,
        priority: "Normal".to_string(),
        assignee: None,
        created_at,
        updated_at: created_at,
        closed_at: None,
        start_date: None,
        due_date: None,
        custom_fields: BTreeMap::new(),
    }
}

pub fn closed_issue(
    id: i64,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
) -> Issue {
    Issue {
        status_id: 5,
        status: "Closed".to_string(),
        updated_at,
        closed_at,
        ..open_issue(id, created_at)
    }
}

pub fn scheduled_issue(id: i64, start: Option<NaiveDate>, due: Option<NaiveDate>) -> Issue {
    Issue {
        start_date: start,
        due_date: due,
        ..open_issue(id, ts(2024, 1, 1, 0))
    }
}

pub fn assigned(mut issue: Issue, name: &str) -> Issue {
    issue.assignee = Some(Assignee {
        id: name.len() as i64,
        name: name.to_string(),
    });
    issue
}

/// In-memory store with scripted failures, recording the order of calls it receives.
#[derive(Default)]
pub struct ScriptedStore {
    pub issues: RefCell<Vec<Issue>>,
    pub calls: RefCell<Vec<String>>,
    next_id: Cell<i64>,
    reject_subjects: HashSet<String>,
    missing_ids: HashSet<i64>,
    garbled_call: Option<usize>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(mut self, subject: &str) -> Self {
        self.reject_subjects.insert(subject.to_string());
        self
    }

    pub fn missing(mut self, id: i64) -> Self {
        self.missing_ids.insert(id);
        self
    }

    /// The nth call (1-based) gets a response body that cannot be decoded, which no record can
    /// recover from.
    pub fn garbled_on_call(mut self, n: usize) -> Self {
        self.garbled_call = Some(n);
        self
    }

    pub fn with_issue(self, issue: Issue) -> Self {
        self.issues.borrow_mut().push(issue);
        self
    }

    fn record_call(&self, call: String) -> Result<(), StoreError> {
        let mut calls = self.calls.borrow_mut();
        calls.push(call);
        if self.garbled_call == Some(calls.len()) {
            return Err(StoreError::Decode("expected value at line 1 column 1".to_string()));
        }
        Ok(())
    }
}

impl IssueStore for ScriptedStore {
    fn fetch(&self, filter: &IssueFilter) -> Result<Vec<Issue>, StoreError> {
        self.record_call("fetch".to_string())?;
        Ok(self
            .issues
            .borrow()
            .iter()
            .filter(|i| filter.project_id.map_or(true, |p| i.project_id == p))
            .filter(|i| filter.status.matches(i))
            .cloned()
            .collect())
    }

    fn create(&self, record: &BulkRecord) -> Result<Issue, StoreError> {
        self.record_call(format!("create {}", record.subject))?;
        if self.reject_subjects.contains(&record.subject) {
            return Err(StoreError::rejected("Subject is reserved"));
        }
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        let mut issue = open_issue(id, ts(2024, 1, 1, 0));
        issue.subject = record.subject.clone();
        issue.project_id = record.project_id;
        issue.tracker_id = record.tracker_id;
        issue.priority_id = record.priority_id;
        self.issues.borrow_mut().push(issue.clone());
        Ok(issue)
    }

    fn update(&self, id: i64, payload: &UpdatePayload) -> Result<(), StoreError> {
        self.record_call(format!("update {}", id))?;
        if self.missing_ids.contains(&id) {
            return Err(StoreError::NotFound { id });
        }
        let mut issues = self.issues.borrow_mut();
        if let Some(issue) = issues.iter_mut().find(|i| i.id == id) {
            if let Some(status_id) = payload.status_id {
                issue.status_id = status_id;
            }
            if let Some(priority_id) = payload.priority_id {
                issue.priority_id = priority_id;
            }
        }
        Ok(())
    }

    fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.record_call(format!("delete {}", id))?;
        self.issues.borrow_mut().retain(|i| i.id != id);
        Ok(())
    }
}
