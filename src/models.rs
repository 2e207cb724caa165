use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Status names that mark an issue as finished, compared case-insensitively.
pub const CLOSED_STATUSES: [&str; 2] = ["closed", "rejected"];

pub const DEFAULT_TRACKER_ID: i64 = 1;
pub const DEFAULT_STATUS_ID: i64 = 1;
pub const DEFAULT_PRIORITY_ID: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Open,
    Closed,
}

impl StatusKind {
    pub fn from_status_name(name: &str) -> Self {
        let name = name.trim();
        if CLOSED_STATUSES.iter().any(|s| s.eq_ignore_ascii_case(name)) {
            StatusKind::Closed
        } else {
            StatusKind::Open
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignee {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: i64,
    pub project_id: i64,
    pub tracker_id: i64,
    pub subject: String,
    pub description: Option<String>,
    pub status_id: i64,
    pub status: String,
    pub priority_id: i64,
    pub priority: String,
    pub assignee: Option<Assignee>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, String>,
}

impl Issue {
    pub fn status_kind(&self) -> StatusKind {
        StatusKind::from_status_name(&self.status)
    }

    pub fn is_closed(&self) -> bool {
        self.status_kind() == StatusKind::Closed
    }

    /// Best available closure time for a closed issue.
    ///
    /// Trackers do not always report `closed_at`; `updated_at` stands in for it, which is only
    /// accurate when nothing touched the issue after it was closed.
    pub fn effective_closed_at(&self) -> Option<DateTime<Utc>> {
        match self.status_kind() {
            StatusKind::Open => None,
            StatusKind::Closed => Some(self.closed_at.unwrap_or(self.updated_at)),
        }
    }

    pub fn has_schedule(&self) -> bool {
        self.start_date.is_some() || self.due_date.is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    Open,
    Closed,
    #[default]
    All,
}

impl StatusFilter {
    pub fn matches(&self, issue: &Issue) -> bool {
        match self {
            StatusFilter::Open => !issue.is_closed(),
            StatusFilter::Closed => issue.is_closed(),
            StatusFilter::All => true,
        }
    }
}

impl std::str::FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "open" => Ok(StatusFilter::Open),
            "closed" => Ok(StatusFilter::Closed),
            "all" | "*" => Ok(StatusFilter::All),
            other => Err(format!("Invalid status filter '{}'. Use open, closed or all", other)),
        }
    }
}

/// Scope of a snapshot fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IssueFilter {
    pub project_id: Option<i64>,
    pub status: StatusFilter,
}

impl IssueFilter {
    pub fn project(project_id: i64) -> Self {
        IssueFilter {
            project_id: Some(project_id),
            status: StatusFilter::All,
        }
    }

    pub fn with_status(mut self, status: StatusFilter) -> Self {
        self.status = status;
        self
    }
}

fn default_tracker_id() -> i64 {
    DEFAULT_TRACKER_ID
}

fn default_status_id() -> i64 {
    DEFAULT_STATUS_ID
}

fn default_priority_id() -> i64 {
    DEFAULT_PRIORITY_ID
}

/// One issue to be created by a bulk run.
///
/// Keys the dashboard does not know about are kept in `extra` and handed to the store untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkRecord {
    pub subject: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_tracker_id")]
    pub tracker_id: i64,
    #[serde(default = "default_status_id")]
    pub status_id: i64,
    #[serde(default = "default_priority_id")]
    pub priority_id: i64,
    #[serde(default)]
    pub project_id: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BulkRecord {
    pub fn new(subject: impl Into<String>, project_id: i64) -> Self {
        BulkRecord {
            subject: subject.into(),
            description: String::new(),
            tracker_id: DEFAULT_TRACKER_ID,
            status_id: DEFAULT_STATUS_ID,
            priority_id: DEFAULT_PRIORITY_ID,
            project_id,
            extra: Map::new(),
        }
    }

    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    Unassign,
    User(i64),
}

/// Fields a bulk edit applies. `None` means the field was not toggled and stays untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdatePayload {
    pub tracker_id: Option<i64>,
    pub status_id: Option<i64>,
    pub priority_id: Option<i64>,
    pub assignee: Option<Assignment>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl UpdatePayload {
    pub fn is_empty(&self) -> bool {
        self.applied_fields().is_empty()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.tracker_id.is_some() {
            fields.push("tracker");
        }
        if self.status_id.is_some() {
            fields.push("status");
        }
        if self.priority_id.is_some() {
            fields.push("priority");
        }
        if self.assignee.is_some() {
            fields.push("assignee");
        }
        if self.start_date.is_some() {
            fields.push("start_date");
        }
        if self.due_date.is_some() {
            fields.push("due_date");
        }
        if self.notes.is_some() {
            fields.push("notes");
        }
        fields
    }

    pub fn with_status(mut self, status_id: i64) -> Self {
        self.status_id = Some(status_id);
        self
    }

    pub fn with_priority(mut self, priority_id: i64) -> Self {
        self.priority_id = Some(priority_id);
        self
    }

    pub fn with_tracker(mut self, tracker_id: i64) -> Self {
        self.tracker_id = Some(tracker_id);
        self
    }

    pub fn assign_to(mut self, user_id: i64) -> Self {
        self.assignee = Some(Assignment::User(user_id));
        self
    }

    pub fn unassign(mut self) -> Self {
        self.assignee = Some(Assignment::Unassign);
        self
    }

    pub fn with_start_date(mut self, date: NaiveDate) -> Self {
        self.start_date = Some(date);
        self
    }

    pub fn with_due_date(mut self, date: NaiveDate) -> Self {
        self.due_date = Some(date);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRef {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl From<&Issue> for IssueRef {
    fn from(issue: &Issue) -> Self {
        IssueRef {
            id: issue.id,
            subject: Some(issue.subject.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure<R> {
    pub record: R,
    pub reason: String,
}

/// Outcome of a batch run, partitioned in submission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult<R> {
    pub succeeded: Vec<IssueRef>,
    pub failed: Vec<Failure<R>>,
}

impl<R> Default for BatchResult<R> {
    fn default() -> Self {
        BatchResult {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<R> BatchResult<R> {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Whether the caller should re-fetch its snapshot.
    pub fn needs_refresh(&self) -> bool {
        !self.succeeded.is_empty()
    }

    pub fn failed_records(&self) -> impl Iterator<Item = &R> {
        self.failed.iter().map(|f| &f.record)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySnapshot {
    pub date: NaiveDate,
    pub open_count: u32,
    pub closed_count: u32,
}

impl DailySnapshot {
    /// Stable calendar key, `YYYY-MM-DD`.
    pub fn key(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimelineBar {
    pub issue_id: i64,
    pub left: f64,
    pub width: f64,
}

impl TimelineBar {
    /// False for bars that start at or past the right edge of the viewport.
    pub fn is_visible(&self) -> bool {
        self.left < 1.0 && self.width > 0.0
    }
}
