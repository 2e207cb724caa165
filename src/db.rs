use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::models::{
    Assignee, Assignment, BulkRecord, Issue, IssueFilter, StatusFilter, StatusKind, UpdatePayload,
    CLOSED_STATUSES,
};
use crate::store::IssueStore;

const SCHEMA_VERSION: i32 = 1;

type Result<T> = std::result::Result<T, StoreError>;

const ISSUE_COLUMNS: &str = "i.id, i.project_id, i.tracker_id, i.subject, i.description, \
     i.status_id, s.name, i.priority_id, p.name, i.assigned_to_id, u.name, \
     i.created_at, i.updated_at, i.closed_at, i.start_date, i.due_date";

const ISSUE_JOINS: &str = "FROM issues i \
     JOIN statuses s ON s.id = i.status_id \
     JOIN priorities p ON p.id = i.priority_id \
     LEFT JOIN users u ON u.id = i.assigned_to_id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: i64,
    pub identifier: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub name: String,
}

/// Local tracker with the same shape as a Redmine instance.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .query_row("SELECT user_version FROM pragma_user_version", [], |row| {
                row.get(0)
            })?;

        if version < SCHEMA_VERSION {
            self.conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS projects (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    identifier TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS trackers (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS statuses (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS priorities (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS issues (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    project_id INTEGER NOT NULL,
                    tracker_id INTEGER NOT NULL,
                    status_id INTEGER NOT NULL,
                    priority_id INTEGER NOT NULL,
                    assigned_to_id INTEGER,
                    subject TEXT NOT NULL,
                    description TEXT,
                    start_date TEXT,
                    due_date TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    closed_at TEXT,
                    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
                    FOREIGN KEY (tracker_id) REFERENCES trackers(id),
                    FOREIGN KEY (status_id) REFERENCES statuses(id),
                    FOREIGN KEY (priority_id) REFERENCES priorities(id),
                    FOREIGN KEY (assigned_to_id) REFERENCES users(id) ON DELETE SET NULL
                );

                -- Custom field values (name -> value per issue)
                CREATE TABLE IF NOT EXISTS custom_values (
                    issue_id INTEGER NOT NULL,
                    name TEXT NOT NULL,
                    value TEXT NOT NULL,
                    PRIMARY KEY (issue_id, name),
                    FOREIGN KEY (issue_id) REFERENCES issues(id) ON DELETE CASCADE
                );

                -- Notes left by updates
                CREATE TABLE IF NOT EXISTS journals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    issue_id INTEGER NOT NULL,
                    notes TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    FOREIGN KEY (issue_id) REFERENCES issues(id) ON DELETE CASCADE
                );

                INSERT OR IGNORE INTO trackers (id, name) VALUES
                    (1, 'Bug'), (2, 'Feature'), (3, 'Support');
                INSERT OR IGNORE INTO statuses (id, name) VALUES
                    (1, 'New'), (2, 'In Progress'), (3, 'Resolved'),
                    (4, 'Feedback'), (5, 'Closed'), (6, 'Rejected');
                INSERT OR IGNORE INTO priorities (id, name) VALUES
                    (1, 'Low'), (2, 'Normal'), (3, 'High'), (4, 'Urgent'), (5, 'Immediate');

                CREATE INDEX IF NOT EXISTS idx_issues_project ON issues(project_id);
                CREATE INDEX IF NOT EXISTS idx_issues_status ON issues(status_id);
                CREATE INDEX IF NOT EXISTS idx_custom_values_issue ON custom_values(issue_id);
                CREATE INDEX IF NOT EXISTS idx_journals_issue ON journals(issue_id);
                "#,
            )?;

            self.conn
                .execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))?;
        }

        self.conn.execute_batch("PRAGMA foreign_keys = ON")?;

        Ok(())
    }

    // Projects and users
    pub fn create_project(&self, identifier: &str, name: &str) -> Result<i64> {
        let identifier = identifier.trim();
        if identifier.is_empty() || name.trim().is_empty() {
            return Err(StoreError::rejected("Project identifier and name are required"));
        }
        if self.find_project(identifier)?.is_some() {
            return Err(StoreError::rejected(format!(
                "Project identifier '{}' has already been taken",
                identifier
            )));
        }

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO projects (identifier, name, created_at) VALUES (?1, ?2, ?3)",
            params![identifier, name.trim(), now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn find_project(&self, identifier: &str) -> Result<Option<Project>> {
        let project = self
            .conn
            .query_row(
                "SELECT id, identifier, name FROM projects WHERE identifier = ?1",
                [identifier],
                |row| {
                    Ok(Project {
                        id: row.get(0)?,
                        identifier: row.get(1)?,
                        name: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(project)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, identifier, name FROM projects ORDER BY id")?;
        let projects = stmt
            .query_map([], |row| {
                Ok(Project {
                    id: row.get(0)?,
                    identifier: row.get(1)?,
                    name: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(projects)
    }

    pub fn create_user(&self, name: &str) -> Result<i64> {
        if name.trim().is_empty() {
            return Err(StoreError::rejected("User name cannot be blank"));
        }
        self.conn
            .execute("INSERT INTO users (name) VALUES (?1)", [name.trim()])?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self.conn.prepare("SELECT id, name FROM users ORDER BY id")?;
        let users = stmt
            .query_map([], |row| {
                Ok(User {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }

    // Issues
    pub fn get_issue(&self, id: i64) -> Result<Option<Issue>> {
        let sql = format!("SELECT {} {} WHERE i.id = ?1", ISSUE_COLUMNS, ISSUE_JOINS);
        let issue = self
            .conn
            .query_row(&sql, [id], issue_from_row)
            .optional()?;

        match issue {
            Some(mut issue) => {
                issue.custom_fields = self.get_custom_fields(issue.id)?;
                Ok(Some(issue))
            }
            None => Ok(None),
        }
    }

    pub fn list_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        let mut sql = format!("SELECT {} {}", ISSUE_COLUMNS, ISSUE_JOINS);
        let mut conditions = Vec::new();
        let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(project_id) = filter.project_id {
            conditions.push("i.project_id = ?".to_string());
            params_vec.push(Box::new(project_id));
        }

        let closed_names = CLOSED_STATUSES
            .iter()
            .map(|s| format!("'{}'", s))
            .collect::<Vec<_>>()
            .join(", ");
        match filter.status {
            StatusFilter::Open => {
                conditions.push(format!("LOWER(TRIM(s.name)) NOT IN ({})", closed_names));
            }
            StatusFilter::Closed => {
                conditions.push(format!("LOWER(TRIM(s.name)) IN ({})", closed_names));
            }
            StatusFilter::All => {}
        }

        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY i.id");

        let mut stmt = self.conn.prepare(&sql)?;
        let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        let mut issues = stmt
            .query_map(params_refs.as_slice(), issue_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for issue in &mut issues {
            issue.custom_fields = self.get_custom_fields(issue.id)?;
        }

        Ok(issues)
    }

    pub fn create_issue(&self, record: &BulkRecord) -> Result<i64> {
        let subject = record.subject.trim();
        if subject.is_empty() {
            return Err(StoreError::rejected("Subject cannot be blank"));
        }
        self.require("projects", record.project_id, "Project")?;
        self.require("trackers", record.tracker_id, "Tracker")?;
        let status = self.require("statuses", record.status_id, "Status")?;
        self.require("priorities", record.priority_id, "Priority")?;

        let assignee = match record.extra.get("assigned_to_id") {
            None | Some(Value::Null) => None,
            Some(value) => {
                let user_id = value
                    .as_i64()
                    .ok_or_else(|| StoreError::rejected("Assignee is invalid"))?;
                self.require("users", user_id, "User")?;
                Some(user_id)
            }
        };
        let start_date = record_date(record, "start_date", "Start date")?;
        let due_date = record_date(record, "due_date", "Due date")?;
        check_schedule(start_date, due_date)?;

        let now = Utc::now().to_rfc3339();
        let closed_at = match StatusKind::from_status_name(&status) {
            StatusKind::Closed => Some(now.clone()),
            StatusKind::Open => None,
        };
        let description = (!record.description.is_empty()).then_some(record.description.as_str());

        self.conn.execute(
            "INSERT INTO issues (project_id, tracker_id, status_id, priority_id, assigned_to_id, subject, description, start_date, due_date, created_at, updated_at, closed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10, ?11)",
            params![
                record.project_id,
                record.tracker_id,
                record.status_id,
                record.priority_id,
                assignee,
                subject,
                description,
                start_date.map(format_date),
                due_date.map(format_date),
                now,
                closed_at,
            ],
        )?;
        let id = self.conn.last_insert_rowid();

        if let Some(Value::Object(fields)) = record.extra.get("custom_fields") {
            for (name, value) in fields {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                self.set_custom_field(id, name, &value)?;
            }
        }

        debug!(id, project_id = record.project_id, "issue created");
        Ok(id)
    }

    pub fn update_issue(&self, id: i64, payload: &UpdatePayload) -> Result<()> {
        let current = self.get_issue(id)?.ok_or(StoreError::NotFound { id })?;

        let now = Utc::now().to_rfc3339();
        let mut updates = vec!["updated_at = ?1".to_string()];
        let mut params_vec: Vec<Box<dyn ToSql>> = vec![Box::new(now.clone())];

        if let Some(tracker_id) = payload.tracker_id {
            self.require("trackers", tracker_id, "Tracker")?;
            updates.push(format!("tracker_id = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(tracker_id));
        }

        if let Some(status_id) = payload.status_id {
            let status = self.require("statuses", status_id, "Status")?;
            updates.push(format!("status_id = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(status_id));

            match StatusKind::from_status_name(&status) {
                StatusKind::Closed if !current.is_closed() => {
                    updates.push(format!("closed_at = ?{}", params_vec.len() + 1));
                    params_vec.push(Box::new(now.clone()));
                }
                StatusKind::Closed => {}
                StatusKind::Open => updates.push("closed_at = NULL".to_string()),
            }
        }

        if let Some(priority_id) = payload.priority_id {
            self.require("priorities", priority_id, "Priority")?;
            updates.push(format!("priority_id = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(priority_id));
        }

        match payload.assignee {
            Some(Assignment::User(user_id)) => {
                self.require("users", user_id, "User")?;
                updates.push(format!("assigned_to_id = ?{}", params_vec.len() + 1));
                params_vec.push(Box::new(user_id));
            }
            Some(Assignment::Unassign) => updates.push("assigned_to_id = NULL".to_string()),
            None => {}
        }

        check_schedule(
            payload.start_date.or(current.start_date),
            payload.due_date.or(current.due_date),
        )?;
        if let Some(start) = payload.start_date {
            updates.push(format!("start_date = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(format_date(start)));
        }
        if let Some(due) = payload.due_date {
            updates.push(format!("due_date = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(format_date(due)));
        }

        params_vec.push(Box::new(id));
        let sql = format!(
            "UPDATE issues SET {} WHERE id = ?{}",
            updates.join(", "),
            params_vec.len()
        );

        let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        self.conn.execute(&sql, params_refs.as_slice())?;

        if let Some(notes) = payload.notes.as_deref().filter(|n| !n.trim().is_empty()) {
            self.conn.execute(
                "INSERT INTO journals (issue_id, notes, created_at) VALUES (?1, ?2, ?3)",
                params![id, notes, now],
            )?;
        }

        debug!(id, fields = ?payload.applied_fields(), "issue updated");
        Ok(())
    }

    pub fn delete_issue(&self, id: i64) -> Result<()> {
        let rows = self.conn.execute("DELETE FROM issues WHERE id = ?1", [id])?;
        if rows == 0 {
            return Err(StoreError::NotFound { id });
        }
        Ok(())
    }

    // Custom fields
    pub fn set_custom_field(&self, issue_id: i64, name: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO custom_values (issue_id, name, value) VALUES (?1, ?2, ?3)",
            params![issue_id, name, value],
        )?;
        Ok(())
    }

    pub fn get_custom_fields(&self, issue_id: i64) -> Result<BTreeMap<String, String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, value FROM custom_values WHERE issue_id = ?1")?;
        let fields = stmt
            .query_map([issue_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<BTreeMap<String, String>, _>>()?;
        Ok(fields)
    }

    // Journals
    pub fn get_notes(&self, issue_id: i64) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT notes FROM journals WHERE issue_id = ?1 ORDER BY id")?;
        let notes = stmt
            .query_map([issue_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(notes)
    }

    /// Name of the row `id` in a lookup table, or a rejection naming what is missing.
    fn require(&self, table: &str, id: i64, label: &str) -> Result<String> {
        let sql = format!("SELECT name FROM {} WHERE id = ?1", table);
        self.conn
            .query_row(&sql, [id], |row| row.get(0))
            .optional()?
            .ok_or_else(|| StoreError::rejected(format!("{} #{} does not exist", label, id)))
    }
}

impl IssueStore for Database {
    fn fetch(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        self.list_issues(filter)
    }

    fn create(&self, record: &BulkRecord) -> Result<Issue> {
        let id = self.create_issue(record)?;
        self.get_issue(id)?.ok_or(StoreError::NotFound { id })
    }

    fn update(&self, id: i64, payload: &UpdatePayload) -> Result<()> {
        self.update_issue(id, payload)
    }

    fn delete(&self, id: i64) -> Result<()> {
        self.delete_issue(id)
    }
}

fn issue_from_row(row: &Row<'_>) -> rusqlite::Result<Issue> {
    let assignee = match (row.get::<_, Option<i64>>(9)?, row.get::<_, Option<String>>(10)?) {
        (Some(id), Some(name)) => Some(Assignee { id, name }),
        _ => None,
    };

    Ok(Issue {
        id: row.get(0)?,
        project_id: row.get(1)?,
        tracker_id: row.get(2)?,
        subject: row.get(3)?,
        description: row.get(4)?,
        status_id: row.get(5)?,
        status: row.get(6)?,
        priority_id: row.get(7)?,
        priority: row.get(8)?,
        assignee,
        created_at: parse_datetime(row.get::<_, String>(11)?),
        updated_at: parse_datetime(row.get::<_, String>(12)?),
        closed_at: row.get::<_, Option<String>>(13)?.map(parse_datetime),
        start_date: row.get::<_, Option<String>>(14)?.and_then(parse_date),
        due_date: row.get::<_, Option<String>>(15)?.and_then(parse_date),
        custom_fields: BTreeMap::new(),
    })
}

fn record_date(record: &BulkRecord, key: &str, label: &str) -> Result<Option<NaiveDate>> {
    match record.extra.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => parse_date(s.trim().to_string())
            .map(Some)
            .ok_or_else(|| StoreError::rejected(format!("{} is not a valid date", label))),
        Some(_) => Err(StoreError::rejected(format!("{} is not a valid date", label))),
    }
}

fn check_schedule(start: Option<NaiveDate>, due: Option<NaiveDate>) -> Result<()> {
    match (start, due) {
        (Some(start), Some(due)) if due < start => Err(StoreError::rejected(
            "Due date must be greater than start date",
        )),
        _ => Ok(()),
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(s: String) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()
}

/// Unreadable timestamps load as the current time so one bad row does not hide the snapshot.
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!(value = %s, error = %e, "Unreadable timestamp, using the current time");
            Utc::now()
        })
}
