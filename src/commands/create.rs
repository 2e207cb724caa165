use anyhow::{bail, Result};
use chrono::NaiveDate;

use trackdash::models::BulkRecord;
use trackdash::IssueStore;

pub struct NewIssue<'a> {
    pub project_id: i64,
    pub subject: &'a str,
    pub description: Option<&'a str>,
    pub tracker_id: i64,
    pub status_id: i64,
    pub priority_id: i64,
    pub assignee: Option<i64>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
}

impl NewIssue<'_> {
    fn to_record(&self) -> BulkRecord {
        let mut record = BulkRecord::new(self.subject.trim(), self.project_id);
        record.description = self.description.unwrap_or_default().to_string();
        record.tracker_id = self.tracker_id;
        record.status_id = self.status_id;
        record.priority_id = self.priority_id;
        if let Some(user_id) = self.assignee {
            record.extra.insert("assigned_to_id".into(), user_id.into());
        }
        if let Some(start) = self.start_date {
            record
                .extra
                .insert("start_date".into(), start.format("%Y-%m-%d").to_string().into());
        }
        if let Some(due) = self.due_date {
            record
                .extra
                .insert("due_date".into(), due.format("%Y-%m-%d").to_string().into());
        }
        record
    }
}

pub fn run<S: IssueStore + ?Sized>(store: &S, issue: &NewIssue) -> Result<()> {
    if issue.subject.trim().is_empty() {
        bail!("Subject cannot be blank");
    }

    let created = store.create(&issue.to_record())?;
    println!("Created issue #{}", created.id);
    Ok(())
}
