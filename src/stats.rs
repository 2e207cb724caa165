use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;

use crate::models::Issue;

pub const UNASSIGNED: &str = "Unassigned";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectStats {
    pub total: usize,
    pub open: usize,
    pub closed: usize,
    /// Open issues whose due date has passed.
    pub overdue: usize,
    pub by_priority: Vec<(String, usize)>,
    pub by_assignee: Vec<(String, usize)>,
}

impl ProjectStats {
    pub fn completion_percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.closed as f64 * 100.0 / self.total as f64
        }
    }
}

fn ranked(counts: HashMap<String, usize>) -> Vec<(String, usize)> {
    let mut ranked: Vec<_> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

/// Headline numbers for a snapshot, recomputed from scratch on every refresh.
pub fn summarize(issues: &[Issue], today: NaiveDate) -> ProjectStats {
    let mut by_priority: HashMap<String, usize> = HashMap::new();
    let mut by_assignee: HashMap<String, usize> = HashMap::new();
    let mut closed = 0;
    let mut overdue = 0;

    for issue in issues {
        *by_priority.entry(issue.priority.clone()).or_default() += 1;

        let assignee = issue
            .assignee
            .as_ref()
            .map_or(UNASSIGNED, |a| a.name.as_str());
        *by_assignee.entry(assignee.to_string()).or_default() += 1;

        if issue.is_closed() {
            closed += 1;
        } else if issue.due_date.is_some_and(|due| due < today) {
            overdue += 1;
        }
    }

    ProjectStats {
        total: issues.len(),
        open: issues.len() - closed,
        closed,
        overdue,
        by_priority: ranked(by_priority),
        by_assignee: ranked(by_assignee),
    }
}
