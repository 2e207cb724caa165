use anyhow::{bail, Result};

use trackdash::db::Database;

pub fn run(db: &Database, id: i64) -> Result<()> {
    let issue = match db.get_issue(id)? {
        Some(i) => i,
        None => bail!("Issue #{} not found", id),
    };

    println!("Issue #{}: {}", issue.id, issue.subject);
    println!("Status: {}", issue.status);
    println!("Priority: {}", issue.priority);
    if let Some(assignee) = &issue.assignee {
        println!("Assignee: {}", assignee.name);
    }
    if let Some(start) = issue.start_date {
        println!("Start: {}", start);
    }
    if let Some(due) = issue.due_date {
        println!("Due: {}", due);
    }
    println!("Created: {}", issue.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("Updated: {}", issue.updated_at.format("%Y-%m-%d %H:%M:%S"));

    if let Some(closed) = issue.closed_at {
        println!("Closed: {}", closed.format("%Y-%m-%d %H:%M:%S"));
    }

    for (name, value) in &issue.custom_fields {
        println!("{}: {}", name, value);
    }

    if let Some(desc) = &issue.description {
        println!("\nDescription:");
        for line in desc.lines() {
            println!("  {}", line);
        }
    }

    let notes = db.get_notes(id)?;
    if !notes.is_empty() {
        println!("\nNotes:");
        for note in notes {
            println!("  - {}", note);
        }
    }

    Ok(())
}
