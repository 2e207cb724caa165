use anyhow::Result;

use trackdash::db::Database;

pub fn add(db: &Database, identifier: &str, name: &str) -> Result<()> {
    let id = db.create_project(identifier, name)?;
    println!("Created project #{} ({})", id, identifier.trim());
    Ok(())
}

pub fn list(db: &Database) -> Result<()> {
    let projects = db.list_projects()?;

    if projects.is_empty() {
        println!("No projects found. Add one with 'trackdash project add'.");
        return Ok(());
    }

    for project in projects {
        println!("#{:<4} {:<20} {}", project.id, project.identifier, project.name);
    }
    Ok(())
}
