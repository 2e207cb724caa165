use anyhow::Result;

use trackdash::db::Database;

pub fn add(db: &Database, name: &str) -> Result<()> {
    let id = db.create_user(name)?;
    println!("Created user #{} {}", id, name.trim());
    Ok(())
}

pub fn list(db: &Database) -> Result<()> {
    let users = db.list_users()?;

    if users.is_empty() {
        println!("No users found.");
        return Ok(());
    }

    for user in users {
        println!("#{:<4} {}", user.id, user.name);
    }
    Ok(())
}
