use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use trackdash::config::{CONFIG_FILE, DATABASE_FILE, DIR_NAME};
use trackdash::db::Database;

// Embedded at compile time; see build.rs
const CONFIG_TEMPLATE: &str = include_str!("../../resources/config.toml");

pub fn run(path: &Path, force: bool) -> Result<()> {
    let trackdash_dir = path.join(DIR_NAME);
    let config_path = trackdash_dir.join(CONFIG_FILE);

    let dir_exists = trackdash_dir.exists();
    let config_exists = config_path.exists();

    if dir_exists && config_exists && !force {
        println!("Already initialized at {}", path.display());
        println!("Use --force to reset {} to the defaults.", CONFIG_FILE);
        return Ok(());
    }

    if !dir_exists {
        fs::create_dir_all(&trackdash_dir)
            .with_context(|| format!("Failed to create {} directory", DIR_NAME))?;
    }

    // Opening creates the schema; an existing database keeps its data.
    Database::open(&trackdash_dir.join(DATABASE_FILE)).context("Failed to create database")?;

    if !config_exists || force {
        fs::write(&config_path, CONFIG_TEMPLATE)
            .with_context(|| format!("Failed to write {}", CONFIG_FILE))?;
    }

    if dir_exists {
        println!("Updated {}", trackdash_dir.display());
    } else {
        println!("Created {}", trackdash_dir.display());
    }
    Ok(())
}
