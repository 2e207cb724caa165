//! `.trackdash/config.toml` loading.
//!
//! Every section is optional. Values are layered as: defaults, then the TOML file, then
//! `TRACKDASH_*` environment variables. Call [`Config::validate`] after loading.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::remote::DEFAULT_PAGE_SIZE;
use crate::trend::{DEFAULT_WINDOW_DAYS, MAX_WINDOW_DAYS};

pub const DIR_NAME: &str = ".trackdash";
pub const CONFIG_FILE: &str = "config.toml";
pub const DATABASE_FILE: &str = "issues.db";
pub const DEFAULT_TIMELINE_DAYS: u32 = 28;
pub const MAX_TIMELINE_DAYS: u32 = 3660;

pub const ENV_BACKEND: &str = "TRACKDASH_BACKEND";
pub const ENV_REDMINE_URL: &str = "TRACKDASH_REDMINE_URL";
pub const ENV_API_KEY: &str = "TRACKDASH_API_KEY";

type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Redmine,
}

impl std::str::FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Backend::Sqlite),
            "redmine" => Ok(Backend::Redmine),
            other => Err(ConfigError::Invalid(format!(
                "unknown backend '{}', expected sqlite or redmine",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: Backend,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct RedmineConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub page_size: u32,
}

impl Default for RedmineConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl std::fmt::Debug for RedmineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedmineConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("page_size", &self.page_size)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub window_days: u32,
    pub timeline_days: u32,
    pub default_project: Option<i64>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_WINDOW_DAYS,
            timeline_days: DEFAULT_TIMELINE_DAYS,
            default_project: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive such as `info` or `trackdash=debug`.
    pub level: Option<String>,
    pub json: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub redmine: RedmineConfig,
    pub dashboard: DashboardConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load `config.toml` from `dir` (defaults when absent) and apply environment overrides.
    pub fn load(dir: &Path) -> ConfigResult<Self> {
        let mut config = Self::load_file(&dir.join(CONFIG_FILE))?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Defaults plus environment, for commands run outside a `.trackdash` directory.
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
    }

    fn load_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::Toml {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Overrides read through `lookup`; empty values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(value) = get(ENV_BACKEND) {
            match value.parse() {
                Ok(backend) => self.store.backend = backend,
                Err(err) => warn!(error = %err, "ignoring {}", ENV_BACKEND),
            }
        }
        if let Some(url) = get(ENV_REDMINE_URL) {
            self.redmine.url = Some(url);
        }
        if let Some(key) = get(ENV_API_KEY) {
            self.redmine.api_key = Some(key);
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        check_days(
            "dashboard.window_days",
            self.dashboard.window_days,
            MAX_WINDOW_DAYS,
        )?;
        check_days(
            "dashboard.timeline_days",
            self.dashboard.timeline_days,
            MAX_TIMELINE_DAYS,
        )?;
        if self.redmine.page_size == 0 {
            return Err(ConfigError::Invalid(
                "redmine.page_size must be at least 1".to_string(),
            ));
        }
        if self.store.backend == Backend::Redmine {
            match self.redmine.url.as_deref().map(str::trim) {
                Some(url) if url.starts_with("http://") || url.starts_with("https://") => {}
                Some(url) if !url.is_empty() => {
                    return Err(ConfigError::Invalid(format!(
                        "redmine.url must start with http:// or https://, got '{}'",
                        url
                    )));
                }
                _ => {
                    return Err(ConfigError::Invalid(format!(
                        "the redmine backend needs redmine.url or {}",
                        ENV_REDMINE_URL
                    )));
                }
            }
        }
        Ok(())
    }

    /// Log configuration summary. The API key is never logged.
    pub fn log_summary(&self) {
        info!(backend = ?self.store.backend, "configuration loaded");
        if self.store.backend == Backend::Redmine {
            info!(
                url = self.redmine.url.as_deref().unwrap_or(""),
                authenticated = self.redmine.api_key.is_some(),
                page_size = self.redmine.page_size,
                "redmine backend"
            );
        }
        info!(
            window_days = self.dashboard.window_days,
            timeline_days = self.dashboard.timeline_days,
            default_project = ?self.dashboard.default_project,
            "dashboard"
        );
    }
}

/// Reject a day count outside `1..=max`. `name` is how the setting is reported.
pub fn check_days(name: &str, days: u32, max: u32) -> ConfigResult<()> {
    if days == 0 || days > max {
        return Err(ConfigError::Invalid(format!(
            "{} must be between 1 and {}, got {}",
            name, max, days
        )));
    }
    Ok(())
}

/// Walk up from `start` looking for a `.trackdash` directory.
pub fn find_dir_from(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let candidate = current.join(DIR_NAME);
        if candidate.is_dir() {
            return Some(candidate);
        }

        if !current.pop() {
            return None;
        }
    }
}
