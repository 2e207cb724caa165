mod commands;

use anyhow::{bail, Context, Result};
use chrono::{Days, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::env;
use std::path::PathBuf;
use tracing::debug;

use trackdash::config::{self, Backend, Config, LoggingConfig, DATABASE_FILE};
use trackdash::db::Database;
use trackdash::logging;
use trackdash::models::{IssueFilter, StatusFilter, UpdatePayload};
use trackdash::remote::RedmineStore;
use trackdash::IssueStore;

#[derive(Parser)]
#[command(name = "trackdash")]
#[command(about = "Project dashboard for Redmine-style issue trackers")]
#[command(version)]
struct Cli {
    /// Emit logs as JSON on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize trackdash in the current directory
    Init {
        /// Reset config.toml to the defaults
        #[arg(short, long)]
        force: bool,
    },

    /// Manage local projects (sqlite backend)
    Project {
        #[command(subcommand)]
        action: ProjectCommands,
    },

    /// Manage local users (sqlite backend)
    User {
        #[command(subcommand)]
        action: UserCommands,
    },

    /// Create a single issue
    Create {
        /// Issue subject
        subject: String,
        /// Project ID (defaults to dashboard.default_project)
        #[arg(short, long)]
        project: Option<i64>,
        /// Issue description
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long, default_value_t = 1)]
        tracker: i64,
        #[arg(long, default_value_t = 1)]
        status: i64,
        #[arg(long, default_value_t = 2)]
        priority: i64,
        /// User ID to assign
        #[arg(long)]
        assign: Option<i64>,
        /// YYYY-MM-DD
        #[arg(long)]
        start_date: Option<NaiveDate>,
        /// YYYY-MM-DD
        #[arg(long)]
        due_date: Option<NaiveDate>,
    },

    /// List issues
    List {
        #[arg(short, long)]
        project: Option<i64>,
        /// Filter by status (open, closed, all)
        #[arg(short, long, default_value = "open")]
        status: StatusFilter,
    },

    /// Show issue details (sqlite backend)
    Show {
        /// Issue ID
        id: i64,
    },

    /// Delete an issue
    Delete {
        /// Issue ID
        id: i64,
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Create many issues from a JSON list or comma-separated rows
    BulkCreate {
        #[arg(short, long)]
        project: Option<i64>,
        /// Input file (reads stdin when omitted)
        #[arg(long)]
        file: Option<PathBuf>,
        /// Write records that failed to this file, ready to retry
        #[arg(long)]
        failed_out: Option<PathBuf>,
    },

    /// Apply the same change to many issues
    BulkEdit {
        /// Issue IDs
        #[arg(required = true)]
        ids: Vec<i64>,
        #[arg(long)]
        status: Option<i64>,
        #[arg(long)]
        priority: Option<i64>,
        #[arg(long)]
        tracker: Option<i64>,
        /// User ID to assign
        #[arg(long, conflicts_with = "unassign")]
        assign: Option<i64>,
        /// Clear the assignee
        #[arg(long)]
        unassign: bool,
        #[arg(long)]
        start_date: Option<NaiveDate>,
        #[arg(long)]
        due_date: Option<NaiveDate>,
        /// Note added to every issue
        #[arg(long)]
        notes: Option<String>,
        /// Project whose statistics are refreshed afterwards
        #[arg(short, long)]
        project: Option<i64>,
    },

    /// Open and closed counts per day
    Trend {
        #[arg(short, long)]
        project: Option<i64>,
        /// Days in the window, ending today
        #[arg(long)]
        days: Option<u32>,
        #[arg(long)]
        json: bool,
    },

    /// Gantt-style bars for scheduled issues
    Timeline {
        #[arg(short, long)]
        project: Option<i64>,
        /// First day of the view (defaults to today)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day of the view (defaults to dashboard.timeline_days after --from)
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long)]
        json: bool,
    },

    /// Headline numbers for a project
    Stats {
        #[arg(short, long)]
        project: Option<i64>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ProjectCommands {
    /// Add a project
    Add {
        /// Short unique identifier
        identifier: String,
        /// Display name
        name: String,
    },
    /// List projects
    List,
}

#[derive(Subcommand)]
enum UserCommands {
    /// Add a user
    Add {
        name: String,
    },
    /// List users
    List,
}

/// Where the command runs: the discovered `.trackdash` directory and its configuration.
struct Workspace {
    dir: Option<PathBuf>,
    config: Config,
}

impl Workspace {
    fn load() -> Result<Self> {
        let dir = config::find_dir_from(&env::current_dir()?);
        let config = match &dir {
            Some(dir) => Config::load(dir)?,
            None => Config::from_env(),
        };
        Ok(Workspace { dir, config })
    }

    fn open_db(&self) -> Result<Database> {
        let Some(dir) = &self.dir else {
            bail!("Not a trackdash directory (or any parent). Run 'trackdash init' first.");
        };
        Database::open(&dir.join(DATABASE_FILE)).context("Failed to open database")
    }

    /// For commands that only make sense against the local tracker.
    fn local_db(&self) -> Result<Database> {
        if self.config.store.backend != Backend::Sqlite {
            bail!("This command needs the sqlite backend");
        }
        self.open_db()
    }

    fn store(&self) -> Result<Box<dyn IssueStore>> {
        match self.config.store.backend {
            Backend::Sqlite => Ok(Box::new(self.open_db()?)),
            Backend::Redmine => {
                let redmine = &self.config.redmine;
                let url = redmine.url.as_deref().unwrap_or_default();
                let store = RedmineStore::new(url, redmine.api_key.as_deref())?
                    .with_page_size(redmine.page_size);
                Ok(Box::new(store))
            }
        }
    }

    fn project(&self, flag: Option<i64>) -> Option<i64> {
        flag.or(self.config.dashboard.default_project)
    }

    fn filter(&self, flag: Option<i64>) -> IssueFilter {
        IssueFilter {
            project_id: self.project(flag),
            ..IssueFilter::default()
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Init runs before any config is read so it can repair a broken one.
    if let Commands::Init { force } = cli.command {
        logging::init(&LoggingConfig::default(), cli.log_json);
        let cwd = env::current_dir()?;
        return commands::init::run(&cwd, force);
    }

    let workspace = Workspace::load()?;
    logging::init(&workspace.config.logging, cli.log_json);
    workspace.config.validate()?;
    workspace.config.log_summary();
    debug!(dir = ?workspace.dir, "workspace resolved");

    match cli.command {
        Commands::Init { .. } => Ok(()),

        Commands::Project { action } => {
            let db = workspace.local_db()?;
            match action {
                ProjectCommands::Add { identifier, name } => {
                    commands::project::add(&db, &identifier, &name)
                }
                ProjectCommands::List => commands::project::list(&db),
            }
        }

        Commands::User { action } => {
            let db = workspace.local_db()?;
            match action {
                UserCommands::Add { name } => commands::user::add(&db, &name),
                UserCommands::List => commands::user::list(&db),
            }
        }

        Commands::Create {
            subject,
            project,
            description,
            tracker,
            status,
            priority,
            assign,
            start_date,
            due_date,
        } => {
            let Some(project_id) = workspace.project(project) else {
                bail!("No project given. Use --project or set dashboard.default_project");
            };
            let store = workspace.store()?;
            let issue = commands::create::NewIssue {
                project_id,
                subject: &subject,
                description: description.as_deref(),
                tracker_id: tracker,
                status_id: status,
                priority_id: priority,
                assignee: assign,
                start_date,
                due_date,
            };
            commands::create::run(store.as_ref(), &issue)
        }

        Commands::List { project, status } => {
            let store = workspace.store()?;
            let filter = workspace.filter(project).with_status(status);
            commands::list::run(store.as_ref(), &filter)
        }

        Commands::Show { id } => {
            let db = workspace.local_db()?;
            commands::show::run(&db, id)
        }

        Commands::Delete { id, force } => {
            let store = workspace.store()?;
            commands::delete::run(store.as_ref(), id, force)
        }

        Commands::BulkCreate {
            project,
            file,
            failed_out,
        } => {
            let Some(project_id) = workspace.project(project) else {
                bail!("No project given. Use --project or set dashboard.default_project");
            };
            let store = workspace.store()?;
            commands::bulk_create::run(
                store.as_ref(),
                project_id,
                file.as_deref(),
                failed_out.as_deref(),
            )
        }

        Commands::BulkEdit {
            ids,
            status,
            priority,
            tracker,
            assign,
            unassign,
            start_date,
            due_date,
            notes,
            project,
        } => {
            let mut payload = UpdatePayload {
                tracker_id: tracker,
                status_id: status,
                priority_id: priority,
                start_date,
                due_date,
                notes,
                ..UpdatePayload::default()
            };
            if let Some(user_id) = assign {
                payload = payload.assign_to(user_id);
            } else if unassign {
                payload = payload.unassign();
            }

            let store = workspace.store()?;
            commands::bulk_edit::run(store.as_ref(), &ids, &payload, &workspace.filter(project))
        }

        Commands::Trend {
            project,
            days,
            json,
        } => {
            let days = days.unwrap_or(workspace.config.dashboard.window_days);
            let store = workspace.store()?;
            commands::trend::run(store.as_ref(), &workspace.filter(project), days, json)
        }

        Commands::Timeline {
            project,
            from,
            to,
            json,
        } => {
            let from = from.unwrap_or_else(|| Utc::now().date_naive());
            let to = match to {
                Some(to) => to,
                None => {
                    let span = Days::new(u64::from(workspace.config.dashboard.timeline_days));
                    from.checked_add_days(span)
                        .context("--from is too close to the last representable date")?
                }
            };
            let store = workspace.store()?;
            commands::timeline::run(store.as_ref(), &workspace.filter(project), from, to, json)
        }

        Commands::Stats { project, json } => {
            let store = workspace.store()?;
            commands::stats::run(store.as_ref(), &workspace.filter(project), json)
        }
    }
}
