//! `geotask`: command-line front-end for the task list.
//!
//! Acts as one user against a JSON file store. Configuration via CLI flags,
//! environment variables, or config file (`~/.config/geotask/config.toml`).
//!
//! ```bash
//! geotask --user alice add "Buy milk" --category Grocery --deadline 2026-05-01
//! geotask --user alice list --sort by-deadline
//! GEOTASK_USER=alice geotask delete 0190c1c2-...
//! printf '52.52 13.40\n' | geotask --user alice track
//! ```

use std::fmt::Write as _;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime, TimeZone};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_appender::non_blocking::WorkerGuard;

use geotask::config::{AppConfig, CliArgs, Command};
use geotask::location::LocationTracker;
use geotask::observe::{ChannelSink, ErrorReport, TracingSink};
use geotask::profile::{InMemoryProfileStore, ProfileError, ProfileStore};
use geotask::session::StaticSession;
use geotask::store::file::JsonFileStore;
use geotask::tasks::{SkipReason, SyncCommand, SyncError, SyncOutcome, TaskSynchronizer};
use geotask_proto::task::{Category, CategoryFilter, Task, TaskId};
use geotask_proto::user::{LocationFix, UserId};

const SAVE_WAIT: Duration = Duration::from_secs(5);

type CliSync = TaskSynchronizer<JsonFileStore, StaticSession, ChannelSink>;

/// Failures that end the CLI with a non-zero exit code.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("no user given; pass --user or set GEOTASK_USER")]
    NoUser,
    #[error("invalid deadline {0:?}; expected YYYY-MM-DD or YYYY-MM-DD HH:MM")]
    InvalidDeadline(String),
    #[error("invalid task id {0:?}")]
    InvalidTaskId(String),
    #[error("{0}")]
    Skipped(&'static str),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error("failed to read stdin: {0}")]
    Stdin(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    // Load and resolve configuration (CLI args > env > config file > defaults).
    let config = match AppConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            AppConfig::from_cli(&cli)
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!(store = %config.store_path.display(), "geotask starting");

    let command = cli.command.clone().unwrap_or(Command::List {
        category: None,
        sort: None,
    });
    match run(command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Logs are written to a file so stdout stays clean for command output.
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("geotask.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

async fn run(command: Command, config: &AppConfig) -> Result<(), CliError> {
    let user = config.user_id.clone().map(UserId::new).ok_or(CliError::NoUser)?;

    if command == Command::Track {
        return track(user).await;
    }

    let (sink, mut reports) = ChannelSink::new(config.error_buffer);
    let sync: CliSync = TaskSynchronizer::with_settings(
        JsonFileStore::new(&config.store_path),
        StaticSession::signed_in(user),
        sink,
        config.sync_settings(),
    );

    let result = execute(&sync, command, config).await;
    while let Ok(ErrorReport { operation, detail }) = reports.try_recv() {
        tracing::debug!(operation, %detail, "reported");
    }
    result
}

async fn execute(sync: &CliSync, command: Command, config: &AppConfig) -> Result<(), CliError> {
    match command {
        Command::List { category, sort } => {
            let mut commands = Vec::new();
            if let Some(category) = category {
                commands.push(SyncCommand::SetCategoryFilter(CategoryFilter::from(
                    category.as_str(),
                )));
            }
            if let Some(sort) = sort {
                commands.push(SyncCommand::SetSortOption(sort));
            }
            if commands.is_empty() {
                commands.push(SyncCommand::Refresh);
            }
            for command in commands {
                expect_applied(sync.execute(command).await?)?;
            }
            print_tasks(sync.view().tasks(), &config.deadline_format);
        }
        Command::Add {
            title,
            category,
            deadline,
        } => {
            let deadline = parse_deadline(&deadline)?;
            let id = sync
                .add(&title, Category::from(category), deadline)
                .await?
                .ok_or(CliError::Skipped("task title is empty or too long"))?;
            println!("added {id}");
        }
        Command::Edit {
            id,
            title,
            category,
            deadline,
        } => {
            let command = SyncCommand::Edit {
                id: parse_id(&id)?,
                title,
                category: Category::from(category),
                deadline: parse_deadline(&deadline)?,
            };
            expect_applied(sync.execute(command).await?)?;
            println!("updated {id}");
        }
        Command::Delete { id } => {
            let command = SyncCommand::Delete { id: parse_id(&id)? };
            expect_applied(sync.execute(command).await?)?;
            println!("deleted {id}");
        }
        Command::Track => {}
    }
    Ok(())
}

/// Saves every `latitude longitude` line from stdin through a location
/// tracker and prints the last saved fix.
async fn track(user: UserId) -> Result<(), CliError> {
    let profiles = Arc::new(InMemoryProfileStore::new());
    let tracker = LocationTracker::new(
        Arc::clone(&profiles),
        StaticSession::signed_in(user.clone()),
        TracingSink,
    );
    let fixes = tracker.start().await?;
    let mut saved = tracker.saved_count();

    let mut sent = 0u64;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let Some(fix) = parse_fix(&line) else {
            eprintln!("skipping {line:?}: expected `latitude longitude`");
            continue;
        };
        if fixes.send(fix).await.is_ok() {
            sent += 1;
        }
    }

    // Failed saves are only reported, so do not wait for them forever.
    if tokio::time::timeout(SAVE_WAIT, saved.wait_for(|n| *n >= sent))
        .await
        .is_err()
    {
        tracing::warn!(sent, "not every location fix was saved");
    }
    tracker.stop().await?;

    match profiles.last_location(&user).await.map_err(ProfileError::from)? {
        Some(fix) => println!(
            "recorded {sent} fix(es), last at {:.5}, {:.5}",
            fix.latitude, fix.longitude
        ),
        None => println!("no location recorded"),
    }
    Ok(())
}

fn parse_fix(line: &str) -> Option<LocationFix> {
    let mut parts = line.split_whitespace();
    let latitude: f64 = parts.next()?.parse().ok()?;
    let longitude: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || !(-90.0..=90.0).contains(&latitude)
        || !(-180.0..=180.0).contains(&longitude)
    {
        return None;
    }
    Some(LocationFix {
        latitude,
        longitude,
        timestamp: u64::try_from(Local::now().timestamp_millis()).unwrap_or(0),
    })
}

fn expect_applied(outcome: SyncOutcome) -> Result<(), CliError> {
    match outcome {
        SyncOutcome::Applied | SyncOutcome::Skipped(SkipReason::Superseded) => Ok(()),
        SyncOutcome::Skipped(SkipReason::NotAuthenticated) => {
            Err(CliError::Skipped("not signed in"))
        }
        SyncOutcome::Skipped(SkipReason::InvalidTitle(_)) => {
            Err(CliError::Skipped("task title is empty or too long"))
        }
    }
}

fn parse_id(raw: &str) -> Result<TaskId, CliError> {
    raw.parse()
        .map_err(|_| CliError::InvalidTaskId(raw.to_string()))
}

/// Parses a local date or date-time into milliseconds since epoch.
fn parse_deadline(raw: &str) -> Result<u64, CliError> {
    let invalid = || CliError::InvalidDeadline(raw.to_string());
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M")
        .or_else(|_| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default())
        })
        .map_err(|_| invalid())?;
    let local = Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(invalid)?;
    u64::try_from(local.timestamp_millis()).map_err(|_| invalid())
}

/// Formats a deadline for display, falling back to the raw milliseconds
/// when the time is out of range or `format` is not a valid pattern.
fn format_deadline(deadline: u64, format: &str) -> String {
    let Some(time) = i64::try_from(deadline)
        .ok()
        .and_then(|ms| Local.timestamp_millis_opt(ms).single())
    else {
        return deadline.to_string();
    };
    let mut out = String::new();
    match write!(out, "{}", time.format(format)) {
        Ok(()) => out,
        Err(_) => deadline.to_string(),
    }
}

fn print_tasks(tasks: &[Task], deadline_format: &str) {
    if tasks.is_empty() {
        println!("no tasks");
        return;
    }
    for task in tasks {
        println!(
            "{}  {}  [{}]  {}",
            task.id,
            format_deadline(task.deadline, deadline_format),
            task.category,
            task.title
        );
    }
}
