//! Configuration for the `geotask` CLI.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/geotask/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::{Path, PathBuf};

use chrono::format::{Item, StrftimeItems};
use geotask_proto::task::{CategoryFilter, MAX_TASK_TITLE_LENGTH, SortOption};

use crate::tasks::{SyncSettings, ViewOptions};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// A value in the file is not one of the accepted spellings.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// Dotted key, e.g. `view.default_sort`.
        key: &'static str,
        /// The rejected value.
        value: String,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    store: StoreFileConfig,
    session: SessionFileConfig,
    view: ViewFileConfig,
    sync: SyncFileConfig,
}

/// `[store]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StoreFileConfig {
    path: Option<PathBuf>,
}

/// `[session]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SessionFileConfig {
    user_id: Option<String>,
}

/// `[view]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ViewFileConfig {
    default_sort: Option<String>,
    default_category: Option<String>,
    deadline_format: Option<String>,
}

/// `[sync]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SyncFileConfig {
    max_task_title_len: Option<usize>,
    error_buffer: Option<usize>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved CLI configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// JSON file holding every user's tasks.
    pub store_path: PathBuf,
    /// User the CLI acts as; `None` means no session.
    pub user_id: Option<String>,
    /// Sort applied by `list` unless overridden.
    pub default_sort: SortOption,
    /// Category filter applied by `list` unless overridden.
    pub default_category: CategoryFilter,
    /// How deadlines are printed (chrono format string).
    pub deadline_format: String,
    /// Maximum task title length in characters.
    pub max_task_title_len: usize,
    /// Capacity of the error report channel.
    pub error_buffer: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            user_id: None,
            default_sort: SortOption::ByPriority,
            default_category: CategoryFilter::All,
            deadline_format: "%Y-%m-%d %H:%M".to_string(),
            max_task_title_len: MAX_TASK_TITLE_LENGTH,
            error_buffer: 64,
        }
    }
}

impl AppConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read,
    /// if any config file cannot be parsed, or if it holds an unknown sort
    /// option, an invalid deadline format or a zero error buffer.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file)
    }

    /// Configuration from CLI arguments and env vars alone, used when the
    /// config file is unusable.
    #[must_use]
    pub fn from_cli(cli: &CliArgs) -> Self {
        let defaults = Self::default();
        Self {
            store_path: cli.store.clone().unwrap_or(defaults.store_path),
            user_id: cli.user.clone(),
            ..defaults
        }
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let default_sort = match &file.view.default_sort {
            Some(raw) => raw.parse::<SortOption>().map_err(|_| ConfigError::InvalidValue {
                key: "view.default_sort",
                value: raw.clone(),
            })?,
            None => defaults.default_sort,
        };

        let deadline_format = match &file.view.deadline_format {
            Some(raw) if StrftimeItems::new(raw).any(|item| matches!(item, Item::Error)) => {
                return Err(ConfigError::InvalidValue {
                    key: "view.deadline_format",
                    value: raw.clone(),
                });
            }
            Some(raw) => raw.clone(),
            None => defaults.deadline_format,
        };

        let error_buffer = match file.sync.error_buffer {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    key: "sync.error_buffer",
                    value: "0".to_string(),
                });
            }
            Some(n) => n,
            None => defaults.error_buffer,
        };

        Ok(Self {
            store_path: cli
                .store
                .clone()
                .or_else(|| file.store.path.clone())
                .unwrap_or(defaults.store_path),
            user_id: cli.user.clone().or_else(|| file.session.user_id.clone()),
            default_sort,
            default_category: file
                .view
                .default_category
                .as_deref()
                .map_or(defaults.default_category, CategoryFilter::from),
            deadline_format,
            max_task_title_len: file
                .sync
                .max_task_title_len
                .unwrap_or(defaults.max_task_title_len),
            error_buffer,
        })
    }

    /// Synchronizer settings derived from this configuration.
    #[must_use]
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            max_title_len: self.max_task_title_len,
            initial_options: ViewOptions {
                filter: self.default_category.clone(),
                sort: self.default_sort,
            },
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Location-aware to-do list")]
pub struct CliArgs {
    /// Path to config file (default: `~/.config/geotask/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// User id to act as.
    #[arg(long, env = "GEOTASK_USER")]
    pub user: Option<String>,

    /// Path to the JSON task store.
    #[arg(long, env = "GEOTASK_STORE")]
    pub store: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "GEOTASK_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/geotask.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// What to do; `list` when omitted.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the task list.
    List {
        /// Only show this category (`All` for every category).
        #[arg(long)]
        category: Option<String>,
        /// by-priority, by-deadline, by-created-at or by-category.
        #[arg(long)]
        sort: Option<SortOption>,
    },
    /// Create a task.
    Add {
        /// Task title.
        title: String,
        /// Task category.
        #[arg(long, default_value = "Others")]
        category: String,
        /// Deadline as `YYYY-MM-DD` or `YYYY-MM-DD HH:MM` (local time).
        #[arg(long)]
        deadline: String,
    },
    /// Replace title, category and deadline of a task.
    Edit {
        /// Task id as printed by `list`.
        id: String,
        /// New title.
        title: String,
        /// New category.
        #[arg(long, default_value = "Others")]
        category: String,
        /// New deadline.
        #[arg(long)]
        deadline: String,
    },
    /// Delete a task.
    Delete {
        /// Task id as printed by `list`.
        id: String,
    },
    /// Read `latitude longitude` lines from stdin and record them as the
    /// last-known location.
    Track,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("geotask")
        .join("tasks.json")
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("geotask").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
