//! Configuration system for the `taskboard` binary.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskboard/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use taskboard_proto::ParseError;
use taskboard_proto::member::UserId;

use crate::backend::RetryConfig;
use crate::board::BoardConfig;
use crate::drag::TransitionTable;
use crate::mutation::ReconcilePolicy;
use crate::view::{PriorityFilter, SortKey, SortOrder, ViewParams};

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

    /// A setting has a value outside its allowed set.
    #[error("invalid value for {field}: {source}")]
    InvalidValue {
        /// Name of the setting.
        field: &'static str,
        /// Parse failure.
        source: ParseError,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    project: ProjectFileConfig,
    board: BoardFileConfig,
    view: ViewFileConfig,
    backend: BackendFileConfig,
}

/// `[project]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ProjectFileConfig {
    project_id: Option<String>,
    user_id: Option<String>,
}

/// `[board]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct BoardFileConfig {
    subtask_stale_secs: Option<u64>,
    reconcile_policy: Option<String>,
    serialize_same_task: Option<bool>,
    allow_backward_moves: Option<bool>,
    max_task_title_len: Option<usize>,
    event_buffer: Option<usize>,
}

/// `[view]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ViewFileConfig {
    sort_key: Option<String>,
    sort_order: Option<String>,
}

/// `[backend]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct BackendFileConfig {
    fetch_retries: Option<u32>,
    retry_backoff_ms: Option<u64>,
    latency_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Project --
    /// Project whose board is shown.
    pub project_id: String,
    /// Acting user.
    pub user_id: String,

    // -- Board --
    /// Staleness window of cached subtask lists.
    pub subtask_stale_after: Duration,
    /// Reconciliation of failed optimistic mutations.
    pub reconcile_policy: ReconcilePolicy,
    /// Serialize mutations on the same task.
    pub serialize_same_task: bool,
    /// Allow drags to an earlier column.
    pub allow_backward_moves: bool,
    /// Maximum task title length in characters.
    pub max_task_title_len: usize,
    /// Capacity of the board event channel.
    pub event_buffer: usize,

    // -- View --
    /// Initial view parameters.
    pub view: ViewParams,

    // -- Backend --
    /// Extra attempts for refetches after a transient failure.
    pub fetch_retries: u32,
    /// Delay between refetch attempts.
    pub retry_backoff: Duration,
    /// Artificial latency of the in-memory backend.
    pub latency: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            project_id: "demo".to_string(),
            user_id: "admin".to_string(),
            subtask_stale_after: Duration::from_secs(30),
            reconcile_policy: ReconcilePolicy::Refetch,
            serialize_same_task: true,
            allow_backward_moves: true,
            max_task_title_len: 256,
            event_buffer: 64,
            view: ViewParams::default(),
            fetch_retries: 1,
            retry_backoff: Duration::from_millis(200),
            latency: Duration::ZERO,
        }
    }
}

fn parse_setting<T>(field: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr<Err = ParseError>,
{
    value
        .parse()
        .map_err(|source| ConfigError::InvalidValue { field, source })
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// CLI args and env vars are parsed via `clap`. If `--config` is given
    /// and the file does not exist, returns an error. If no `--config` is
    /// given, the default path (`~/.config/taskboard/config.toml`) is tried
    /// and silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read or
    /// parsed, or a setting has an unknown value.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file)
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let policy = cli
            .policy
            .as_deref()
            .or(file.board.reconcile_policy.as_deref());
        let reconcile_policy = match policy {
            Some(value) => parse_setting("reconcile_policy", value)?,
            None => defaults.reconcile_policy,
        };
        let sort_key = match cli.sort_key.as_deref().or(file.view.sort_key.as_deref()) {
            Some(value) => parse_setting("sort_key", value)?,
            None => defaults.view.sort_key,
        };
        let sort_order = match cli.sort_order.as_deref().or(file.view.sort_order.as_deref()) {
            Some(value) => parse_setting("sort_order", value)?,
            None => defaults.view.sort_order,
        };
        let priority = match cli.priority.as_deref() {
            Some(value) => parse_setting("priority", value)?,
            None => PriorityFilter::All,
        };

        Ok(Self {
            project_id: cli
                .project_id
                .clone()
                .or_else(|| file.project.project_id.clone())
                .unwrap_or(defaults.project_id),
            user_id: cli
                .user_id
                .clone()
                .or_else(|| file.project.user_id.clone())
                .unwrap_or(defaults.user_id),
            subtask_stale_after: file
                .board
                .subtask_stale_secs
                .map_or(defaults.subtask_stale_after, Duration::from_secs),
            reconcile_policy,
            serialize_same_task: file
                .board
                .serialize_same_task
                .unwrap_or(defaults.serialize_same_task),
            allow_backward_moves: file
                .board
                .allow_backward_moves
                .unwrap_or(defaults.allow_backward_moves),
            max_task_title_len: file
                .board
                .max_task_title_len
                .unwrap_or(defaults.max_task_title_len),
            event_buffer: file.board.event_buffer.unwrap_or(defaults.event_buffer),
            view: ViewParams {
                search: cli.search.clone().unwrap_or_default(),
                priority,
                assignee: cli.assignee.as_deref().map(UserId::new),
                sort_key,
                sort_order,
            },
            fetch_retries: file
                .backend
                .fetch_retries
                .unwrap_or(defaults.fetch_retries),
            retry_backoff: file
                .backend
                .retry_backoff_ms
                .map_or(defaults.retry_backoff, Duration::from_millis),
            latency: file
                .backend
                .latency_ms
                .map_or(defaults.latency, Duration::from_millis),
        })
    }

    /// Retry behavior for refetches.
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            retries: self.fetch_retries,
            backoff: self.retry_backoff,
        }
    }

    /// Board settings derived from this configuration.
    #[must_use]
    pub fn board_config(&self) -> BoardConfig {
        BoardConfig {
            policy: self.reconcile_policy,
            serialize_same_task: self.serialize_same_task,
            transitions: TransitionTable::from_backward_moves(self.allow_backward_moves),
            subtask_stale_after: self.subtask_stale_after,
            max_task_title_len: self.max_task_title_len,
            retry: self.retry_config(),
            event_buffer: self.event_buffer,
            default_view: self.view.clone(),
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Task board state and synchronization engine")]
pub struct CliArgs {
    /// Project whose board to show.
    #[arg(long, env = "TASKBOARD_PROJECT")]
    pub project_id: Option<String>,

    /// Acting user identifier.
    #[arg(long, env = "TASKBOARD_USER")]
    pub user_id: Option<String>,

    /// Path to config file (default: `~/.config/taskboard/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Only show tasks whose title or description contains this text.
    #[arg(long)]
    pub search: Option<String>,

    /// Priority filter (all, low, medium, high).
    #[arg(long)]
    pub priority: Option<String>,

    /// Only show tasks assigned to this user.
    #[arg(long)]
    pub assignee: Option<String>,

    /// Sort key (createdAt, dueDate, priority, progress).
    #[arg(long)]
    pub sort_key: Option<String>,

    /// Sort order (asc, desc).
    #[arg(long)]
    pub sort_order: Option<String>,

    /// Reconciliation policy for failed mutations (refetch, rollback).
    #[arg(long)]
    pub policy: Option<String>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKBOARD_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/taskboard.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
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
        config_dir.join("taskboard").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
