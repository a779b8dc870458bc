//! Client configuration parsing and validation.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Interpreter lookup settings for agents shipped as scripts.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct InterpreterConfig {
    /// Interpreter binary name matched against the script's shebang.
    #[serde(default = "default_interpreter_name")]
    pub name: String,
    /// Directories searched in order for the interpreter binary.
    ///
    /// Entries may start with `~/` and may contain glob patterns.
    #[serde(default = "default_search_dirs")]
    pub search_dirs: Vec<String>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            name: default_interpreter_name(),
            search_dirs: default_search_dirs(),
        }
    }
}

fn default_interpreter_name() -> String {
    "node".into()
}

fn default_search_dirs() -> Vec<String> {
    vec![
        "/opt/homebrew/bin".into(),
        "/usr/local/bin".into(),
        "/usr/bin".into(),
        "~/.volta/bin".into(),
        "~/.nvm/versions/node/*/bin".into(),
        "~/.local/share/fnm/aliases/default/bin".into(),
        "~/.asdf/shims".into(),
    ]
}

/// How the local host answers `session/request_permission`.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PermissionPolicy {
    /// Ask the operator on the controlling terminal.
    #[default]
    Ask,
    /// Always pick the first "allow" option offered by the agent.
    Allow,
    /// Always pick the first "reject" option offered by the agent.
    Reject,
}

/// Permission handling for the local host delegate.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PermissionConfig {
    /// Policy applied to every permission request.
    #[serde(default)]
    pub policy: PermissionPolicy,
}

/// Session-id persistence settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StorageConfig {
    /// `SQLite` database file holding saved session ids.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.agent-conduit/sessions.db".into()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_client_name() -> String {
    "agent-conduit".into()
}

/// Configuration for one ACP client instance, parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ClientConfig {
    /// Agent executable or script.
    pub agent_path: PathBuf,
    /// Arguments passed to the agent.
    #[serde(default)]
    pub agent_args: Vec<String>,
    /// Working directory for the agent; defaults to the current directory.
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
    /// Default deadline for every request except `session/prompt`; 0 disables.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Mirror raw traffic onto the debug stream.
    #[serde(default)]
    pub debug_stream: bool,
    /// `clientInfo.name` sent during `initialize`.
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// `clientInfo.title` sent during `initialize`.
    #[serde(default)]
    pub client_title: Option<String>,
    /// Interpreter lookup for script agents.
    #[serde(default)]
    pub interpreter: InterpreterConfig,
    /// Permission policy for the local host delegate.
    #[serde(default)]
    pub permissions: PermissionConfig,
    /// Session-id persistence.
    #[serde(default)]
    pub storage: StorageConfig,
}

impl ClientConfig {
    /// Build a configuration with defaults for everything but the agent path.
    #[must_use]
    pub fn for_agent(agent_path: impl Into<PathBuf>) -> Self {
        Self {
            agent_path: agent_path.into(),
            agent_args: Vec::new(),
            working_directory: None,
            request_timeout_seconds: default_request_timeout(),
            debug_stream: false,
            client_name: default_client_name(),
            client_title: None,
            interpreter: InterpreterConfig::default(),
            permissions: PermissionConfig::default(),
            storage: StorageConfig::default(),
        }
    }

    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Default request deadline, or `None` when disabled.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_seconds > 0).then(|| Duration::from_secs(self.request_timeout_seconds))
    }

    /// Absolute path of the session database with `~` expanded.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        expand_home(&self.storage.db_path)
    }

    fn validate(&mut self) -> Result<()> {
        if self.agent_path.as_os_str().is_empty() {
            return Err(AppError::Config("agent_path must not be empty".into()));
        }

        if self.client_name.trim().is_empty() {
            return Err(AppError::Config("client_name must not be empty".into()));
        }

        if let Some(dir) = &self.working_directory {
            let canonical = dir
                .canonicalize()
                .map_err(|err| AppError::Config(format!("working_directory invalid: {err}")))?;
            self.working_directory = Some(canonical);
        }

        Ok(())
    }
}

/// Expand a leading `~/` against `$HOME`.
///
/// Paths without the prefix, or a missing `HOME`, are returned unchanged.
#[must_use]
pub fn expand_home(raw: &str) -> PathBuf {
    match (raw.strip_prefix("~/"), env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(raw),
    }
}
