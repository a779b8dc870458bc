//! Error types shared across the application.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use crate::acp::message::JsonRpcError;

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// ACP framing or envelope encoding failure.
    Acp(String),
    /// `launch` was called while a child process is still running.
    AlreadyRunning,
    /// An outgoing call was attempted outside the running state, or the
    /// client was terminated while the call was outstanding.
    ProcessNotRunning,
    /// The agent process exited while the call was outstanding.
    ProcessExited(Option<i32>),
    /// Writing a message to the agent's stdin failed.
    Write(String),
    /// No response arrived before the caller's deadline.
    Timeout {
        /// Method of the request that timed out.
        method: String,
        /// Deadline that elapsed.
        after: Duration,
    },
    /// The agent answered with a JSON-RPC error object.
    Agent(JsonRpcError),
    /// A payload could not be decoded into the expected shape.
    Decode(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// File system path failed validation.
    PathViolation(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Acp(msg) => write!(f, "acp: {msg}"),
            Self::AlreadyRunning => write!(f, "process already running"),
            Self::ProcessNotRunning => write!(f, "process not running"),
            Self::ProcessExited(Some(code)) => write!(f, "process failed with exit code {code}"),
            Self::ProcessExited(None) => write!(f, "process failed (terminated by signal)"),
            Self::Write(msg) => write!(f, "write failed: {msg}"),
            Self::Timeout { method, after } => {
                write!(f, "request '{method}' timed out after {after:?}")
            }
            Self::Agent(err) => write!(f, "agent error {}: {}", err.code, err.message),
            Self::Decode(msg) => write!(f, "decode: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::PathViolation(msg) => write!(f, "path violation: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
