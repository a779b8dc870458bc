#![forbid(unsafe_code)]

//! `agent-conduit`: Agent Client Protocol engine.
//!
//! Launches an ACP agent subprocess, speaks newline-delimited JSON-RPC 2.0
//! over its stdio, and routes the agent's filesystem, permission and
//! terminal callbacks to host-supplied delegates.

pub mod acp;
pub mod config;
pub mod errors;
pub mod host;
pub mod persistence;

pub use config::ClientConfig;
pub use errors::{AppError, Result};
