//! Agent Client Protocol (ACP) engine.
//!
//! Drives an agent subprocess over newline-delimited JSON-RPC 2.0 on its
//! stdio. The layers, leaves first:
//!
//! - `codec`: byte-level newline framing for [`tokio_util::codec`].
//! - `reader` / `writer`: tasks that own the child's stdout and stdin.
//! - `interpreter` / `shell_env`: launch-time resolution of script
//!   interpreters and the user's login-shell environment.
//! - `process`: the process manager tying the above together.
//! - `message` / `schema`: envelopes and typed payloads.
//! - `rpc_error` / `router`: answers to agent-initiated requests.
//! - `client`: the orchestrator correlating requests and responses.

pub mod client;
pub mod codec;
pub mod interpreter;
pub mod message;
pub mod process;
pub mod reader;
pub mod router;
pub mod rpc_error;
pub mod schema;
pub mod shell_env;
pub mod writer;
