//! Dispatch of agent-initiated requests to host delegates.
//!
//! The agent calls back into the client for filesystem access, permission
//! prompts and terminal control. [`RequestRouter`] decodes the params for
//! each known method, invokes the matching delegate, and shapes the outcome
//! into a JSON-RPC result or error object. It holds no state apart from the
//! delegate handles.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::acp::message::JsonRpcError;
use crate::acp::rpc_error;
use crate::acp::schema::{
    methods, CreateTerminalRequest, CreateTerminalResponse, ReadTextFileRequest,
    ReadTextFileResponse, RequestPermissionRequest, RequestPermissionResponse, TerminalExitStatus,
    TerminalOutputResponse, TerminalRequest, WriteTextFileRequest,
};
use crate::Result;

/// Boxed future returned by delegate methods.
pub type DelegateFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Host services for filesystem access and permission prompts.
pub trait ClientDelegate: Send + Sync {
    /// Read a text file, optionally a line window of it.
    ///
    /// # Errors
    ///
    /// Any error is reported to the agent as an internal error.
    fn read_text_file(&self, request: ReadTextFileRequest) -> DelegateFuture<'_, ReadTextFileResponse>;

    /// Write (create or replace) a text file.
    ///
    /// # Errors
    ///
    /// Any error is reported to the agent as an internal error.
    fn write_text_file(&self, request: WriteTextFileRequest) -> DelegateFuture<'_, ()>;

    /// Ask the user to approve a tool call.
    ///
    /// # Errors
    ///
    /// Any error is reported to the agent as an internal error.
    fn request_permission(
        &self,
        request: RequestPermissionRequest,
    ) -> DelegateFuture<'_, RequestPermissionResponse>;
}

/// Host services for agent-controlled terminals.
pub trait TerminalDelegate: Send + Sync {
    /// Start a command and return its terminal handle.
    ///
    /// # Errors
    ///
    /// Any error is reported to the agent as an internal error.
    fn create_terminal(
        &self,
        request: CreateTerminalRequest,
    ) -> DelegateFuture<'_, CreateTerminalResponse>;

    /// Output captured so far.
    ///
    /// # Errors
    ///
    /// Any error is reported to the agent as an internal error.
    fn terminal_output(&self, request: TerminalRequest) -> DelegateFuture<'_, TerminalOutputResponse>;

    /// Wait until the command exits.
    ///
    /// # Errors
    ///
    /// Any error is reported to the agent as an internal error.
    fn wait_for_terminal_exit(
        &self,
        request: TerminalRequest,
    ) -> DelegateFuture<'_, TerminalExitStatus>;

    /// Kill the command but keep its output available.
    ///
    /// # Errors
    ///
    /// Any error is reported to the agent as an internal error.
    fn kill_terminal(&self, request: TerminalRequest) -> DelegateFuture<'_, ()>;

    /// Kill the command if needed and forget the terminal.
    ///
    /// # Errors
    ///
    /// Any error is reported to the agent as an internal error.
    fn release_terminal(&self, request: TerminalRequest) -> DelegateFuture<'_, ()>;
}

/// Method-name router for agent-initiated requests.
#[derive(Clone)]
pub struct RequestRouter {
    client: Arc<dyn ClientDelegate>,
    terminal: Option<Arc<dyn TerminalDelegate>>,
}

impl std::fmt::Debug for RequestRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestRouter")
            .field("terminal", &self.terminal.is_some())
            .finish_non_exhaustive()
    }
}

impl RequestRouter {
    /// Router without terminal support.
    #[must_use]
    pub fn new(client: Arc<dyn ClientDelegate>) -> Self {
        Self {
            client,
            terminal: None,
        }
    }

    /// Install a terminal delegate.
    #[must_use]
    pub fn with_terminal(mut self, terminal: Arc<dyn TerminalDelegate>) -> Self {
        self.terminal = Some(terminal);
        self
    }

    /// Whether `terminal/*` methods are served.
    #[must_use]
    pub fn has_terminal(&self) -> bool {
        self.terminal.is_some()
    }

    /// Handle one agent-initiated request.
    ///
    /// # Errors
    ///
    /// - `-32601` for unknown methods, and for terminal methods when no
    ///   terminal delegate is installed.
    /// - `-32602` when the params do not decode.
    /// - `-32603` when the delegate fails.
    pub async fn route(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> std::result::Result<Value, JsonRpcError> {
        debug!(method, "router: dispatching agent request");
        match method {
            methods::FS_READ_TEXT_FILE => {
                let request = decode_params(params)?;
                shape(self.client.read_text_file(request).await, method)
            }
            methods::FS_WRITE_TEXT_FILE => {
                let request = decode_params(params)?;
                empty(self.client.write_text_file(request).await, method)
            }
            methods::SESSION_REQUEST_PERMISSION => {
                let request = decode_params(params)?;
                shape(self.client.request_permission(request).await, method)
            }
            methods::TERMINAL_CREATE => {
                let terminal = self.terminal(method)?;
                let request = decode_params(params)?;
                shape(terminal.create_terminal(request).await, method)
            }
            methods::TERMINAL_OUTPUT => {
                let terminal = self.terminal(method)?;
                let request = decode_params(params)?;
                shape(terminal.terminal_output(request).await, method)
            }
            methods::TERMINAL_WAIT_FOR_EXIT => {
                let terminal = self.terminal(method)?;
                let request = decode_params(params)?;
                shape(terminal.wait_for_terminal_exit(request).await, method)
            }
            methods::TERMINAL_KILL => {
                let terminal = self.terminal(method)?;
                let request = decode_params(params)?;
                empty(terminal.kill_terminal(request).await, method)
            }
            methods::TERMINAL_RELEASE => {
                let terminal = self.terminal(method)?;
                let request = decode_params(params)?;
                empty(terminal.release_terminal(request).await, method)
            }
            other => {
                debug!(method = other, "router: unknown method");
                Err(rpc_error::method_not_found(other))
            }
        }
    }

    fn terminal(&self, method: &str) -> std::result::Result<&Arc<dyn TerminalDelegate>, JsonRpcError> {
        self.terminal
            .as_ref()
            .ok_or_else(|| rpc_error::method_not_found(method))
    }
}

// ── Private helpers ──────────────────────────────────────────────────────────

fn decode_params<T: DeserializeOwned>(params: Option<Value>) -> std::result::Result<T, JsonRpcError> {
    serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|e| rpc_error::invalid_params(e.to_string()))
}

fn shape<T: Serialize>(outcome: Result<T>, method: &str) -> std::result::Result<Value, JsonRpcError> {
    match outcome {
        Ok(payload) => serde_json::to_value(payload).map_err(|e| rpc_error::internal_error(&e)),
        Err(err) => {
            warn!(method, %err, "router: delegate failed");
            Err(rpc_error::internal_error(&err))
        }
    }
}

fn empty(outcome: Result<()>, method: &str) -> std::result::Result<Value, JsonRpcError> {
    shape(outcome.map(|()| json!({})), method)
}
