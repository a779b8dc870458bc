//! ACP protocol client.
//!
//! [`AcpClient`] drives one agent process through its lifecycle:
//!
//! ```text
//! NotLaunched ──launch──▶ Running ──terminate / child exit──▶ Terminated
//! ```
//!
//! Outgoing requests get monotonically increasing numeric ids and a pending
//! entry that is registered before the line is written. A single dispatch
//! task consumes the process event channel in wire order:
//!
//! - responses resolve the matching pending entry,
//! - notifications are published on an unbounded stream,
//! - agent requests go through the [`RequestRouter`] and are answered with
//!   the original id.
//!
//! All mutable state sits behind one [`Mutex`], so no two operations ever
//! observe or mutate the pending table at the same time.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::acp::interpreter::ShebangProbe;
use crate::acp::message::{
    decode_inbound, detect_method, from_value, to_value, Inbound, JsonRpcError, Notification,
    Request, RequestId,
};
use crate::acp::process::{EnvSource, MessageWriter, ProcessEvent, ProcessManager};
use crate::acp::router::{DelegateFuture, RequestRouter};
use crate::acp::rpc_error::into_response;
use crate::acp::schema::{
    methods, AuthenticateRequest, CancelNotification, ClientCapabilities, ContentBlock,
    FileSystemCapability, Implementation, InitializeRequest, InitializeResponse,
    LoadSessionOutcome, LoadSessionRequest, LoadSessionResponse, McpServer, NewSessionRequest,
    NewSessionResponse, PromptRequest, PromptResponse, SessionConfigOption, SessionId,
    SetSessionConfigOptionRequest, SetSessionConfigOptionResponse, SetSessionModeRequest,
    SetSessionModelRequest, PROTOCOL_VERSION,
};
use crate::{AppError, ClientConfig, Result};

/// Error-text fragments that mean "the session is already loaded".
const ALREADY_ACTIVE_MARKERS: [&str; 3] = ["already active", "already started", "already exists"];

/// Direction of a mirrored payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Agent to client.
    Incoming,
    /// Client to agent.
    Outgoing,
}

/// One raw payload mirrored on the debug stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugMessage {
    /// Which way the payload travelled.
    pub direction: Direction,
    /// When it was observed.
    pub timestamp: DateTime<Utc>,
    /// Payload bytes without the line terminator.
    pub raw: Bytes,
    /// Method name, when the payload has one.
    pub method: Option<String>,
}

/// Persistence of the agent session id per host-defined key.
pub trait SessionStore: Send + Sync {
    /// Remember `session_id` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Db`] on storage failure.
    fn save<'a>(&'a self, key: &'a str, session_id: &'a SessionId) -> DelegateFuture<'a, ()>;

    /// Forget the id stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Db`] on storage failure.
    fn clear<'a>(&'a self, key: &'a str) -> DelegateFuture<'a, ()>;

    /// Id stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Db`] on storage failure.
    fn get<'a>(&'a self, key: &'a str) -> DelegateFuture<'a, Option<SessionId>>;
}

/// How [`AcpClient::resume_or_create`] obtained its session.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumedSession {
    /// A stored session was loaded.
    Loaded(LoadSessionOutcome),
    /// A fresh session was created and stored.
    Created(NewSessionResponse),
}

impl ResumedSession {
    /// Id of the session in use.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::Loaded(outcome) => &outcome.session_id,
            Self::Created(response) => &response.session_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    NotLaunched,
    Running,
    Terminated,
}

type PendingSender = oneshot::Sender<Result<Value>>;

struct ClientState {
    run: RunState,
    /// Bumped on every launch so a stale dispatch task cannot touch a newer run.
    generation: u64,
    next_id: i64,
    pending: HashMap<RequestId, PendingSender>,
    process: ProcessManager,
    writer: Option<MessageWriter>,
    notification_tx: Option<mpsc::UnboundedSender<Notification>>,
    notification_rx: Option<mpsc::UnboundedReceiver<Notification>>,
    debug_tx: Option<mpsc::UnboundedSender<DebugMessage>>,
    debug_rx: Option<mpsc::UnboundedReceiver<DebugMessage>>,
    dispatch: Option<CancellationToken>,
}

impl ClientState {
    fn open_streams(&mut self, debug_enabled: bool) {
        if self.notification_tx.is_none() {
            let (tx, rx) = mpsc::unbounded_channel();
            self.notification_tx = Some(tx);
            self.notification_rx = Some(rx);
        }
        if debug_enabled && self.debug_tx.is_none() {
            let (tx, rx) = mpsc::unbounded_channel();
            self.debug_tx = Some(tx);
            self.debug_rx = Some(rx);
        }
    }

    fn close_streams(&mut self) {
        self.writer = None;
        self.notification_tx = None;
        self.debug_tx = None;
    }

    fn fail_pending(&mut self, reason: impl Fn() -> AppError) -> usize {
        let count = self.pending.len();
        for (_, tx) in self.pending.drain() {
            // The caller may already have given up; nothing to do then.
            let _ = tx.send(Err(reason()));
        }
        count
    }

    fn mirror(&self, direction: Direction, raw: &[u8], method: Option<String>) {
        if let Some(tx) = &self.debug_tx {
            let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
            let _ = tx.send(DebugMessage {
                direction,
                timestamp: Utc::now(),
                raw: Bytes::copy_from_slice(raw),
                method,
            });
        }
    }
}

struct Inner {
    config: ClientConfig,
    router: RequestRouter,
    state: Mutex<ClientState>,
}

/// Client side of one ACP connection.
pub struct AcpClient {
    inner: Arc<Inner>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for AcpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcpClient")
            .field("agent_path", &self.inner.config.agent_path)
            .field("router", &self.inner.router)
            .finish_non_exhaustive()
    }
}

impl AcpClient {
    /// Client for the agent described by `config`, launched with the
    /// configured interpreter probe and the login-shell environment.
    #[must_use]
    pub fn new(config: ClientConfig, router: RequestRouter) -> Self {
        let label = agent_label(&config.agent_path);
        let process = ProcessManager::new(label)
            .with_probe(Arc::new(ShebangProbe::from_config(&config.interpreter)));
        Self::with_process(config, router, process)
    }

    /// Like [`AcpClient::new`] but with the agent inheriting this process's
    /// environment instead of the login shell's.
    #[must_use]
    pub fn with_inherited_env(config: ClientConfig, router: RequestRouter) -> Self {
        let label = agent_label(&config.agent_path);
        let process = ProcessManager::new(label)
            .with_probe(Arc::new(ShebangProbe::from_config(&config.interpreter)))
            .with_env_source(EnvSource::Inherit);
        Self::with_process(config, router, process)
    }

    /// Client using a pre-configured process manager.
    #[must_use]
    pub fn with_process(config: ClientConfig, router: RequestRouter, process: ProcessManager) -> Self {
        let mut state = ClientState {
            run: RunState::NotLaunched,
            generation: 0,
            next_id: 1,
            pending: HashMap::new(),
            process,
            writer: None,
            notification_tx: None,
            notification_rx: None,
            debug_tx: None,
            debug_rx: None,
            dispatch: None,
        };
        state.open_streams(config.debug_stream);

        Self {
            inner: Arc::new(Inner {
                config,
                router,
                state: Mutex::new(state),
            }),
            shutdown: CancellationToken::new(),
        }
    }

    /// Configuration the client was built with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Launch the configured agent and start dispatching its output.
    ///
    /// A client may be launched again after it terminated; the notification
    /// and debug streams of the previous run are closed by then, so take
    /// them again after relaunching.
    ///
    /// # Errors
    ///
    /// - [`AppError::AlreadyRunning`] if the agent is running.
    /// - [`AppError::Io`] if the process cannot be started.
    pub async fn launch(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        if state.run == RunState::Running {
            return Err(AppError::AlreadyRunning);
        }

        let config = &self.inner.config;
        let events = state
            .process
            .launch(
                &config.agent_path,
                &config.agent_args,
                config.working_directory.as_deref(),
            )
            .await?;
        let writer = state.process.writer().ok_or(AppError::ProcessNotRunning)?;

        state.generation += 1;
        state.run = RunState::Running;
        state.writer = Some(writer);
        state.open_streams(config.debug_stream);

        let cancel = self.shutdown.child_token();
        state.dispatch = Some(cancel.clone());
        tokio::spawn(dispatch_loop(
            Arc::clone(&self.inner),
            events,
            state.generation,
            cancel,
        ));

        info!(
            agent = %config.agent_path.display(),
            pid = state.process.pid(),
            "acp client: agent launched"
        );
        Ok(())
    }

    /// Stop the agent and fail every pending request with
    /// [`AppError::ProcessNotRunning`].
    ///
    /// Closes the notification and debug streams. Safe to call repeatedly.
    pub async fn terminate(&self) {
        let mut state = self.inner.state.lock().await;
        state.process.terminate();
        if let Some(cancel) = state.dispatch.take() {
            cancel.cancel();
        }
        if state.run == RunState::Running {
            state.run = RunState::Terminated;
        }
        let failed = state.fail_pending(|| AppError::ProcessNotRunning);
        state.close_streams();
        if failed > 0 {
            info!(failed, "acp client: terminated with pending requests");
        }
    }

    /// Whether the agent is running.
    pub async fn is_running(&self) -> bool {
        self.inner.state.lock().await.run == RunState::Running
    }

    /// Number of requests awaiting a response.
    pub async fn pending_count(&self) -> usize {
        self.inner.state.lock().await.pending.len()
    }

    /// Receiver of agent notifications, in wire order.
    ///
    /// Returns `None` if it was already taken for the current run.
    pub async fn take_notifications(&self) -> Option<mpsc::UnboundedReceiver<Notification>> {
        self.inner.state.lock().await.notification_rx.take()
    }

    /// Receiver of mirrored raw payloads.
    ///
    /// Returns `None` unless `debug_stream` is enabled, or if it was
    /// already taken for the current run.
    pub async fn take_debug_messages(&self) -> Option<mpsc::UnboundedReceiver<DebugMessage>> {
        self.inner.state.lock().await.debug_rx.take()
    }

    // ── Raw messaging ────────────────────────────────────────────────────────

    /// Send a request and wait for its response.
    ///
    /// The pending entry is registered before the line is written. With a
    /// `timeout`, the entry is dropped once it expires; a timed-out
    /// `session/prompt` is additionally cancelled on the agent side.
    ///
    /// # Errors
    ///
    /// - [`AppError::ProcessNotRunning`] if the agent is not running, or is
    ///   terminated while the request is pending.
    /// - [`AppError::ProcessExited`] if the agent exits while it is pending.
    /// - [`AppError::Write`] if the request cannot be written.
    /// - [`AppError::Timeout`] if `timeout` expires first.
    /// - [`AppError::Agent`] if the agent answers with an error.
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let prompt_session = (method == methods::SESSION_PROMPT)
            .then(|| params.as_ref().and_then(|p| p.get("sessionId")))
            .flatten()
            .and_then(Value::as_str)
            .map(SessionId::from);

        let (id, rx, writer, line) = {
            let mut state = self.inner.state.lock().await;
            if state.run != RunState::Running {
                return Err(AppError::ProcessNotRunning);
            }
            let writer = state.writer.clone().ok_or(AppError::ProcessNotRunning)?;
            let id = RequestId::Number(state.next_id);
            state.next_id += 1;

            let line = Request {
                id: id.clone(),
                method: method.to_owned(),
                params,
            }
            .encode_line()?;

            let (tx, rx) = oneshot::channel();
            state.pending.insert(id.clone(), tx);
            state.mirror(Direction::Outgoing, &line, Some(method.to_owned()));
            (id, rx, writer, line)
        };

        debug!(method, %id, "acp client: sending request");
        if let Err(err) = writer.write_line(line).await {
            self.inner.state.lock().await.pending.remove(&id);
            return Err(err);
        }

        let outcome = self.await_response(method, &id, rx, timeout).await;
        if let (Err(AppError::Timeout { .. }), Some(session_id)) = (&outcome, prompt_session) {
            if let Err(err) = self.cancel_session(&session_id).await {
                debug!(%session_id, %err, "acp client: cancel after prompt timeout failed");
            }
        }
        outcome
    }

    /// Send a notification.
    ///
    /// # Errors
    ///
    /// - [`AppError::ProcessNotRunning`] if the agent is not running.
    /// - [`AppError::Write`] if the line cannot be written.
    pub async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<()> {
        let (writer, line) = {
            let state = self.inner.state.lock().await;
            if state.run != RunState::Running {
                return Err(AppError::ProcessNotRunning);
            }
            let writer = state.writer.clone().ok_or(AppError::ProcessNotRunning)?;
            let line = Notification {
                method: method.to_owned(),
                params,
            }
            .encode_line()?;
            state.mirror(Direction::Outgoing, &line, Some(method.to_owned()));
            (writer, line)
        };
        debug!(method, "acp client: sending notification");
        writer.write_line(line).await
    }

    /// Process one inbound line as if the agent had written it.
    pub async fn handle_message(&self, raw: &[u8]) {
        self.inner.handle_message(raw).await;
    }

    // ── Protocol operations ──────────────────────────────────────────────────

    /// Negotiate the protocol version and exchange capabilities.
    ///
    /// Without explicit `capabilities` the client advertises filesystem
    /// read/write and, when a terminal delegate is installed, terminals.
    ///
    /// # Errors
    ///
    /// See [`AcpClient::send_request`]; [`AppError::Decode`] if the result
    /// is not an initialize response.
    pub async fn initialize(
        &self,
        capabilities: Option<ClientCapabilities>,
    ) -> Result<InitializeResponse> {
        let config = &self.inner.config;
        let capabilities = capabilities.unwrap_or_else(|| ClientCapabilities {
            fs: FileSystemCapability {
                read_text_file: true,
                write_text_file: true,
            },
            terminal: self.inner.router.has_terminal(),
            meta: None,
        });
        let request = InitializeRequest {
            protocol_version: PROTOCOL_VERSION,
            client_capabilities: capabilities,
            client_info: Some(Implementation {
                name: config.client_name.clone(),
                title: config.client_title.clone(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
            }),
            meta: None,
        };

        let response: InitializeResponse = self
            .call_typed(methods::INITIALIZE, &request, config.request_timeout())
            .await?;
        info!(
            protocol_version = response.protocol_version,
            load_session = response.agent_capabilities.load_session,
            auth_methods = response.auth_methods.len(),
            "acp client: initialized"
        );
        Ok(response)
    }

    /// Authenticate with one of the advertised methods.
    ///
    /// Any non-error result counts as success.
    ///
    /// # Errors
    ///
    /// See [`AcpClient::send_request`].
    pub async fn authenticate(&self, method_id: &str) -> Result<()> {
        let request = AuthenticateRequest {
            method_id: method_id.to_owned(),
        };
        self.call(methods::AUTHENTICATE, &request, self.inner.config.request_timeout())
            .await?;
        Ok(())
    }

    /// Create a session rooted at `cwd`.
    ///
    /// # Errors
    ///
    /// See [`AcpClient::send_request`]; [`AppError::Decode`] if the result
    /// carries no session id.
    pub async fn new_session(
        &self,
        cwd: &Path,
        mcp_servers: Vec<McpServer>,
    ) -> Result<NewSessionResponse> {
        let request = NewSessionRequest {
            cwd: cwd.to_path_buf(),
            mcp_servers,
        };
        let response: NewSessionResponse = self
            .call_typed(methods::SESSION_NEW, &request, self.inner.config.request_timeout())
            .await?;
        info!(session_id = %response.session_id, "acp client: session created");
        Ok(response)
    }

    /// Resume a previous session.
    ///
    /// The resolved id comes from the structured result, else a loose
    /// `sessionId`/`session_id` field, else `session_id` itself. An error
    /// saying the session is already active counts as success.
    ///
    /// # Errors
    ///
    /// See [`AcpClient::send_request`].
    pub async fn load_session(
        &self,
        session_id: &SessionId,
        cwd: &Path,
        mcp_servers: Vec<McpServer>,
    ) -> Result<LoadSessionOutcome> {
        let request = LoadSessionRequest {
            session_id: session_id.clone(),
            cwd: cwd.to_path_buf(),
            mcp_servers,
        };
        match self
            .call(methods::SESSION_LOAD, &request, self.inner.config.request_timeout())
            .await
        {
            Ok(result) => {
                let outcome = load_outcome(session_id, result);
                info!(session_id = %outcome.session_id, "acp client: session loaded");
                Ok(outcome)
            }
            Err(AppError::Agent(err)) if is_already_active(&err) => {
                debug!(%session_id, message = %err.message, "acp client: session already active");
                Ok(LoadSessionOutcome {
                    session_id: session_id.clone(),
                    response: None,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Run one prompt turn. No deadline applies.
    ///
    /// # Errors
    ///
    /// See [`AcpClient::send_request`].
    pub async fn prompt(
        &self,
        session_id: &SessionId,
        content: Vec<ContentBlock>,
    ) -> Result<PromptResponse> {
        let request = PromptRequest {
            session_id: session_id.clone(),
            prompt: content,
        };
        let response: PromptResponse = self
            .call_typed(methods::SESSION_PROMPT, &request, None)
            .await?;
        debug!(%session_id, stop_reason = ?response.stop_reason, "acp client: prompt turn ended");
        Ok(response)
    }

    /// Ask the agent to stop the current turn of `session_id`.
    ///
    /// # Errors
    ///
    /// See [`AcpClient::send_notification`].
    pub async fn cancel_session(&self, session_id: &SessionId) -> Result<()> {
        let params = to_value(&CancelNotification {
            session_id: session_id.clone(),
        })?;
        self.send_notification(methods::SESSION_CANCEL, Some(params))
            .await
    }

    /// Switch the session mode.
    ///
    /// # Errors
    ///
    /// See [`AcpClient::send_request`].
    pub async fn set_mode(&self, session_id: &SessionId, mode_id: &str) -> Result<()> {
        let request = SetSessionModeRequest {
            session_id: session_id.clone(),
            mode_id: mode_id.to_owned(),
        };
        self.call(methods::SESSION_SET_MODE, &request, self.inner.config.request_timeout())
            .await?;
        Ok(())
    }

    /// Switch the session model.
    ///
    /// # Errors
    ///
    /// See [`AcpClient::send_request`].
    pub async fn set_model(&self, session_id: &SessionId, model_id: &str) -> Result<()> {
        let request = SetSessionModelRequest {
            session_id: session_id.clone(),
            model_id: model_id.to_owned(),
        };
        self.call(methods::SESSION_SET_MODEL, &request, self.inner.config.request_timeout())
            .await?;
        Ok(())
    }

    /// Change one config option; returns the updated option list when the
    /// agent sends one back.
    ///
    /// # Errors
    ///
    /// See [`AcpClient::send_request`].
    pub async fn set_config_option(
        &self,
        session_id: &SessionId,
        config_id: &str,
        value: Value,
    ) -> Result<Option<Vec<SessionConfigOption>>> {
        let request = SetSessionConfigOptionRequest {
            session_id: session_id.clone(),
            config_id: config_id.to_owned(),
            value,
        };
        let result = self
            .call(
                methods::SESSION_SET_CONFIG_OPTION,
                &request,
                self.inner.config.request_timeout(),
            )
            .await?;
        Ok(from_value::<SetSessionConfigOptionResponse>(result)
            .ok()
            .map(|response| response.config_options)
            .filter(|options| !options.is_empty()))
    }

    /// Load the session stored under `key`, or create and store a new one.
    ///
    /// A stored id the agent rejects is cleared before a new session is
    /// created.
    ///
    /// # Errors
    ///
    /// Storage errors, and protocol errors other than an agent rejecting the
    /// stored session.
    pub async fn resume_or_create(
        &self,
        store: &dyn SessionStore,
        key: &str,
        cwd: &Path,
        mcp_servers: Vec<McpServer>,
    ) -> Result<ResumedSession> {
        if let Some(stored) = store.get(key).await? {
            match self.load_session(&stored, cwd, mcp_servers.clone()).await {
                Ok(outcome) => {
                    if outcome.session_id != stored {
                        store.save(key, &outcome.session_id).await?;
                    }
                    return Ok(ResumedSession::Loaded(outcome));
                }
                Err(AppError::Agent(err)) => {
                    warn!(
                        key,
                        session_id = %stored,
                        code = err.code,
                        message = %err.message,
                        "acp client: stored session rejected, starting a new one"
                    );
                    store.clear(key).await?;
                }
                Err(err) => return Err(err),
            }
        }

        let response = self.new_session(cwd, mcp_servers).await?;
        store.save(key, &response.session_id).await?;
        Ok(ResumedSession::Created(response))
    }

    // ── Private helpers ──────────────────────────────────────────────────────

    async fn call<P: Serialize>(
        &self,
        method: &str,
        params: &P,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        self.send_request(method, Some(to_value(params)?), timeout)
            .await
    }

    async fn call_typed<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: &P,
        timeout: Option<Duration>,
    ) -> Result<R> {
        let result = self.call(method, params, timeout).await?;
        from_value(result).map_err(|err| AppError::Decode(format!("{method} result: {err}")))
    }

    async fn await_response(
        &self,
        method: &str,
        id: &RequestId,
        mut rx: oneshot::Receiver<Result<Value>>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let received = match timeout {
            None => (&mut rx).await.map_err(|_| ()),
            Some(after) => match tokio::time::timeout(after, &mut rx).await {
                Ok(received) => received.map_err(|_| ()),
                Err(_elapsed) => {
                    let removed = self.inner.state.lock().await.pending.remove(id).is_some();
                    if removed {
                        warn!(method, %id, ?after, "acp client: request timed out");
                        return Err(AppError::Timeout {
                            method: method.to_owned(),
                            after,
                        });
                    }
                    // Resolved between the deadline and the lock.
                    rx.try_recv().map_err(|_| ())
                }
            },
        };
        received.unwrap_or(Err(AppError::ProcessNotRunning))
    }
}

impl Drop for AcpClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl Inner {
    async fn handle_message(self: &Arc<Self>, raw: &[u8]) {
        let decoded = {
            let state = self.state.lock().await;
            state.mirror(Direction::Incoming, raw, detect_method(raw));
            decode_inbound(raw)
        };

        match decoded {
            Ok(Inbound::Response(response)) => {
                let mut state = self.state.lock().await;
                match state.pending.remove(&response.id) {
                    Some(tx) => {
                        let id = response.id;
                        if tx.send(response.outcome.map_err(AppError::Agent)).is_err() {
                            debug!(%id, "acp client: requester gone before response arrived");
                        }
                    }
                    None => {
                        debug!(id = %response.id, "acp client: response for unknown request, ignoring");
                    }
                }
            }
            Ok(Inbound::Notification(notification)) => {
                let state = self.state.lock().await;
                match &state.notification_tx {
                    Some(tx) => {
                        if tx.send(notification).is_err() {
                            debug!("acp client: notification receiver dropped");
                        }
                    }
                    None => debug!(
                        method = %notification.method,
                        "acp client: notification stream closed, dropping"
                    ),
                }
            }
            Ok(Inbound::Request(request)) => {
                let inner = Arc::clone(self);
                tokio::spawn(async move { inner.answer(request).await });
            }
            Err(err) => {
                debug!(
                    %err,
                    line = %String::from_utf8_lossy(raw),
                    "acp client: dropping undecodable line"
                );
            }
        }
    }

    async fn answer(&self, request: Request) {
        let Request { id, method, params } = request;
        let outcome = self.router.route(&method, params).await;
        let response = into_response(id.clone(), outcome);

        let line = match response.encode_line() {
            Ok(line) => line,
            Err(err) => {
                warn!(%id, method = %method, %err, "acp client: cannot encode response");
                return;
            }
        };

        let writer = {
            let state = self.state.lock().await;
            state.mirror(Direction::Outgoing, &line, None);
            state.writer.clone()
        };
        let Some(writer) = writer else {
            debug!(%id, method = %method, "acp client: agent gone before response could be sent");
            return;
        };
        if let Err(err) = writer.write_line(line).await {
            warn!(%id, method = %method, %err, "acp client: failed to answer agent request");
        }
    }

    async fn on_exit(&self, generation: u64, exit_code: Option<i32>) {
        let mut state = self.state.lock().await;
        if state.generation != generation || state.run != RunState::Running {
            return;
        }
        state.run = RunState::Terminated;
        state.dispatch = None;
        state.process.terminate();
        let failed = state.fail_pending(|| AppError::ProcessExited(exit_code));
        state.close_streams();
        info!(exit_code, failed, "acp client: agent exited");
    }
}

async fn dispatch_loop(
    inner: Arc<Inner>,
    mut events: mpsc::Receiver<ProcessEvent>,
    generation: u64,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;

            () = cancel.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Some(ProcessEvent::Line(line)) => inner.handle_message(&line).await,
            Some(ProcessEvent::Exited { exit_code }) => {
                inner.on_exit(generation, exit_code).await;
                break;
            }
            None => {
                inner.on_exit(generation, None).await;
                break;
            }
        }
    }
}

fn agent_label(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}

/// Resolve the `session/load` result into an outcome.
fn load_outcome(requested: &SessionId, result: Value) -> LoadSessionOutcome {
    let empty = result.is_null() || result.as_object().is_some_and(|map| map.is_empty());
    let structured = if empty {
        None
    } else {
        from_value::<LoadSessionResponse>(result.clone()).ok()
    };

    let session_id = structured
        .as_ref()
        .and_then(|response| response.session_id.clone())
        .or_else(|| {
            result
                .get("sessionId")
                .or_else(|| result.get("session_id"))
                .and_then(Value::as_str)
                .map(SessionId::from)
        })
        .unwrap_or_else(|| requested.clone());

    LoadSessionOutcome {
        session_id,
        response: structured,
    }
}

/// Whether an agent error says the session is already loaded.
fn is_already_active(err: &JsonRpcError) -> bool {
    let mentions = |text: &str| {
        let text = text.to_lowercase();
        ALREADY_ACTIVE_MARKERS
            .iter()
            .any(|marker| text.contains(marker))
    };

    if mentions(&err.message) {
        return true;
    }
    match &err.data {
        Some(Value::String(data)) => mentions(data),
        Some(data) => data
            .get("details")
            .and_then(Value::as_str)
            .is_some_and(mentions),
        None => false,
    }
}
