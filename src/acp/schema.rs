//! Typed ACP payloads.
//!
//! Field names follow the protocol's camelCase wire names. Every top-level
//! payload carries an optional free-form `_meta` map. Shapes the client never
//! inspects (tool calls, session updates) stay as [`serde_json::Value`].

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version negotiated during `initialize`.
pub const PROTOCOL_VERSION: u16 = 1;

/// Method names used on the wire.
pub mod methods {
    /// Client → agent: handshake.
    pub const INITIALIZE: &str = "initialize";
    /// Client → agent: authenticate with one of the advertised methods.
    pub const AUTHENTICATE: &str = "authenticate";
    /// Client → agent: create a session.
    pub const SESSION_NEW: &str = "session/new";
    /// Client → agent: resume a session.
    pub const SESSION_LOAD: &str = "session/load";
    /// Client → agent: run one prompt turn.
    pub const SESSION_PROMPT: &str = "session/prompt";
    /// Client → agent notification: cancel the running turn.
    pub const SESSION_CANCEL: &str = "session/cancel";
    /// Client → agent: switch the session mode.
    pub const SESSION_SET_MODE: &str = "session/set_mode";
    /// Client → agent: switch the session model.
    pub const SESSION_SET_MODEL: &str = "session/set_model";
    /// Client → agent: change one session config option.
    pub const SESSION_SET_CONFIG_OPTION: &str = "session/set_config_option";
    /// Agent → client notification: streamed session progress.
    pub const SESSION_UPDATE: &str = "session/update";
    /// Agent → client: read a text file.
    pub const FS_READ_TEXT_FILE: &str = "fs/read_text_file";
    /// Agent → client: write a text file.
    pub const FS_WRITE_TEXT_FILE: &str = "fs/write_text_file";
    /// Agent → client: ask the user for permission.
    pub const SESSION_REQUEST_PERMISSION: &str = "session/request_permission";
    /// Agent → client: start a command in a terminal.
    pub const TERMINAL_CREATE: &str = "terminal/create";
    /// Agent → client: read terminal output so far.
    pub const TERMINAL_OUTPUT: &str = "terminal/output";
    /// Agent → client: block until the terminal command exits.
    pub const TERMINAL_WAIT_FOR_EXIT: &str = "terminal/wait_for_exit";
    /// Agent → client: kill the terminal command.
    pub const TERMINAL_KILL: &str = "terminal/kill";
    /// Agent → client: release terminal resources.
    pub const TERMINAL_RELEASE: &str = "terminal/release";
}

/// Opaque session identifier assigned by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Borrow the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

// ── initialize / authenticate ────────────────────────────────────────────────

/// Name and version of a protocol participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Implementation {
    /// Programmatic name.
    pub name: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Version string.
    #[serde(default)]
    pub version: String,
}

/// Filesystem callbacks the client serves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSystemCapability {
    /// `fs/read_text_file` is served.
    #[serde(default)]
    pub read_text_file: bool,
    /// `fs/write_text_file` is served.
    #[serde(default)]
    pub write_text_file: bool,
}

/// Capabilities advertised by the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCapabilities {
    /// Filesystem callbacks.
    #[serde(default)]
    pub fs: FileSystemCapability,
    /// `terminal/*` callbacks are served.
    #[serde(default)]
    pub terminal: bool,
    /// Free-form extension data.
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// `initialize` params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeRequest {
    /// Latest protocol version the client speaks.
    pub protocol_version: u16,
    /// Client capabilities.
    pub client_capabilities: ClientCapabilities,
    /// Client identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_info: Option<Implementation>,
    /// Free-form extension data.
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// Capabilities advertised by the agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapabilities {
    /// `session/load` is supported.
    #[serde(default)]
    pub load_session: bool,
    /// Content types accepted in prompts.
    #[serde(default)]
    pub prompt_capabilities: Value,
    /// MCP transports the agent can connect to.
    #[serde(default)]
    pub mcp_capabilities: Value,
    /// Free-form extension data.
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// One authentication method advertised by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthMethod {
    /// Id passed back in `authenticate`.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// `initialize` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResponse {
    /// Version the agent chose; assumed current when omitted.
    #[serde(default = "current_protocol_version")]
    pub protocol_version: u16,
    /// Agent capabilities.
    #[serde(default)]
    pub agent_capabilities: AgentCapabilities,
    /// Authentication methods, possibly empty.
    #[serde(default)]
    pub auth_methods: Vec<AuthMethod>,
    /// Agent identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_info: Option<Implementation>,
    /// Free-form extension data.
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

fn current_protocol_version() -> u16 {
    PROTOCOL_VERSION
}

/// `authenticate` params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateRequest {
    /// One of the ids from [`InitializeResponse::auth_methods`].
    pub method_id: String,
}

// ── sessions ─────────────────────────────────────────────────────────────────

/// Environment variable handed to an MCP server or terminal command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVariable {
    /// Variable name.
    pub name: String,
    /// Variable value.
    pub value: String,
}

/// HTTP header handed to a remote MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpHeader {
    /// Header name.
    pub name: String,
    /// Header value.
    pub value: String,
}

/// Remote MCP transport kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McpTransport {
    /// Streamable HTTP.
    Http,
    /// Server-sent events.
    Sse,
}

/// MCP server the agent should connect to for this session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum McpServer {
    /// Remote server reached over HTTP or SSE.
    Remote {
        /// Transport kind.
        #[serde(rename = "type")]
        transport: McpTransport,
        /// Display name.
        name: String,
        /// Endpoint URL.
        url: String,
        /// Extra request headers.
        #[serde(default)]
        headers: Vec<HttpHeader>,
    },
    /// Local server launched by the agent over stdio.
    Stdio {
        /// Display name.
        name: String,
        /// Executable.
        command: PathBuf,
        /// Arguments.
        #[serde(default)]
        args: Vec<String>,
        /// Environment.
        #[serde(default)]
        env: Vec<EnvVariable>,
    },
}

/// One selectable session mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMode {
    /// Mode id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Legacy mode list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionModeState {
    /// Active mode id.
    pub current_mode_id: String,
    /// All modes.
    #[serde(default)]
    pub available_modes: Vec<SessionMode>,
}

/// One selectable model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    /// Model id.
    pub model_id: String,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Legacy model list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionModelState {
    /// Active model id.
    pub current_model_id: String,
    /// All models.
    #[serde(default)]
    pub available_models: Vec<ModelInfo>,
}

/// One value of a select-type config option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigOptionValue {
    /// Wire value.
    pub value: String,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Structured session setting (the successor of modes and models).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfigOption {
    /// Option id passed to `session/set_config_option`.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Semantic category such as `mode` or `model`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Control kind, e.g. `select`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Current value.
    #[serde(default)]
    pub current_value: Value,
    /// Allowed values for select options.
    #[serde(default)]
    pub options: Vec<ConfigOptionValue>,
}

/// Session controls exposed by the agent, newest shape first.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionControls {
    /// Structured config options.
    ConfigOptions(Vec<SessionConfigOption>),
    /// Legacy mode and model lists.
    Legacy {
        /// Mode list, if any.
        modes: Option<SessionModeState>,
        /// Model list, if any.
        models: Option<SessionModelState>,
    },
    /// The agent exposes no controls.
    None,
}

fn session_controls(
    config_options: Option<&Vec<SessionConfigOption>>,
    modes: Option<&SessionModeState>,
    models: Option<&SessionModelState>,
) -> SessionControls {
    if let Some(options) = config_options {
        return SessionControls::ConfigOptions(options.clone());
    }
    if modes.is_none() && models.is_none() {
        return SessionControls::None;
    }
    SessionControls::Legacy {
        modes: modes.cloned(),
        models: models.cloned(),
    }
}

/// `session/new` params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionRequest {
    /// Absolute working directory.
    pub cwd: PathBuf,
    /// MCP servers for the session.
    pub mcp_servers: Vec<McpServer>,
}

/// `session/new` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionResponse {
    /// Assigned session id.
    pub session_id: SessionId,
    /// Legacy mode list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modes: Option<SessionModeState>,
    /// Legacy model list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<SessionModelState>,
    /// Structured config options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_options: Option<Vec<SessionConfigOption>>,
    /// Free-form extension data.
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl NewSessionResponse {
    /// Controls to present; config options win over legacy modes/models.
    #[must_use]
    pub fn session_controls(&self) -> SessionControls {
        session_controls(
            self.config_options.as_ref(),
            self.modes.as_ref(),
            self.models.as_ref(),
        )
    }
}

/// `session/load` params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSessionRequest {
    /// Session to resume.
    pub session_id: SessionId,
    /// Absolute working directory.
    pub cwd: PathBuf,
    /// MCP servers for the session.
    pub mcp_servers: Vec<McpServer>,
}

/// `session/load` result; every field is optional in practice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSessionResponse {
    /// Session id, when the agent echoes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    /// Legacy mode list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modes: Option<SessionModeState>,
    /// Legacy model list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<SessionModelState>,
    /// Structured config options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_options: Option<Vec<SessionConfigOption>>,
    /// Free-form extension data.
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl LoadSessionResponse {
    /// Controls to present; config options win over legacy modes/models.
    #[must_use]
    pub fn session_controls(&self) -> SessionControls {
        session_controls(
            self.config_options.as_ref(),
            self.modes.as_ref(),
            self.models.as_ref(),
        )
    }
}

/// What `session/load` produced after all compatibility fallbacks.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSessionOutcome {
    /// Resolved session id.
    pub session_id: SessionId,
    /// Decoded payload, when the agent sent a usable one.
    pub response: Option<LoadSessionResponse>,
}

/// One block of prompt content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// Text content.
        text: String,
    },
    /// Base64 image.
    Image {
        /// Base64 payload.
        data: String,
        /// MIME type.
        mime_type: String,
    },
    /// Link to a resource the agent can fetch.
    ResourceLink {
        /// Resource URI.
        uri: String,
        /// Display name.
        name: String,
        /// MIME type.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
    /// Embedded resource contents.
    Resource {
        /// Resource payload.
        resource: Value,
    },
}

impl ContentBlock {
    /// Text block helper.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// `session/prompt` params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRequest {
    /// Target session.
    pub session_id: SessionId,
    /// Prompt content.
    pub prompt: Vec<ContentBlock>,
}

/// Why a prompt turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model finished its turn.
    EndTurn,
    /// Token limit reached.
    MaxTokens,
    /// Turn request limit reached.
    MaxTurnRequests,
    /// The model refused.
    Refusal,
    /// The client cancelled the turn.
    Cancelled,
}

/// `session/prompt` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptResponse {
    /// Why the turn ended.
    pub stop_reason: StopReason,
    /// Free-form extension data.
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// `session/cancel` params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelNotification {
    /// Session whose turn should stop.
    pub session_id: SessionId,
}

/// `session/set_mode` params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetSessionModeRequest {
    /// Target session.
    pub session_id: SessionId,
    /// Mode to activate.
    pub mode_id: String,
}

/// `session/set_model` params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetSessionModelRequest {
    /// Target session.
    pub session_id: SessionId,
    /// Model to activate.
    pub model_id: String,
}

/// `session/set_config_option` params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetSessionConfigOptionRequest {
    /// Target session.
    pub session_id: SessionId,
    /// Option id.
    pub config_id: String,
    /// New value.
    pub value: Value,
}

/// `session/set_config_option` result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetSessionConfigOptionResponse {
    /// Full option list after the change.
    #[serde(default)]
    pub config_options: Vec<SessionConfigOption>,
}

/// `session/update` params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionNotification {
    /// Session the update belongs to.
    pub session_id: SessionId,
    /// Update body, tagged by its `sessionUpdate` field.
    pub update: Value,
}

impl SessionNotification {
    /// Value of the update's `sessionUpdate` discriminator.
    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        self.update.get("sessionUpdate").and_then(Value::as_str)
    }
}

// ── agent → client ───────────────────────────────────────────────────────────

/// `fs/read_text_file` params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadTextFileRequest {
    /// Requesting session.
    pub session_id: SessionId,
    /// Absolute path.
    pub path: PathBuf,
    /// 1-based first line to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Maximum number of lines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// `fs/read_text_file` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadTextFileResponse {
    /// File content.
    pub content: String,
}

/// `fs/write_text_file` params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteTextFileRequest {
    /// Requesting session.
    pub session_id: SessionId,
    /// Absolute path.
    pub path: PathBuf,
    /// New content.
    pub content: String,
}

/// Kind of a permission option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionOptionKind {
    /// Allow this once.
    AllowOnce,
    /// Allow from now on.
    AllowAlways,
    /// Reject this once.
    RejectOnce,
    /// Reject from now on.
    RejectAlways,
}

impl PermissionOptionKind {
    /// Whether the option grants the permission.
    #[must_use]
    pub fn is_allow(self) -> bool {
        matches!(self, Self::AllowOnce | Self::AllowAlways)
    }
}

/// One choice offered in a permission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionOption {
    /// Id returned in the outcome.
    pub option_id: String,
    /// Display name.
    pub name: String,
    /// Option kind.
    pub kind: PermissionOptionKind,
}

/// `session/request_permission` params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPermissionRequest {
    /// Requesting session.
    pub session_id: SessionId,
    /// Tool call awaiting approval.
    pub tool_call: Value,
    /// Choices to present.
    pub options: Vec<PermissionOption>,
}

/// User's answer to a permission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RequestPermissionOutcome {
    /// The prompt turn was cancelled before the user answered.
    Cancelled,
    /// The user picked an option.
    Selected {
        /// Chosen option id.
        #[serde(rename = "optionId")]
        option_id: String,
    },
}

/// `session/request_permission` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPermissionResponse {
    /// Outcome.
    pub outcome: RequestPermissionOutcome,
}

/// `terminal/create` params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTerminalRequest {
    /// Requesting session.
    pub session_id: SessionId,
    /// Command to run.
    pub command: String,
    /// Arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment.
    #[serde(default)]
    pub env: Vec<EnvVariable>,
    /// Working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    /// Retain at most this many trailing output bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_byte_limit: Option<u64>,
}

/// `terminal/create` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTerminalResponse {
    /// Handle for later terminal calls.
    pub terminal_id: String,
}

/// Request addressing one terminal (`output`, `wait_for_exit`, `kill`,
/// `release` all share this shape).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalRequest {
    /// Requesting session.
    pub session_id: SessionId,
    /// Terminal handle.
    pub terminal_id: String,
}

/// How a terminal command ended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalExitStatus {
    /// Exit code, if the command exited normally.
    pub exit_code: Option<u32>,
    /// Signal name, if the command was killed.
    pub signal: Option<String>,
}

/// `terminal/output` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalOutputResponse {
    /// Captured output.
    pub output: String,
    /// Output was cut to the byte limit.
    pub truncated: bool,
    /// Present once the command has exited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<TerminalExitStatus>,
}
