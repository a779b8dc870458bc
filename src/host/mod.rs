//! Local host delegates.
//!
//! [`LocalDelegate`] serves the agent's filesystem callbacks inside one
//! workspace root and answers permission requests according to the
//! configured [`PermissionPolicy`]. [`LocalTerminals`] runs terminal
//! commands on this machine.

pub mod fs;
pub mod terminal;

use std::io::{BufRead, Write};
use std::path::PathBuf;

use serde_json::Value;
use tracing::{debug, info};

use crate::acp::router::{ClientDelegate, DelegateFuture};
use crate::acp::schema::{
    PermissionOption, ReadTextFileRequest, ReadTextFileResponse, RequestPermissionOutcome,
    RequestPermissionRequest, RequestPermissionResponse, WriteTextFileRequest,
};
use crate::config::PermissionPolicy;
use crate::{AppError, Result};

pub use terminal::LocalTerminals;

/// Filesystem and permission delegate confined to one workspace.
#[derive(Debug, Clone)]
pub struct LocalDelegate {
    workspace_root: PathBuf,
    policy: PermissionPolicy,
}

impl LocalDelegate {
    /// Delegate serving files under `workspace_root`.
    #[must_use]
    pub fn new(workspace_root: impl Into<PathBuf>, policy: PermissionPolicy) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            policy,
        }
    }

    async fn read(&self, request: ReadTextFileRequest) -> Result<ReadTextFileResponse> {
        let path = fs::validate_path(&self.workspace_root, &request.path)?;
        let content = fs::read_text(&path, request.line, request.limit).await?;
        debug!(
            session_id = %request.session_id,
            path = %path.display(),
            bytes = content.len(),
            "host: read text file"
        );
        Ok(ReadTextFileResponse { content })
    }

    async fn write(&self, request: WriteTextFileRequest) -> Result<()> {
        let path = fs::validate_path(&self.workspace_root, &request.path)?;
        let bytes = request.content.len();
        let target = path.clone();
        tokio::task::spawn_blocking(move || fs::write_text(&target, &request.content))
            .await
            .map_err(|err| AppError::Io(format!("write task failed: {err}")))??;
        info!(path = %path.display(), bytes, "host: wrote text file");
        Ok(())
    }

    async fn permission(&self, request: RequestPermissionRequest) -> Result<RequestPermissionResponse> {
        let outcome = match self.policy {
            PermissionPolicy::Ask => {
                tokio::task::spawn_blocking(move || ask_on_terminal(&request))
                    .await
                    .map_err(|err| AppError::Io(format!("permission prompt failed: {err}")))??
            }
            policy => choose_option(policy, &request.options),
        };
        debug!(?outcome, "host: permission answered");
        Ok(RequestPermissionResponse { outcome })
    }
}

impl ClientDelegate for LocalDelegate {
    fn read_text_file(&self, request: ReadTextFileRequest) -> DelegateFuture<'_, ReadTextFileResponse> {
        Box::pin(self.read(request))
    }

    fn write_text_file(&self, request: WriteTextFileRequest) -> DelegateFuture<'_, ()> {
        Box::pin(self.write(request))
    }

    fn request_permission(
        &self,
        request: RequestPermissionRequest,
    ) -> DelegateFuture<'_, RequestPermissionResponse> {
        Box::pin(self.permission(request))
    }
}

/// Pick the first option matching a non-interactive policy.
///
/// `Ask` and a missing matching option both yield `Cancelled`.
#[must_use]
pub fn choose_option(policy: PermissionPolicy, options: &[PermissionOption]) -> RequestPermissionOutcome {
    let wanted_allow = match policy {
        PermissionPolicy::Allow => true,
        PermissionPolicy::Reject => false,
        PermissionPolicy::Ask => return RequestPermissionOutcome::Cancelled,
    };
    options
        .iter()
        .find(|option| option.kind.is_allow() == wanted_allow)
        .map_or(RequestPermissionOutcome::Cancelled, |option| {
            RequestPermissionOutcome::Selected {
                option_id: option.option_id.clone(),
            }
        })
}

/// Prompt on stderr and read the choice from stdin.
///
/// EOF or an unparseable answer cancels.
fn ask_on_terminal(request: &RequestPermissionRequest) -> Result<RequestPermissionOutcome> {
    let title = request
        .tool_call
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or("tool call");

    let mut stderr = std::io::stderr().lock();
    writeln!(stderr, "\nPermission requested: {title}")?;
    for (index, option) in request.options.iter().enumerate() {
        writeln!(stderr, "  [{}] {}", index + 1, option.name)?;
    }
    write!(stderr, "Choose an option (empty to cancel): ")?;
    stderr.flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;

    let picked = answer
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|index| request.options.get(index));
    Ok(picked.map_or(RequestPermissionOutcome::Cancelled, |option| {
        RequestPermissionOutcome::Selected {
            option_id: option.option_id.clone(),
        }
    }))
}
