//! Local terminals for agent-run commands.
//!
//! Each `terminal/create` spawns one command with stdout and stderr merged
//! into a bounded output buffer. A waiter task reaps the command and
//! publishes its exit status on a [`watch`] channel, so `wait_for_exit`
//! callers and `output` polls see the same result.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::acp::router::{DelegateFuture, TerminalDelegate};
use crate::acp::schema::{
    CreateTerminalRequest, CreateTerminalResponse, TerminalExitStatus, TerminalOutputResponse,
    TerminalRequest,
};
use crate::{AppError, Result};

/// Output pipes get this long to drain after the command exits.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Captured terminal output, trimmed from the front to a byte limit.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    bytes: Vec<u8>,
    limit: Option<usize>,
    truncated: bool,
}

impl OutputBuffer {
    /// Buffer retaining at most `limit` trailing bytes.
    #[must_use]
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
            truncated: false,
        }
    }

    /// Append a chunk, dropping the oldest bytes beyond the limit.
    ///
    /// The cut never lands inside a UTF-8 sequence.
    pub fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
        let Some(limit) = self.limit else {
            return;
        };
        if self.bytes.len() <= limit {
            return;
        }
        let mut cut = self.bytes.len() - limit;
        while cut < self.bytes.len() && self.bytes[cut] & 0xC0 == 0x80 {
            cut += 1;
        }
        self.bytes.drain(..cut);
        self.truncated = true;
    }

    /// Output as text.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    /// Whether bytes were dropped.
    #[must_use]
    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

#[derive(Debug)]
struct Terminal {
    output: Arc<Mutex<OutputBuffer>>,
    exit: watch::Receiver<Option<TerminalExitStatus>>,
    kill: CancellationToken,
}

/// Terminal delegate running commands on this machine.
#[derive(Debug, Default)]
pub struct LocalTerminals {
    default_cwd: Option<PathBuf>,
    terminals: Mutex<HashMap<String, Arc<Terminal>>>,
}

impl LocalTerminals {
    /// Terminals whose commands run in `default_cwd` unless the agent
    /// names a directory.
    #[must_use]
    pub fn new(default_cwd: Option<PathBuf>) -> Self {
        Self {
            default_cwd,
            terminals: Mutex::new(HashMap::new()),
        }
    }

    /// Number of terminals not yet released.
    pub async fn len(&self) -> usize {
        self.terminals.lock().await.len()
    }

    /// Whether every terminal has been released.
    pub async fn is_empty(&self) -> bool {
        self.terminals.lock().await.is_empty()
    }

    async fn create(&self, request: CreateTerminalRequest) -> Result<CreateTerminalResponse> {
        let mut cmd = Command::new(&request.command);
        cmd.args(&request.args)
            .envs(request.env.iter().map(|var| (&var.name, &var.value)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = request.cwd.as_ref().or(self.default_cwd.as_ref()) {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|err| {
            AppError::Io(format!("failed to start {}: {err}", request.command))
        })?;

        let limit = request
            .output_byte_limit
            .map(|l| usize::try_from(l).unwrap_or(usize::MAX));
        let output = Arc::new(Mutex::new(OutputBuffer::new(limit)));
        let mut pumps = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            pumps.push(tokio::spawn(pump(stdout, Arc::clone(&output))));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(tokio::spawn(pump(stderr, Arc::clone(&output))));
        }

        let terminal_id = format!("term-{}", Uuid::new_v4());
        let (exit_tx, exit_rx) = watch::channel(None);
        let kill = CancellationToken::new();

        let waiter_kill = kill.clone();
        let waiter_id = terminal_id.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                () = waiter_kill.cancelled() => {
                    if let Err(err) = child.start_kill() {
                        debug!(terminal_id = %waiter_id, %err, "terminal: kill failed");
                    }
                    child.wait().await
                }
            };
            for handle in pumps {
                let _ = tokio::time::timeout(OUTPUT_DRAIN_GRACE, handle).await;
            }
            let exit = match status {
                Ok(status) => exit_status(status),
                Err(err) => {
                    warn!(terminal_id = %waiter_id, %err, "terminal: wait failed");
                    TerminalExitStatus::default()
                }
            };
            debug!(terminal_id = %waiter_id, exit_code = exit.exit_code, "terminal: command exited");
            exit_tx.send_replace(Some(exit));
        });

        info!(
            session_id = %request.session_id,
            %terminal_id,
            command = %request.command,
            "terminal: created"
        );
        self.terminals.lock().await.insert(
            terminal_id.clone(),
            Arc::new(Terminal {
                output,
                exit: exit_rx,
                kill,
            }),
        );
        Ok(CreateTerminalResponse { terminal_id })
    }

    async fn get(&self, terminal_id: &str) -> Result<Arc<Terminal>> {
        self.terminals
            .lock()
            .await
            .get(terminal_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("unknown terminal {terminal_id}")))
    }

    async fn output(&self, request: &TerminalRequest) -> Result<TerminalOutputResponse> {
        let terminal = self.get(&request.terminal_id).await?;
        let exit_status = terminal.exit.borrow().clone();
        let buffer = terminal.output.lock().await;
        Ok(TerminalOutputResponse {
            output: buffer.text(),
            truncated: buffer.truncated(),
            exit_status,
        })
    }

    async fn wait_for_exit(&self, request: &TerminalRequest) -> Result<TerminalExitStatus> {
        let terminal = self.get(&request.terminal_id).await?;
        let mut exit = terminal.exit.clone();
        let status = exit
            .wait_for(Option::is_some)
            .await
            .map_err(|_| AppError::Io(format!("terminal {} lost", request.terminal_id)))?
            .clone();
        Ok(status.unwrap_or_default())
    }

    async fn kill(&self, request: &TerminalRequest) -> Result<()> {
        let terminal = self.get(&request.terminal_id).await?;
        terminal.kill.cancel();
        Ok(())
    }

    async fn release(&self, request: &TerminalRequest) -> Result<()> {
        let removed = self.terminals.lock().await.remove(&request.terminal_id);
        let terminal = removed
            .ok_or_else(|| AppError::NotFound(format!("unknown terminal {}", request.terminal_id)))?;
        terminal.kill.cancel();
        debug!(terminal_id = %request.terminal_id, "terminal: released");
        Ok(())
    }
}

impl TerminalDelegate for LocalTerminals {
    fn create_terminal(
        &self,
        request: CreateTerminalRequest,
    ) -> DelegateFuture<'_, CreateTerminalResponse> {
        Box::pin(self.create(request))
    }

    fn terminal_output(&self, request: TerminalRequest) -> DelegateFuture<'_, TerminalOutputResponse> {
        Box::pin(async move { self.output(&request).await })
    }

    fn wait_for_terminal_exit(
        &self,
        request: TerminalRequest,
    ) -> DelegateFuture<'_, TerminalExitStatus> {
        Box::pin(async move { self.wait_for_exit(&request).await })
    }

    fn kill_terminal(&self, request: TerminalRequest) -> DelegateFuture<'_, ()> {
        Box::pin(async move { self.kill(&request).await })
    }

    fn release_terminal(&self, request: TerminalRequest) -> DelegateFuture<'_, ()> {
        Box::pin(async move { self.release(&request).await })
    }
}

async fn pump<R: AsyncRead + Unpin>(mut pipe: R, output: Arc<Mutex<OutputBuffer>>) {
    let mut chunk = [0u8; 4096];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => output.lock().await.push(&chunk[..n]),
        }
    }
}

fn exit_status(status: ExitStatus) -> TerminalExitStatus {
    TerminalExitStatus {
        exit_code: status.code().and_then(|code| u32::try_from(code).ok()),
        signal: signal_name(status),
    }
}

#[cfg(unix)]
fn signal_name(status: ExitStatus) -> Option<String> {
    use std::os::unix::process::ExitStatusExt;

    let signal = status.signal()?;
    Some(
        nix::sys::signal::Signal::try_from(signal)
            .map_or_else(|_| signal.to_string(), |s| s.as_str().to_owned()),
    )
}

#[cfg(not(unix))]
fn signal_name(_status: ExitStatus) -> Option<String> {
    None
}
