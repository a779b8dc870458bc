//! ACP agent process manager.
//!
//! Owns exactly one agent child process and its three standard streams:
//!
//! - stdout is framed by [`run_reader`] and delivered as
//!   [`ProcessEvent::Line`]s on the channel returned from
//!   [`ProcessManager::launch`].
//! - stdin is owned by a [`run_writer`] task; [`MessageWriter`] queues lines
//!   to it and waits for each write to complete.
//! - stderr is drained and discarded.
//!
//! A supervisor task waits for the reader to finish (so every buffered line
//! has been delivered) and reaps the child, then emits exactly one
//! [`ProcessEvent::Exited`]. A child that exits while something else keeps
//! its stdout open is still reported after a short drain grace.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::acp::interpreter::{resolve_launch, InterpreterProbe, ShebangProbe};
use crate::acp::message::encode_line;
use crate::acp::reader::{drain_stderr, run_reader};
use crate::acp::shell_env::{child_env, login_shell_env};
use crate::acp::writer::{run_writer, WriteCommand};
use crate::{AppError, Result};

/// Capacity of the stdout event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the stdin command channel.
const WRITE_CHANNEL_CAPACITY: usize = 64;

/// Time the agent gets to exit after `SIGTERM` before it is killed.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Time the reader gets to deliver buffered lines once the child has exited.
const STDOUT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Something that happened on the agent process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// One complete stdout line, without its terminator.
    Line(Bytes),
    /// The process exited; emitted exactly once, after the last line.
    Exited {
        /// Exit code, `None` when killed by a signal.
        exit_code: Option<i32>,
    },
}

/// Where the agent's base environment comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EnvSource {
    /// The user's interactive login shell (cached after the first launch).
    #[default]
    LoginShell,
    /// This process's own environment.
    Inherit,
}

/// Cloneable handle that writes lines to the agent's stdin.
#[derive(Debug, Clone)]
pub struct MessageWriter {
    tx: mpsc::Sender<WriteCommand>,
}

impl MessageWriter {
    /// Queue one encoded line and wait until it has been written.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Write`] if the write fails or the writer task has
    /// already stopped.
    pub async fn write_line(&self, bytes: Vec<u8>) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(WriteCommand { bytes, ack })
            .await
            .map_err(|_| AppError::Write("agent stdin is closed".into()))?;
        done.await
            .map_err(|_| AppError::Write("agent stdin closed before the write completed".into()))?
    }
}

/// Handles kept while a process is running.
#[derive(Debug)]
struct RunningProcess {
    writer: MessageWriter,
    /// Fired by [`ProcessManager::terminate`].
    stop: CancellationToken,
    /// Fired by the supervisor once the child has been reaped.
    exited: CancellationToken,
    pid: Option<u32>,
}

/// Owner of one agent child process.
#[derive(Debug)]
pub struct ProcessManager {
    label: String,
    probe: Arc<dyn InterpreterProbe>,
    env_source: EnvSource,
    running: Option<RunningProcess>,
}

impl ProcessManager {
    /// Manager using the Node.js interpreter probe and login-shell environment.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            probe: Arc::new(ShebangProbe::node()),
            env_source: EnvSource::default(),
            running: None,
        }
    }

    /// Replace the interpreter probe.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn InterpreterProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Replace the environment source.
    #[must_use]
    pub fn with_env_source(mut self, env_source: EnvSource) -> Self {
        self.env_source = env_source;
        self
    }

    /// Whether a launched child has not exited or been terminated yet.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.exited.is_cancelled())
    }

    /// OS process id of the running child.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.running.as_ref().and_then(|running| running.pid)
    }

    /// Write handle for the running child.
    #[must_use]
    pub fn writer(&self) -> Option<MessageWriter> {
        self.running
            .as_ref()
            .filter(|running| !running.exited.is_cancelled())
            .map(|running| running.writer.clone())
    }

    /// Launch the agent at `path`.
    ///
    /// Script agents recognised by the interpreter probe are started through
    /// their resolved interpreter. The child environment is the configured
    /// base environment with `PWD` set to the working directory and the
    /// executable's directory first on `PATH`.
    ///
    /// # Errors
    ///
    /// - [`AppError::AlreadyRunning`] if a child is still running.
    /// - [`AppError::Io`] if the working directory is invalid or the spawn fails.
    pub async fn launch(
        &mut self,
        path: &Path,
        arguments: &[String],
        working_directory: Option<&Path>,
    ) -> Result<mpsc::Receiver<ProcessEvent>> {
        if self.is_running() {
            return Err(AppError::AlreadyRunning);
        }

        let working_dir = resolve_working_dir(working_directory)?;
        let target = resolve_launch(path, self.probe.as_ref());
        let base: HashMap<String, String> = match self.env_source {
            EnvSource::LoginShell => login_shell_env().await.clone(),
            EnvSource::Inherit => env::vars().collect(),
        };
        let vars = child_env(&base, &working_dir, target.path_dir.as_deref());

        let mut cmd = Command::new(&target.program);
        cmd.args(&target.leading_args)
            .args(arguments)
            .env_clear()
            .envs(&vars)
            .current_dir(&working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|err| {
            AppError::Io(format!(
                "failed to spawn agent {}: {err}",
                target.program.display()
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::Io("failed to capture agent stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Io("failed to capture agent stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::Io("failed to capture agent stderr".into()))?;
        let pid = child.id();

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (write_tx, write_rx) = mpsc::channel(WRITE_CHANNEL_CAPACITY);
        let stop = CancellationToken::new();
        let exited = CancellationToken::new();

        tokio::spawn(run_writer(
            self.label.clone(),
            stdin,
            write_rx,
            stop.clone(),
        ));
        tokio::spawn(drain_stderr(self.label.clone(), stderr, stop.clone()));
        tokio::spawn(supervise(
            self.label.clone(),
            child,
            stdout,
            event_tx,
            stop.clone(),
            exited.clone(),
        ));

        info!(
            agent = %self.label,
            program = %target.program.display(),
            cwd = %working_dir.display(),
            pid,
            "agent process launched"
        );

        self.running = Some(RunningProcess {
            writer: MessageWriter { tx: write_tx },
            stop,
            exited,
            pid,
        });

        Ok(event_rx)
    }

    /// Serialise `envelope`, append the newline terminator and write it.
    ///
    /// # Errors
    ///
    /// - [`AppError::ProcessNotRunning`] if no child is running.
    /// - [`AppError::Acp`] if serialisation fails.
    /// - [`AppError::Write`] if the write fails.
    pub async fn write_message<T: Serialize + ?Sized>(&self, envelope: &T) -> Result<()> {
        let writer = self.writer().ok_or(AppError::ProcessNotRunning)?;
        writer.write_line(encode_line(envelope)?).await
    }

    /// Stop the child process.
    ///
    /// The write handle is dropped first, then the reader, writer and
    /// stderr tasks are cancelled and the supervisor asks the child to exit.
    /// Calling this again, or after the child exited, is a no-op.
    pub fn terminate(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        let RunningProcess {
            writer,
            stop,
            exited,
            pid,
        } = running;
        drop(writer);
        if !exited.is_cancelled() {
            debug!(agent = %self.label, pid, "terminating agent process");
        }
        stop.cancel();
    }
}

impl Drop for ProcessManager {
    fn drop(&mut self) {
        self.terminate();
    }
}

// ── Private helpers ──────────────────────────────────────────────────────────

fn resolve_working_dir(requested: Option<&Path>) -> Result<PathBuf> {
    let dir = match requested {
        Some(dir) => dir.to_path_buf(),
        None => env::current_dir()?,
    };
    dir.canonicalize().map_err(|err| {
        AppError::Io(format!(
            "invalid working directory {}: {err}",
            dir.display()
        ))
    })
}

/// Deliver stdout lines, reap the child, emit `Exited`.
///
/// Normally stdout reaches EOF first. When the child exits while a
/// grandchild still holds the pipe open, the reader gets
/// [`STDOUT_DRAIN_GRACE`] to deliver what is buffered and is then abandoned,
/// so the exit is always reported.
async fn supervise(
    label: String,
    mut child: Child,
    stdout: tokio::process::ChildStdout,
    event_tx: mpsc::Sender<ProcessEvent>,
    stop: CancellationToken,
    exited: CancellationToken,
) {
    let reader = run_reader(label.clone(), stdout, event_tx.clone(), stop.clone());
    tokio::pin!(reader);

    let first = tokio::select! {
        _ = &mut reader => FirstDone::Reader,
        status = child.wait() => FirstDone::Child(status),
        () = stop.cancelled() => FirstDone::Stop,
    };

    let status = match first {
        FirstDone::Reader => {
            let waited = tokio::select! {
                status = child.wait() => Some(status),
                () = stop.cancelled() => None,
            };
            match waited {
                Some(status) => status,
                None => shutdown_child(&label, &mut child).await,
            }
        }
        FirstDone::Child(status) => {
            if tokio::time::timeout(STDOUT_DRAIN_GRACE, &mut reader)
                .await
                .is_err()
            {
                debug!(agent = %label, "agent exited with stdout still open, abandoning reader");
            }
            status
        }
        FirstDone::Stop => shutdown_child(&label, &mut child).await,
    };

    let exit_code = match status {
        Ok(status) => status.code(),
        Err(err) => {
            warn!(agent = %label, %err, "error waiting for agent child process");
            None
        }
    };

    exited.cancel();
    info!(agent = %label, exit_code, "agent process exited");

    if event_tx
        .send(ProcessEvent::Exited { exit_code })
        .await
        .is_err()
    {
        debug!(agent = %label, "event receiver gone before exit could be delivered");
    }
}

/// Which of the supervisor's three waits finished first.
enum FirstDone {
    Reader,
    Child(std::io::Result<std::process::ExitStatus>),
    Stop,
}

/// Ask the child to exit, killing it if it ignores the request.
async fn shutdown_child(
    label: &str,
    child: &mut Child,
) -> std::io::Result<std::process::ExitStatus> {
    request_exit(label, child);
    if let Ok(status) = tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
        return status;
    }
    warn!(agent = %label, "agent ignored termination request, killing");
    child.kill().await?;
    child.wait().await
}

#[cfg(unix)]
fn request_exit(label: &str, child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    if let Err(err) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        debug!(agent = %label, %err, "SIGTERM delivery failed");
    }
}

#[cfg(not(unix))]
fn request_exit(label: &str, child: &mut Child) {
    if let Err(err) = child.start_kill() {
        debug!(agent = %label, %err, "kill request failed");
    }
}
