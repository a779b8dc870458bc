//! ACP reader tasks.
//!
//! [`run_reader`] frames the agent's stdout with [`AcpCodec`] and forwards
//! each complete line as [`ProcessEvent::Line`] through a tokio [`mpsc`]
//! channel, in wire order. [`drain_stderr`] consumes the agent's stderr so
//! the child never blocks on a full pipe; its content is not surfaced.

use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::acp::codec::AcpCodec;
use crate::acp::process::ProcessEvent;
use crate::Result;

/// Read NDJSON frames from `stdout` and emit them as events.
///
/// Returns when the stream reaches EOF (after the codec has flushed any
/// trailing partial line), when an I/O error occurs, when `event_tx` is
/// closed, or when `cancel` fires. It never emits the exit event itself;
/// the process supervisor does that once this task has returned (or has been
/// abandoned after the child exited), so no line follows the exit.
///
/// # Errors
///
/// Always returns `Ok(())`; stream failures are logged and end the task.
pub async fn run_reader<R>(
    label: String,
    stdout: R,
    event_tx: mpsc::Sender<ProcessEvent>,
    cancel: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, AcpCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(agent = %label, "acp reader: cancellation received, stopping");
                break;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!(agent = %label, "acp reader: EOF detected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(agent = %label, error = %e, "acp reader: IO error, stopping");
                        break;
                    }
                    Some(Ok(line)) => {
                        if event_tx.send(ProcessEvent::Line(line)).await.is_err() {
                            debug!(agent = %label, "acp reader: event_tx closed, stopping");
                            break;
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

/// Read and discard the agent's stderr until EOF or cancellation.
///
/// Lines are only visible at `TRACE` level.
pub async fn drain_stderr<R>(label: String, stderr: R, cancel: CancellationToken)
where
    R: AsyncRead + Unpin + Send,
{
    let mut segments = BufReader::new(stderr).split(b'\n');

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => break,

            segment = segments.next_segment() => {
                match segment {
                    Ok(None) => break,
                    Ok(Some(bytes)) => trace!(
                        agent = %label,
                        stderr = %String::from_utf8_lossy(&bytes).trim_end(),
                        "agent stderr"
                    ),
                    Err(err) => {
                        trace!(agent = %label, %err, "agent stderr unreadable, stopping drain");
                        break;
                    }
                }
            }
        }
    }
}
