//! ACP writer task.
//!
//! Owns the agent's `stdin`. Outbound lines arrive through a tokio [`mpsc`]
//! channel and are written one at a time, so each message reaches the pipe
//! as one uninterrupted unit. Every write is acknowledged through a
//! [`oneshot`] so the sender learns whether its message made it out.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{AppError, Result};

/// One queued outbound line.
#[derive(Debug)]
pub struct WriteCommand {
    /// Encoded message including its single trailing `\n`.
    pub bytes: Vec<u8>,
    /// Receives the outcome of the write.
    pub ack: oneshot::Sender<Result<()>>,
}

/// Write queued NDJSON lines to `stdin`.
///
/// The task exits cleanly when:
/// - `cancel` is triggered (graceful shutdown),
/// - `msg_rx` is closed (all senders dropped), or
/// - a write fails; the failing command is acknowledged with
///   [`AppError::Write`] and any later commands see their ack dropped.
///
/// # Errors
///
/// Always returns `Ok(())`; write failures are reported per command.
pub async fn run_writer<W>(
    label: String,
    stdin: W,
    mut msg_rx: mpsc::Receiver<WriteCommand>,
    cancel: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut stdin = stdin;

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(agent = %label, "acp writer: cancellation received, stopping");
                break;
            }

            cmd = msg_rx.recv() => {
                let Some(WriteCommand { bytes, ack }) = cmd else {
                    debug!(agent = %label, "acp writer: message channel closed, stopping");
                    break;
                };

                let outcome = write_line(&mut stdin, &bytes).await;
                let failed = outcome.is_err();
                if let Err(ref e) = outcome {
                    warn!(agent = %label, error = %e, "acp writer: write to stdin failed");
                }

                // The sender may have given up waiting; that is not an error here.
                let _ = ack.send(outcome);

                if failed {
                    break;
                }
            }
        }
    }

    Ok(())
}

async fn write_line<W>(stdin: &mut W, bytes: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    stdin
        .write_all(bytes)
        .await
        .map_err(|e| AppError::Write(e.to_string()))?;
    stdin
        .flush()
        .await
        .map_err(|e| AppError::Write(e.to_string()))
}
