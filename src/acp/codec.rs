//! Newline framing for ACP agent streams.
//!
//! Splits the agent's stdout into one frame per `\n`-terminated line and
//! hands each frame over as raw [`Bytes`]; JSON decoding happens later so
//! that lines which are not valid UTF-8 or not JSON can be dropped one at a
//! time without tearing down the stream.
//!
//! # Usage
//!
//! Use [`AcpCodec`] as the decoder for [`tokio_util::codec::FramedRead`].
//!
//! ```rust,ignore
//! use tokio_util::codec::FramedRead;
//! use agent_conduit::acp::codec::AcpCodec;
//!
//! let frames = FramedRead::new(child_stdout, AcpCodec::new());
//! ```

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::warn;

use crate::{AppError, Result};

/// Maximum line length accepted by the ACP codec: 1 MiB.
///
/// Longer lines are discarded up to their terminating newline so a single
/// runaway message cannot make the reader allocate without bound.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Byte-level NDJSON decoder.
///
/// - Frames end at the first `0x0A`; a trailing `\r` is stripped.
/// - Whitespace-only lines are padding and never emitted.
/// - Lines longer than the limit are skipped, not reported as errors.
/// - At EOF an unterminated trailing line is flushed as a final frame.
#[derive(Debug)]
pub struct AcpCodec {
    max_length: usize,
    /// Bytes of the buffer already scanned for a newline.
    next_index: usize,
    /// Inside an oversized line; drop bytes until the next newline.
    discarding: bool,
}

impl AcpCodec {
    /// Create a new `AcpCodec` with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Create a codec with a custom line limit.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }
}

impl Default for AcpCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for AcpCodec {
    type Item = Bytes;
    type Error = AppError;

    /// Decode the next complete line from `src`.
    ///
    /// Returns `Ok(None)` while `src` holds no complete line yet.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            if self.discarding {
                if let Some(pos) = src.iter().position(|b| *b == b'\n') {
                    src.advance(pos + 1);
                    self.discarding = false;
                    continue;
                }
                src.clear();
                return Ok(None);
            }

            let search_end = src.len().min(self.max_length.saturating_add(1));
            let found = src[self.next_index..search_end]
                .iter()
                .position(|b| *b == b'\n');

            match found {
                Some(offset) => {
                    let newline = self.next_index + offset;
                    self.next_index = 0;
                    let line = src.split_to(newline + 1);
                    if let Some(frame) = frame_from_line(&line[..newline]) {
                        return Ok(Some(frame));
                    }
                }
                None if src.len() > self.max_length => {
                    warn!(
                        max_bytes = self.max_length,
                        "acp codec: line too long, discarding until next newline"
                    );
                    self.next_index = 0;
                    self.discarding = true;
                }
                None => {
                    self.next_index = src.len();
                    return Ok(None);
                }
            }
        }
    }

    /// Decode the final line when the stream reaches EOF.
    ///
    /// Any bytes left after the last newline are flushed as one more frame.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }

        self.next_index = 0;
        if self.discarding {
            self.discarding = false;
            src.clear();
            return Ok(None);
        }

        let rest = src.split();
        Ok(frame_from_line(&rest))
    }
}

// ── Private helper ────────────────────────────────────────────────────────────

/// Strip a trailing `\r`; `None` for whitespace-only padding lines.
fn frame_from_line(line: &[u8]) -> Option<Bytes> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        Some(Bytes::copy_from_slice(line))
    }
}
