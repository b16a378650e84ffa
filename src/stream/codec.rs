//! Newline codec for raw process output.
//!
//! Unlike [`tokio_util::codec::LinesCodec`], this codec splits on `\n` only
//! and keeps every other byte of the line, including a trailing `\r`. Lines
//! are decoded lossily: invalid UTF-8 becomes `U+FFFD` instead of failing
//! the whole stream.
//!
//! # Usage
//!
//! [`LineSplitter`](super::LineSplitter) drives the codec over its own
//! buffer. It also plugs straight into [`tokio_util::codec::FramedRead`]:
//!
//! ```rust,ignore
//! use tokio_util::codec::FramedRead;
//! use ops_bot::stream::codec::LineCodec;
//!
//! let lines = FramedRead::new(child_stdout, LineCodec::new());
//! ```

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::debug;

use crate::{AppError, Result};

/// Default maximum line length in bytes (1 MiB).
///
/// A producer that writes more than this without a newline has its output
/// emitted in pieces of at most this size, so a single line never holds
/// unbounded memory.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Decoder that yields one `String` per `\n`-terminated line.
#[derive(Debug)]
pub struct LineCodec {
    /// Offset up to which the buffer is known to hold no newline.
    next_index: usize,
    max_length: usize,
}

impl LineCodec {
    /// Create a new `LineCodec` with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Create a `LineCodec` that splits lines longer than `max_length`
    /// bytes. A zero limit is raised to one byte.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            next_index: 0,
            max_length: max_length.max(1),
        }
    }

    /// Longest line, in bytes, this codec emits.
    #[must_use]
    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = AppError;

    /// Split the first complete line off `src`.
    ///
    /// Returns `Ok(None)` while `src` holds no newline and no more than
    /// `max_length` bytes. Past that, the first `max_length` bytes (backed
    /// off to a UTF-8 character boundary) are emitted as a line of their own.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let read_to = src.len().min(self.max_length.saturating_add(1));
        let newline = src[self.next_index..read_to]
            .iter()
            .position(|b| *b == b'\n')
            .map(|offset| self.next_index + offset);

        if let Some(newline) = newline {
            self.next_index = 0;
            let line = src.split_to(newline + 1);
            return Ok(Some(String::from_utf8_lossy(&line[..newline]).into_owned()));
        }

        if src.len() <= self.max_length {
            self.next_index = src.len();
            return Ok(None);
        }

        let mut cut = self.max_length;
        while cut > 0 && src[cut] & 0xC0 == 0x80 {
            cut -= 1;
        }
        if cut == 0 {
            cut = self.max_length;
        }

        debug!(max_length = self.max_length, "splitting over-long output line");
        self.next_index = 0;
        let piece = src.split_to(cut);
        Ok(Some(String::from_utf8_lossy(&piece).into_owned()))
    }

    /// Flush the unterminated tail once the producer has ended.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }

        self.next_index = 0;
        if src.is_empty() {
            return Ok(None);
        }

        let rest = src.split();
        Ok(Some(String::from_utf8_lossy(&rest).into_owned()))
    }
}
