//! Chunk-to-line adapter for a single byte producer.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::BytesMut;
use futures_util::Stream;
use tokio_util::codec::Decoder;
use tracing::warn;

use crate::stream::codec::LineCodec;
use crate::{AppError, Result};

/// Turns a stream of arbitrary byte chunks into a stream of complete lines.
///
/// Chunk boundaries carry no meaning: a chunk may hold several lines, part
/// of a line, or both. Complete lines are emitted as soon as their `\n`
/// arrives; the unterminated tail is held until more data comes in or the
/// producer ends, at which point a non-empty tail is emitted as the last
/// line.
///
/// If the producer fails, the stream yields one [`AppError::Stream`] and then
/// ends. Any unterminated tail is discarded.
///
/// A line longer than the codec limit is emitted in pieces rather than
/// buffered without bound. The default limit is
/// [`MAX_LINE_BYTES`](crate::stream::codec::MAX_LINE_BYTES).
///
/// A splitter built over `None` ends immediately, exactly like one built
/// over a producer that completes without yielding.
#[derive(Debug)]
pub struct LineSplitter<S> {
    producer: Option<S>,
    buffer: BytesMut,
    codec: LineCodec,
}

impl<S> LineSplitter<S> {
    /// Wrap an optional chunk producer.
    #[must_use]
    pub fn new(producer: Option<S>) -> Self {
        Self::with_codec(producer, LineCodec::new())
    }

    /// Wrap an optional chunk producer, splitting lines longer than
    /// `max_length` bytes.
    #[must_use]
    pub fn with_max_line_length(producer: Option<S>, max_length: usize) -> Self {
        Self::with_codec(producer, LineCodec::with_max_length(max_length))
    }

    fn with_codec(producer: Option<S>, codec: LineCodec) -> Self {
        Self {
            producer,
            buffer: BytesMut::new(),
            codec,
        }
    }

    /// Number of bytes currently held as an unterminated line.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }
}

impl<S, B> Stream for LineSplitter<S>
where
    S: Stream<Item = io::Result<B>> + Unpin,
    B: AsRef<[u8]>,
{
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(line) = this.codec.decode(&mut this.buffer)? {
                return Poll::Ready(Some(Ok(line)));
            }

            let Some(producer) = this.producer.as_mut() else {
                return Poll::Ready(None);
            };

            match ready!(Pin::new(producer).poll_next(cx)) {
                Some(Ok(chunk)) => this.buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(err)) => {
                    warn!(
                        %err,
                        discarded_bytes = this.buffer.len(),
                        "output producer failed, dropping partial line"
                    );
                    this.producer = None;
                    this.buffer.clear();
                    this.codec = LineCodec::with_max_length(this.codec.max_length());
                    return Poll::Ready(Some(Err(AppError::Stream(err.to_string()))));
                }
                None => {
                    this.producer = None;
                    return Poll::Ready(this.codec.decode_eof(&mut this.buffer)?.map(Ok));
                }
            }
        }
    }
}
