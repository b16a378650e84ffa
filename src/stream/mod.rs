//! Line-oriented stream multiplexing for child process output.
//!
//! A child process exposes two byte producers (stdout and stderr). Each one
//! is wrapped in a [`LineSplitter`](lines::LineSplitter) that turns arbitrary
//! chunks into complete lines, and the resulting line streams are fanned in
//! by a single [`StreamMerger`](merge::StreamMerger):
//!
//! ```text
//!   stdout ──▶ ReaderStream ──▶ LineSplitter ──┐
//!                                              ├──▶ StreamMerger ──▶ lines
//!   stderr ──▶ ReaderStream ──▶ LineSplitter ──┘
//! ```
//!
//! Ordering between the two sources follows readiness; each source keeps its
//! own order.

pub mod codec;
pub mod lines;
pub mod merge;

use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

use crate::Result;

pub use lines::LineSplitter;
pub use merge::StreamMerger;

/// Boxed stream of decoded lines from a single producer.
pub type LineStream = BoxStream<'static, Result<String>>;

/// Merged line stream over the stdout and stderr of one child process.
pub type ProcessLines = StreamMerger<LineStream>;

/// Wrap an optional async reader into a line stream.
///
/// An absent reader yields an empty stream.
#[must_use]
pub fn line_stream<R>(reader: Option<R>) -> LineStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    LineSplitter::new(reader.map(ReaderStream::new)).boxed()
}

/// Merge the output of a process's stdout and stderr into one line stream.
#[must_use]
pub fn process_lines<O, E>(stdout: Option<O>, stderr: Option<E>) -> ProcessLines
where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
{
    StreamMerger::new(vec![line_stream(stdout), line_stream(stderr)])
}
