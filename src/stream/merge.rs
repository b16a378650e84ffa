//! Readiness-ordered fan-in over a fixed set of fallible streams.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::stream::FusedStream;
use futures_util::Stream;
use tracing::{debug, warn};

use crate::Result;

/// Per-source bookkeeping.
#[derive(Debug)]
enum MergeSlot<S> {
    /// The source may still yield; at most one pull is in flight.
    Pending(S),
    /// The source ended, failed, or was closed. Never polled again.
    Finished,
}

/// Merges several streams into one, yielding items in the order they
/// become ready.
///
/// Every item from every source is yielded exactly once. Items from one
/// source keep their relative order; the order between sources is whatever
/// readiness dictates. Polling starts after the source that produced last,
/// so a chatty source cannot starve a quieter one.
///
/// The first error from any source is yielded and the merger then closes
/// every remaining source and ends. There is no partial drain after a
/// failure.
///
/// Dropping the merger, or calling [`close`](Self::close), releases every
/// source that has not finished yet.
#[derive(Debug)]
pub struct StreamMerger<S> {
    slots: Vec<MergeSlot<S>>,
    cursor: usize,
    done: bool,
}

impl<S> StreamMerger<S> {
    /// Build a merger over `sources`. An empty set ends immediately.
    #[must_use]
    pub fn new(sources: Vec<S>) -> Self {
        let done = sources.is_empty();
        Self {
            slots: sources.into_iter().map(MergeSlot::Pending).collect(),
            cursor: 0,
            done,
        }
    }

    /// Number of sources that have not finished yet.
    #[must_use]
    pub fn active_sources(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot, MergeSlot::Pending(_)))
            .count()
    }

    /// Drop every unfinished source and end the merged stream.
    ///
    /// Returns how many sources were released. Calling it again is a no-op.
    pub fn close(&mut self) -> usize {
        let mut released = 0;
        for slot in &mut self.slots {
            if matches!(slot, MergeSlot::Pending(_)) {
                *slot = MergeSlot::Finished;
                released += 1;
            }
        }
        self.done = true;

        if released > 0 {
            debug!(released, "stream merger closed with sources still open");
        }
        released
    }
}

impl<S, T> Stream for StreamMerger<S>
where
    S: Stream<Item = Result<T>> + Unpin,
{
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        let len = this.slots.len();
        let mut waiting = false;

        for offset in 0..len {
            let index = (this.cursor + offset) % len;
            let MergeSlot::Pending(source) = &mut this.slots[index] else {
                continue;
            };

            match Pin::new(source).poll_next(cx) {
                Poll::Ready(Some(Ok(item))) => {
                    this.cursor = (index + 1) % len;
                    return Poll::Ready(Some(Ok(item)));
                }
                Poll::Ready(Some(Err(err))) => {
                    warn!(source = index, %err, "merged source failed, closing the rest");
                    this.slots[index] = MergeSlot::Finished;
                    this.close();
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => {
                    debug!(source = index, "merged source exhausted");
                    this.slots[index] = MergeSlot::Finished;
                }
                Poll::Pending => waiting = true,
            }
        }

        if waiting {
            Poll::Pending
        } else {
            this.done = true;
            Poll::Ready(None)
        }
    }
}

impl<S, T> FusedStream for StreamMerger<S>
where
    S: Stream<Item = Result<T>> + Unpin,
{
    fn is_terminated(&self) -> bool {
        self.done
    }
}
