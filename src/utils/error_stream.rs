//! Bounded error reporting for background work.
//!
//! A background task owns an [`ErrorReporter`] and the application drains the
//! matching [`ErrorStream`]. Reporting never waits: once the buffer is full
//! (including when nobody reads the stream at all) further errors are
//! discarded and counted. The stream ends when the reporter is dropped, which
//! happens when the producing task finishes.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use super::error::TryRecvError;

/// Creates a connected reporter and stream holding at most `capacity` errors.
/// The capacity is clamped to `1..=MAX_QUEUE_CAPACITY`.
pub fn error_stream<E>(
    capacity: usize,
    source: impl Into<String>,
) -> (ErrorReporter<E>, ErrorStream<E>) {
    let (tx, rx) = mpsc::channel(super::queue_capacity(capacity));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        ErrorReporter {
            sender: tx,
            dropped: dropped.clone(),
            source: source.into(),
        },
        ErrorStream {
            receiver: rx,
            dropped,
        },
    )
}

/// Producing side, held by a background task.
#[derive(Debug)]
pub struct ErrorReporter<E> {
    sender: mpsc::Sender<E>,
    dropped: Arc<AtomicU64>,
    source: String,
}

impl<E: std::fmt::Display> ErrorReporter<E> {
    /// Queues `err` without waiting. Returns `false` if it had to be discarded.
    pub fn report(&self, err: E) -> bool {
        match self.sender.try_send(err) {
            Ok(()) => true,
            Err(TrySendError::Full(err)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(source = %self.source, dropped = total, "error stream full, discarding: {err}");
                false
            }
            Err(TrySendError::Closed(err)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(source = %self.source, "error stream closed, discarding: {err}");
                false
            }
        }
    }
}

/// Consuming side, handed to the application.
#[derive(Debug)]
pub struct ErrorStream<E> {
    receiver: mpsc::Receiver<E>,
    dropped: Arc<AtomicU64>,
}

impl<E> ErrorStream<E> {
    /// Waits for the next error. `None` once the producer has finished and
    /// every queued error has been read.
    pub async fn recv(&mut self) -> Option<E> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Result<E, TryRecvError> {
        self.receiver.try_recv().map_err(|e| match e {
            mpsc::error::TryRecvError::Empty => TryRecvError::Empty,
            mpsc::error::TryRecvError::Disconnected => TryRecvError::Closed,
        })
    }

    /// Blocking variant of [`recv`](Self::recv) for threads outside a runtime.
    pub fn blocking_recv(&mut self) -> Option<E> {
        self.receiver.blocking_recv()
    }

    /// Number of errors discarded because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl<E> Stream for ErrorStream<E> {
    type Item = E;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<E>> {
        self.receiver.poll_recv(cx)
    }
}
