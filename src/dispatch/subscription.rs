//! Subscription queues
//!
//! A `Subscription` is the application-facing end of one channel's bounded
//! delivery queue. The dispatcher holds the sending end inside the client's
//! registry; the application reads from the `Subscription`.
//!
//! Once the subscription is unsubscribed its queue is closed: the next read
//! reports end of stream, even if messages were still buffered, and nothing
//! is delivered afterwards.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc;

use super::message::ReceivedMessage;
use crate::utils::error::{RecvError, TryRecvError};

/// Identity of one subscription within its client. The id changes every time
/// a channel is subscribed again, so a stale key never matches a newer entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    /// Channel name, case-sensitive.
    pub channel: Arc<str>,
    /// Registry-assigned id of this particular subscription.
    pub id: u64,
}

impl From<&Subscription> for SubscriptionKey {
    fn from(sub: &Subscription) -> Self {
        sub.key()
    }
}

impl From<&SubscriptionKey> for SubscriptionKey {
    fn from(key: &SubscriptionKey) -> Self {
        key.clone()
    }
}

/// State shared by a subscription, its registry entry and the dispatcher.
#[derive(Debug)]
pub(crate) struct SubscriptionState {
    capacity: usize,
    drops: AtomicU64,
    closed: AtomicBool,
}

impl SubscriptionState {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            drops: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn record_drop(&self) -> u64 {
        self.drops.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn drops(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Receiving end of one channel's queue plus its drop accounting.
#[derive(Debug)]
pub struct Subscription {
    key: SubscriptionKey,
    receiver: mpsc::Receiver<ReceivedMessage>,
    state: Arc<SubscriptionState>,
}

impl Subscription {
    pub(crate) fn new(
        key: SubscriptionKey,
        receiver: mpsc::Receiver<ReceivedMessage>,
        state: Arc<SubscriptionState>,
    ) -> Self {
        Self {
            key,
            receiver,
            state,
        }
    }

    pub fn channel(&self) -> &str {
        &self.key.channel
    }

    pub fn key(&self) -> SubscriptionKey {
        self.key.clone()
    }

    /// Queue capacity fixed at subscribe time.
    pub fn capacity(&self) -> usize {
        self.state.capacity
    }

    /// Messages discarded because the queue was full when they arrived.
    pub fn drops(&self) -> u64 {
        self.state.drops()
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// Messages currently buffered.
    pub fn len(&self) -> usize {
        if self.is_closed() {
            0
        } else {
            self.receiver.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` when the queue is closed, releasing anything buffered.
    fn check_closed(&mut self) -> bool {
        if self.state.is_closed() {
            self.receiver.close();
            while self.receiver.try_recv().is_ok() {}
            true
        } else {
            false
        }
    }

    /// Waits for the next message. `None` once the subscription is closed.
    pub async fn recv(&mut self) -> Option<ReceivedMessage> {
        if self.check_closed() {
            return None;
        }
        let msg = self.receiver.recv().await;
        if self.check_closed() { None } else { msg }
    }

    /// Waits at most `timeout` for the next message.
    pub async fn recv_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<ReceivedMessage, RecvError> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(Some(msg)) => Ok(msg),
            Ok(None) => Err(RecvError::Closed),
            Err(_) => Err(RecvError::Timeout),
        }
    }

    pub fn try_recv(&mut self) -> Result<ReceivedMessage, TryRecvError> {
        if self.check_closed() {
            return Err(TryRecvError::Closed);
        }
        self.receiver.try_recv().map_err(|e| match e {
            mpsc::error::TryRecvError::Empty => TryRecvError::Empty,
            mpsc::error::TryRecvError::Disconnected => TryRecvError::Closed,
        })
    }

    /// Blocking read for threads that are not running inside an async runtime.
    ///
    /// # Panics
    ///
    /// Panics when called from within an asynchronous execution context.
    pub fn blocking_recv(&mut self) -> Option<ReceivedMessage> {
        if self.check_closed() {
            return None;
        }
        let msg = self.receiver.blocking_recv();
        if self.check_closed() { None } else { msg }
    }
}

impl Stream for Subscription {
    type Item = ReceivedMessage;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<ReceivedMessage>> {
        if self.check_closed() {
            return Poll::Ready(None);
        }
        let polled = self.receiver.poll_recv(cx);
        if matches!(polled, Poll::Ready(Some(_))) && self.check_closed() {
            return Poll::Ready(None);
        }
        polled
    }
}
