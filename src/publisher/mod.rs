//! The `publisher` module provides asynchronous, per-channel publishing.
//!
//! A [`Publisher`] is a cloneable handle feeding a bounded input queue. One
//! Tokio task drains that queue in order and hands each payload to the
//! transport. Failures never reach the producer: they are reported on the
//! [`ErrorStream`](crate::utils::ErrorStream) returned next to the handle.

mod pipeline;

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::codec::Codec;
use crate::utils::error::PublishError;

pub(crate) use pipeline::PublisherPipeline;

/// Producer side of a publisher pipeline.
///
/// The sender task stops once every clone of the handle has been dropped.
#[derive(Debug, Clone)]
pub struct Publisher {
    channel: Arc<str>,
    input: mpsc::Sender<Bytes>,
}

impl Publisher {
    pub(crate) fn new(channel: Arc<str>, input: mpsc::Sender<Bytes>) -> Self {
        Self { channel, input }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Queues `payload`, waiting for room in the input queue.
    pub async fn send(&self, payload: impl Into<Bytes>) -> Result<(), PublishError> {
        self.input
            .send(payload.into())
            .await
            .map_err(|_| PublishError::Closed(self.channel.to_string()))
    }

    /// Queues `payload` only if there is room right now.
    pub fn try_send(&self, payload: impl Into<Bytes>) -> Result<(), PublishError> {
        self.input.try_send(payload.into()).map_err(|e| match e {
            TrySendError::Full(_) => PublishError::Full(self.channel.to_string()),
            TrySendError::Closed(_) => PublishError::Closed(self.channel.to_string()),
        })
    }

    /// Waiting variant of [`send`](Self::send) for threads outside the runtime.
    ///
    /// # Panics
    ///
    /// Panics when called from within an asynchronous execution context.
    pub fn blocking_send(&self, payload: impl Into<Bytes>) -> Result<(), PublishError> {
        self.input
            .blocking_send(payload.into())
            .map_err(|_| PublishError::Closed(self.channel.to_string()))
    }

    /// Encodes `message` and queues it. Encoding failures are returned here,
    /// not on the error stream.
    pub async fn send_message<T: Codec>(&self, message: &T) -> Result<(), PublishError> {
        let data = message.encode()?;
        self.send(data).await
    }

    /// Whether the sender task has stopped.
    pub fn is_closed(&self) -> bool {
        self.input.is_closed()
    }
}
