//! The `error` module defines the error types returned or reported by the
//! `lcmchan` client.
//!
//! Synchronous operations (`subscribe`, `unsubscribe`, `publish`) return these
//! directly. Background work (the event loop and publisher tasks) pushes
//! [`HandleError`] and [`PublishError`] values onto an
//! [`ErrorStream`](crate::utils::ErrorStream) instead.

use std::io;

use thiserror::Error;

use crate::codec::EncodeError;
use crate::transport::TransportError;

/// The transport session could not be opened, or the event loop could not be
/// started. Fatal to that `Client` instance.
#[derive(Debug, Error)]
pub enum CreateError {
    #[error("could not open transport session: {0}")]
    Transport(#[from] TransportError),

    #[error("could not start event loop thread: {0}")]
    Spawn(#[source] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscribeError {
    #[error("could not subscribe to channel {channel}: {source}")]
    Transport {
        channel: String,
        #[source]
        source: TransportError,
    },

    #[error("channel {0} is already subscribed")]
    AlreadySubscribed(String),

    #[error(
        "subscription capacity must be between 1 and {}",
        crate::utils::MAX_QUEUE_CAPACITY
    )]
    InvalidCapacity,

    #[error("client is closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnsubscribeError {
    #[error("could not unsubscribe from {channel}: {source}")]
    Transport {
        channel: String,
        #[source]
        source: TransportError,
    },

    #[error("no active subscription for channel {0}")]
    NotSubscribed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("could not publish message on {channel}: {source}")]
    Transport {
        channel: String,
        #[source]
        source: TransportError,
    },

    #[error("could not encode message: {0}")]
    Encode(#[from] EncodeError),

    #[error("publisher for {0} is closed")]
    Closed(String),

    #[error("publisher for {0} is full")]
    Full(String),

    #[error("a publisher pipeline needs a running Tokio runtime")]
    NoRuntime,
}

/// One failed iteration of a client's event loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not handle transport event: {source}")]
pub struct HandleError {
    #[source]
    pub source: TransportError,
}

/// Failure of a waiting read on a subscription queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecvError {
    #[error("subscription is closed")]
    Closed,

    #[error("no message arrived before the timeout")]
    Timeout,
}

/// Failure of a non-waiting read on a subscription queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TryRecvError {
    #[error("no messages available")]
    Empty,

    #[error("subscription is closed")]
    Closed,
}

impl From<TryRecvError> for RecvError {
    fn from(err: TryRecvError) -> Self {
        match err {
            TryRecvError::Empty => RecvError::Timeout,
            TryRecvError::Closed => RecvError::Closed,
        }
    }
}
