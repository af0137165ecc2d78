//! The `utils` module provides the pieces shared by every other module of
//! `lcmchan`: the error types, the bounded error streams used by background
//! tasks, and logging initialisation.

pub mod error;
pub mod error_stream;
pub mod logging;

pub use error::{
    CreateError, HandleError, PublishError, RecvError, SubscribeError, TryRecvError,
    UnsubscribeError,
};
pub use error_stream::{ErrorReporter, ErrorStream, error_stream};

/// Largest capacity any bounded queue in the crate accepts. Tokio channels
/// panic above it.
pub const MAX_QUEUE_CAPACITY: usize = tokio::sync::Semaphore::MAX_PERMITS;

/// Brings a configured capacity into `1..=MAX_QUEUE_CAPACITY`.
pub(crate) fn queue_capacity(requested: usize) -> usize {
    requested.clamp(1, MAX_QUEUE_CAPACITY)
}
