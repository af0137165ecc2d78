//! The `dispatch` module carries received messages from the transport thread
//! to application code.
//!
//! - `subscription`: the bounded per-channel queue handed to the application,
//!   with its drop counter.
//! - `registry`: the per-client map from channel name to subscription.
//! - `dispatcher`: the non-blocking callback invoked by the transport.
//! - `message`: the received-message type.

pub mod dispatcher;
pub mod message;
pub mod registry;
pub mod subscription;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use message::ReceivedMessage;
pub use registry::Registry;
pub use subscription::{Subscription, SubscriptionKey};
