//! # lcmchan
//!
//! `lcmchan` turns a callback-driven publish/subscribe transport into a
//! thread-safe, queue-based interface.
//!
//! A transport session invokes callbacks on whatever thread drives it. A
//! [`Client`] drives its session from one dedicated thread and dispatches
//! every incoming message, without blocking, into a bounded per-channel
//! queue. Application code reads those queues as [`Subscription`]s, from
//! async tasks or plain threads. Outgoing messages are published directly or
//! through an asynchronous [`Publisher`] pipeline.
//!
//! ## Core Modules
//!
//! - `client`: the `Client` and its event loop.
//! - `codec`: the encode/decode capability message types implement.
//! - `config`: layered settings from defaults, file and environment.
//! - `dispatch`: the subscription registry, dispatcher and queues.
//! - `publisher`: per-channel publisher pipelines.
//! - `transport`: the transport boundary and the in-memory `memq` provider.
//! - `utils`: error types, bounded error streams and logging.
//!
//! ## Example
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let client = lcmchan::Client::with_provider("memq://")?;
//! let mut sub = client.subscribe("EXAMPLE", 64)?;
//! client.publish("EXAMPLE", b"hello")?;
//! if let Some(msg) = sub.recv().await {
//!     println!("{} bytes on {}", msg.len(), msg.channel);
//! }
//! client.destroy()?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod publisher;
pub mod transport;
pub mod utils;

pub use client::Client;
pub use codec::{Codec, DecodeError, EncodeError, RawPayload};
pub use dispatch::{ReceivedMessage, Subscription, SubscriptionKey};
pub use publisher::Publisher;
pub use utils::error::{
    CreateError, HandleError, PublishError, RecvError, SubscribeError, TryRecvError,
    UnsubscribeError,
};
pub use utils::error_stream::ErrorStream;
