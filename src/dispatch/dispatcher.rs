//! Dispatcher
//!
//! The dispatcher is the callback route a client registers with its transport
//! session. It runs on the transport's thread, never on an application task,
//! so each delivery is a single non-blocking enqueue:
//!
//! - no subscription for the channel: skip it and count it as unrouted
//! - queue has room: copy the payload in
//! - queue full: count a drop on that subscription and discard the newest
//!   message; queued messages are never evicted

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace};
use uuid::Uuid;

use super::message::ReceivedMessage;
use super::registry::Registry;
use crate::transport::MessageHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    /// Queue was full; the message was discarded and counted.
    Dropped,
    /// This client holds no subscription for the channel.
    Unrouted,
    /// The subscription's reader is gone or the queue was already closed.
    Closed,
}

#[derive(Debug)]
pub struct Dispatcher {
    client_id: Uuid,
    registry: Arc<Registry>,
    unrouted: AtomicU64,
}

impl Dispatcher {
    pub fn new(client_id: Uuid, registry: Arc<Registry>) -> Self {
        Self {
            client_id,
            registry,
            unrouted: AtomicU64::new(0),
        }
    }

    /// Routes one `(channel, payload)` pair into the matching queue.
    pub fn dispatch(&self, channel: &str, payload: &[u8]) -> DispatchOutcome {
        let outcome = self.registry.with_entry(channel, |entry| {
            if entry.state.is_closed() {
                return DispatchOutcome::Closed;
            }
            match entry.sender.try_reserve() {
                Ok(permit) => {
                    permit.send(ReceivedMessage::new(
                        entry.channel.clone(),
                        Bytes::copy_from_slice(payload),
                    ));
                    DispatchOutcome::Delivered
                }
                Err(TrySendError::Full(())) => {
                    let drops = entry.state.record_drop();
                    trace!(client = %self.client_id, channel, drops, "subscription queue full, message dropped");
                    DispatchOutcome::Dropped
                }
                Err(TrySendError::Closed(())) => DispatchOutcome::Closed,
            }
        });

        outcome.unwrap_or_else(|| {
            self.unrouted.fetch_add(1, Ordering::Relaxed);
            debug!(client = %self.client_id, channel, "no subscription for delivered channel, skipping");
            DispatchOutcome::Unrouted
        })
    }

    /// Messages that arrived for channels this client does not hold.
    pub fn unrouted(&self) -> u64 {
        self.unrouted.load(Ordering::Relaxed)
    }
}

impl MessageHandler for Dispatcher {
    fn on_message(&self, channel: &str, payload: &[u8]) {
        self.dispatch(channel, payload);
    }
}
