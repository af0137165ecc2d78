//! In-process `memq` provider.
//!
//! A [`MemoryBus`] plays the role of the shared medium. Every session opened
//! on a bus sees the traffic published by any other session on the same bus
//! (including itself), but only for channels it holds a route for. Each
//! session buffers incoming messages in its own FIFO inbox until the owner
//! drains it with [`Transport::handle_timeout`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, trace};

use super::{MessageHandler, ProviderUrl, RouteId, Transport, TransportError};

/// Longest channel name accepted, in bytes.
pub const MAX_CHANNEL_NAME_LEN: usize = 63;

/// Default payload limit, overridable with the `max_payload` URL option.
pub const DEFAULT_MAX_PAYLOAD: usize = 4 * 1024 * 1024;

enum Event {
    Message { channel: Arc<str>, payload: Bytes },
    Wake,
}

struct Route {
    channel: Arc<str>,
    handler: Arc<dyn MessageHandler>,
}

struct SessionCore {
    id: u64,
    routes: RwLock<HashMap<RouteId, Route>>,
    inbox_tx: mpsc::Sender<Event>,
    inbox_rx: Mutex<mpsc::Receiver<Event>>,
    closed: AtomicBool,
}

impl SessionCore {
    fn has_route(&self, channel: &str) -> bool {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .any(|r| &*r.channel == channel)
    }

    fn handlers_for(&self, channel: &str) -> Vec<Arc<dyn MessageHandler>> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|r| &*r.channel == channel)
            .map(|r| r.handler.clone())
            .collect()
    }
}

#[derive(Default)]
struct BusInner {
    sessions: RwLock<HashMap<u64, Arc<SessionCore>>>,
    next_session: AtomicU64,
    next_route: AtomicU64,
}

/// Shared in-process medium for `memq` sessions.
#[derive(Clone, Default)]
pub struct MemoryBus {
    inner: Arc<BusInner>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a session with default options.
    pub fn open(&self) -> MemqTransport {
        self.attach(DEFAULT_MAX_PAYLOAD)
    }

    /// Opens a session honouring the options of a `memq://` URL.
    pub fn open_with(&self, url: &ProviderUrl) -> Result<MemqTransport, TransportError> {
        if url.protocol() != "memq" {
            return Err(TransportError::UnsupportedProvider(url.protocol().to_string()));
        }
        let max_payload = url.get_usize("max_payload", DEFAULT_MAX_PAYLOAD)?;
        Ok(self.attach(max_payload))
    }

    /// Number of sessions currently attached.
    pub fn session_count(&self) -> usize {
        self.inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn attach(&self, max_payload: usize) -> MemqTransport {
        let (tx, rx) = mpsc::channel();
        let core = Arc::new(SessionCore {
            id: self.inner.next_session.fetch_add(1, Ordering::Relaxed),
            routes: RwLock::new(HashMap::new()),
            inbox_tx: tx,
            inbox_rx: Mutex::new(rx),
            closed: AtomicBool::new(false),
        });
        self.inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(core.id, core.clone());
        debug!(session = core.id, "memq session attached");

        MemqTransport {
            core,
            bus: self.inner.clone(),
            max_payload,
        }
    }
}

impl std::fmt::Debug for MemoryBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBus")
            .field("sessions", &self.session_count())
            .finish()
    }
}

/// One session on a [`MemoryBus`].
pub struct MemqTransport {
    core: Arc<SessionCore>,
    bus: Arc<BusInner>,
    max_payload: usize,
}

impl MemqTransport {
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.core.closed.load(Ordering::Acquire) {
            Err(TransportError::SessionClosed)
        } else {
            Ok(())
        }
    }

    /// Messages waiting in this session's inbox are not counted; this is the
    /// number of registered routes.
    pub fn route_count(&self) -> usize {
        self.core
            .routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn validate_channel(channel: &str) -> Result<(), TransportError> {
    if channel.is_empty() || channel.len() > MAX_CHANNEL_NAME_LEN {
        return Err(TransportError::InvalidChannel(channel.to_string()));
    }
    Ok(())
}

impl Transport for MemqTransport {
    fn subscribe(
        &self,
        channel: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<RouteId, TransportError> {
        self.ensure_open()?;
        validate_channel(channel)?;

        let route = RouteId(self.bus.next_route.fetch_add(1, Ordering::Relaxed));
        self.core
            .routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                route,
                Route {
                    channel: Arc::from(channel),
                    handler,
                },
            );
        trace!(session = self.core.id, %route, channel, "memq route added");
        Ok(route)
    }

    fn unsubscribe(&self, route: RouteId) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.core
            .routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&route)
            .map(|_| ())
            .ok_or(TransportError::UnknownRoute(route))
    }

    fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), TransportError> {
        self.ensure_open()?;
        validate_channel(channel)?;
        if payload.len() > self.max_payload {
            return Err(TransportError::PayloadTooLarge {
                len: payload.len(),
                max: self.max_payload,
            });
        }

        let channel: Arc<str> = Arc::from(channel);
        let payload = Bytes::copy_from_slice(payload);
        let sessions = self
            .bus
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for session in sessions.values() {
            if session.closed.load(Ordering::Acquire) || !session.has_route(&channel) {
                continue;
            }
            // The receiving end lives as long as the session core.
            let _ = session.inbox_tx.send(Event::Message {
                channel: channel.clone(),
                payload: payload.clone(),
            });
        }
        Ok(())
    }

    fn handle_timeout(&self, timeout: Duration) -> Result<bool, TransportError> {
        self.ensure_open()?;

        let event = {
            let inbox = self
                .core
                .inbox_rx
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match inbox.recv_timeout(timeout) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => return Ok(false),
                Err(RecvTimeoutError::Disconnected) => return Err(TransportError::SessionClosed),
            }
        };

        match event {
            Event::Message { channel, payload } => {
                // Handlers run outside every lock so they may call back into
                // the session.
                for handler in self.core.handlers_for(&channel) {
                    handler.on_message(&channel, &payload);
                }
                Ok(true)
            }
            Event::Wake => {
                self.ensure_open()?;
                Ok(false)
            }
        }
    }

    fn close(&self) {
        if self.core.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.bus
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.core.id);
        self.core
            .routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        let _ = self.core.inbox_tx.send(Event::Wake);
        debug!(session = self.core.id, "memq session closed");
    }

    fn is_closed(&self) -> bool {
        self.core.closed.load(Ordering::Acquire)
    }
}

impl Drop for MemqTransport {
    fn drop(&mut self) {
        self.close();
    }
}
