//! Client
//!
//! `Client` owns one transport session, the registry of its subscriptions,
//! and the thread that drives the session's event loop. Incoming messages are
//! dispatched on that thread into per-channel bounded queues; outgoing
//! messages go through [`Client::publish`] or a publisher pipeline.
//!
//! Teardown goes through [`Client::destroy`], which consumes the client.
//! Dropping a client without calling it performs the same teardown and
//! discards any unsubscribe failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::event_loop::EventLoop;
use crate::codec::Codec;
use crate::config::{ClientSettings, Settings, default_provider_url};
use crate::dispatch::{Dispatcher, Registry, Subscription, SubscriptionKey};
use crate::publisher::{Publisher, PublisherPipeline};
use crate::transport::{self, ProviderUrl, Transport};
use crate::utils::error::{
    CreateError, HandleError, PublishError, SubscribeError, UnsubscribeError,
};
use crate::utils::MAX_QUEUE_CAPACITY;
use crate::utils::error_stream::{ErrorStream, error_stream};

/// A connected client of a publish/subscribe transport.
pub struct Client {
    /// Unique identifier of this client, used in log fields and thread names.
    id: Uuid,
    /// The transport session owned by this client.
    transport: Arc<dyn Transport>,
    /// Active subscriptions, keyed by channel name.
    registry: Arc<Registry>,
    /// Callback route registered with the transport for every subscription.
    dispatcher: Arc<Dispatcher>,
    /// Set once teardown has started; read by the event loop.
    closed: Arc<AtomicBool>,
    /// Serialises subscribe so a channel never holds two transport routes.
    subscribing: Mutex<()>,
    /// Event-loop thread, taken when the client is torn down.
    event_loop: Mutex<Option<JoinHandle<()>>>,
    /// Event-loop error stream until the application takes it.
    errors: Mutex<Option<ErrorStream<HandleError>>>,
    /// Settings the client was created with.
    settings: Settings,
}

impl Client {
    /// Opens a session on the provider named by `LCM_DEFAULT_URL`, or on a
    /// private `memq://` bus when the variable is unset.
    pub fn new() -> Result<Self, CreateError> {
        Self::with_provider(&default_provider_url())
    }

    /// Opens a session on the provider named by `url`.
    pub fn with_provider(url: &str) -> Result<Self, CreateError> {
        let settings = Settings {
            client: ClientSettings {
                provider_url: url.to_string(),
                ..ClientSettings::default()
            },
            ..Settings::default()
        };
        Self::from_settings(&settings)
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, CreateError> {
        let url = ProviderUrl::parse(&settings.client.provider_url)?;
        let transport = transport::open(&url)?;
        Self::with_transport(transport, settings)
    }

    /// Wraps an already open session. The client takes over its lifecycle.
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        settings: &Settings,
    ) -> Result<Self, CreateError> {
        let id = Uuid::new_v4();
        let registry = Arc::new(Registry::new());
        let dispatcher = Arc::new(Dispatcher::new(id, registry.clone()));
        let closed = Arc::new(AtomicBool::new(false));
        let (reporter, errors) =
            error_stream(settings.client.error_capacity, format!("client {id}"));

        let handle = EventLoop {
            client_id: id,
            transport: transport.clone(),
            closed: closed.clone(),
            poll_interval: Duration::from_millis(settings.client.poll_interval_ms.max(1)),
            errors: reporter,
        }
        .spawn()
        .map_err(|e| {
            transport.close();
            CreateError::Spawn(e)
        })?;

        info!(client = %id, provider = %settings.client.provider_url, "client created");

        Ok(Self {
            id,
            transport,
            registry,
            dispatcher,
            closed,
            subscribing: Mutex::new(()),
            event_loop: Mutex::new(Some(handle)),
            errors: Mutex::new(Some(errors)),
            settings: settings.clone(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Takes the stream of event-loop failures. Only the first call gets it.
    pub fn take_errors(&self) -> Option<ErrorStream<HandleError>> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Currently subscribed channel names, sorted.
    pub fn subscriptions(&self) -> Vec<String> {
        self.registry.channels()
    }

    /// Messages the transport delivered for channels this client does not hold.
    pub fn unrouted(&self) -> u64 {
        self.dispatcher.unrouted()
    }

    /// Subscribes to `channel` with a queue of `capacity` messages.
    pub fn subscribe(&self, channel: &str, capacity: usize) -> Result<Subscription, SubscribeError> {
        if self.is_closed() {
            return Err(SubscribeError::Closed);
        }
        if capacity == 0 || capacity > MAX_QUEUE_CAPACITY {
            return Err(SubscribeError::InvalidCapacity);
        }

        // Held across the transport call and the insert.
        let _guard = self
            .subscribing
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.registry.contains(channel) {
            return Err(SubscribeError::AlreadySubscribed(channel.to_string()));
        }

        let route = self
            .transport
            .subscribe(channel, self.dispatcher.clone())
            .map_err(|source| SubscribeError::Transport {
                channel: channel.to_string(),
                source,
            })?;

        match self.registry.insert(channel, capacity, route) {
            Ok(sub) => {
                debug!(client = %self.id, channel, capacity, %route, "subscribed");
                Ok(sub)
            }
            Err(err) => {
                if let Err(e) = self.transport.unsubscribe(route) {
                    warn!(client = %self.id, channel, %route, "could not release route: {e}");
                }
                Err(err)
            }
        }
    }

    /// Subscribes with the configured default capacity.
    pub fn subscribe_default(&self, channel: &str) -> Result<Subscription, SubscribeError> {
        self.subscribe(channel, self.settings.subscription.default_capacity)
    }

    /// Deregisters at the transport, then closes the queue and forgets the
    /// entry. A transport failure leaves the subscription in place.
    pub fn unsubscribe<K: Into<SubscriptionKey>>(&self, key: K) -> Result<(), UnsubscribeError> {
        let key = key.into();
        let route = self
            .registry
            .route_of(&key)
            .ok_or_else(|| UnsubscribeError::NotSubscribed(key.channel.to_string()))?;

        self.transport
            .unsubscribe(route)
            .map_err(|source| UnsubscribeError::Transport {
                channel: key.channel.to_string(),
                source,
            })?;

        self.registry.remove(&key);
        debug!(client = %self.id, channel = %key.channel, "unsubscribed");
        Ok(())
    }

    /// Unsubscribes every channel, stopping at the first failure.
    pub fn unsubscribe_all(&self) -> Result<(), UnsubscribeError> {
        for key in self.registry.keys() {
            self.unsubscribe(key)?;
        }
        Ok(())
    }

    /// Publishes `payload` on `channel` from the calling thread.
    pub fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), PublishError> {
        self.transport
            .publish(channel, payload)
            .map_err(|source| PublishError::Transport {
                channel: channel.to_string(),
                source,
            })
    }

    pub fn publish_message<T: Codec>(&self, channel: &str, message: &T) -> Result<(), PublishError> {
        let data = message.encode()?;
        self.publish(channel, &data)
    }

    /// Starts a publisher pipeline for `channel`. Must be called from within a
    /// Tokio runtime.
    pub fn publisher(
        &self,
        channel: &str,
    ) -> Result<(Publisher, ErrorStream<PublishError>), PublishError> {
        PublisherPipeline {
            channel: channel.into(),
            transport: self.transport.clone(),
            input_capacity: self.settings.publisher.input_capacity,
            error_capacity: self.settings.publisher.error_capacity,
        }
        .spawn()
    }

    /// Stops the event loop, unsubscribes every channel and releases the
    /// session.
    pub fn destroy(mut self) -> Result<(), UnsubscribeError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), UnsubscribeError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let handle = self
            .event_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!(client = %self.id, "event loop thread panicked");
            }
        }

        let result = self.unsubscribe_all();
        // Queues left behind by a failed unsubscribe still have to end.
        for key in self.registry.keys() {
            self.registry.remove(&key);
        }
        self.transport.close();
        info!(client = %self.id, "client destroyed");
        result
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(client = %self.id, "teardown on drop: {e}");
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .field("subscriptions", &self.registry.channels())
            .finish()
    }
}
