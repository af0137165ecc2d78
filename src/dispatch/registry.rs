//! Per-client subscription registry
//!
//! Maps a channel name (case-sensitive) to the single active subscription a
//! client holds for it. Application threads insert and remove entries while
//! the transport thread reads them on every delivery, so the map lives behind
//! an `RwLock`. Readers never hold the lock across anything that can wait.
//!
//! A channel can only be subscribed once per client: a second subscribe is
//! rejected instead of silently replacing the first queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;

use super::message::ReceivedMessage;
use super::subscription::{Subscription, SubscriptionKey, SubscriptionState};
use crate::transport::RouteId;
use crate::utils::MAX_QUEUE_CAPACITY;
use crate::utils::error::SubscribeError;

/// Registry side of one subscription.
#[derive(Debug)]
pub(crate) struct Entry {
    pub(crate) id: u64,
    pub(crate) channel: Arc<str>,
    pub(crate) sender: mpsc::Sender<ReceivedMessage>,
    pub(crate) state: Arc<SubscriptionState>,
    pub(crate) route: RouteId,
}

/// The subscriptions held by one client.
#[derive(Debug, Default)]
pub struct Registry {
    /// One entry per subscribed channel.
    entries: RwLock<HashMap<Arc<str>, Entry>>,
    /// Source of `SubscriptionKey::id` values.
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(channel)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribed channel names, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .map(|c| c.to_string())
            .collect();
        channels.sort();
        channels
    }

    /// Drop count of the active subscription on `channel`, if any.
    pub fn drops(&self, channel: &str) -> Option<u64> {
        self.with_entry(channel, |e| e.state.drops())
    }

    pub(crate) fn keys(&self) -> Vec<SubscriptionKey> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|e| SubscriptionKey {
                channel: e.channel.clone(),
                id: e.id,
            })
            .collect()
    }

    /// Creates the queue for `channel` and records it under `route`.
    pub(crate) fn insert(
        &self,
        channel: &str,
        capacity: usize,
        route: RouteId,
    ) -> Result<Subscription, SubscribeError> {
        if capacity == 0 || capacity > MAX_QUEUE_CAPACITY {
            return Err(SubscribeError::InvalidCapacity);
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(channel) {
            return Err(SubscribeError::AlreadySubscribed(channel.to_string()));
        }

        let channel: Arc<str> = Arc::from(channel);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(capacity);
        let state = Arc::new(SubscriptionState::new(capacity));

        entries.insert(
            channel.clone(),
            Entry {
                id,
                channel: channel.clone(),
                sender,
                state: state.clone(),
                route,
            },
        );

        Ok(Subscription::new(SubscriptionKey { channel, id }, receiver, state))
    }

    /// Transport route of the entry matching `key`.
    pub(crate) fn route_of(&self, key: &SubscriptionKey) -> Option<RouteId> {
        self.with_entry(&key.channel, |e| (e.id == key.id).then_some(e.route))
            .flatten()
    }

    /// Removes the entry matching `key` and closes its queue.
    pub(crate) fn remove(&self, key: &SubscriptionKey) -> Option<RouteId> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(&key.channel) {
            Some(e) if e.id == key.id => {}
            _ => return None,
        }
        let entry = entries.remove(&key.channel)?;
        entry.state.close();
        Some(entry.route)
    }

    /// Runs `f` on the entry for `channel` while holding the read lock.
    pub(crate) fn with_entry<R>(&self, channel: &str, f: impl FnOnce(&Entry) -> R) -> Option<R> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .map(f)
    }
}
