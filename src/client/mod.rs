//! The `client` module defines the public entry point of the crate.
//!
//! A [`Client`] owns one transport session, a registry of per-channel
//! subscriptions, and the event-loop thread that dispatches incoming messages
//! into those subscriptions' queues.

mod event_loop;
pub mod pubsub_client;

pub use pubsub_client::Client;

#[cfg(test)]
mod tests;
