use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use tokio::time::timeout;

use super::Client;
use crate::config::Settings;
use crate::transport::{
    MemoryBus, MemqTransport, MessageHandler, RouteId, Transport, TransportError,
};
use crate::utils::MAX_QUEUE_CAPACITY;
use crate::utils::error::{
    CreateError, HandleError, PublishError, SubscribeError, UnsubscribeError,
};

const WAIT: Duration = Duration::from_secs(2);

fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.client.poll_interval_ms = 5;
    settings
}

/// Fails the first `failures` polls, then idles. Unsubscribe can be made to fail.
struct FlakyTransport {
    failures: AtomicUsize,
    polls: AtomicUsize,
    fail_unsubscribe: AtomicBool,
    closed: AtomicBool,
}

impl FlakyTransport {
    fn new(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            polls: AtomicUsize::new(0),
            fail_unsubscribe: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }
}

impl Transport for FlakyTransport {
    fn subscribe(
        &self,
        _channel: &str,
        _handler: Arc<dyn MessageHandler>,
    ) -> Result<RouteId, TransportError> {
        Ok(RouteId(1))
    }

    fn unsubscribe(&self, _route: RouteId) -> Result<(), TransportError> {
        if self.fail_unsubscribe.load(Ordering::SeqCst) {
            Err(TransportError::Rejected("unsubscribe".to_string()))
        } else {
            Ok(())
        }
    }

    fn publish(&self, _channel: &str, _payload: &[u8]) -> Result<(), TransportError> {
        Err(TransportError::Rejected("publish".to_string()))
    }

    fn handle_timeout(&self, timeout: Duration) -> Result<bool, TransportError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::SessionClosed);
        }
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(TransportError::Rejected("poll".to_string()));
        }
        std::thread::sleep(timeout);
        Ok(false)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[test]
fn test_client_new() {
    let client = Client::with_provider("memq://").unwrap();
    assert!(!client.id().is_nil());
    assert!(!client.is_closed());
    assert!(client.subscriptions().is_empty());
    client.destroy().unwrap();
}

#[test]
fn test_unsupported_provider_fails_creation() {
    let err = Client::with_provider("udpm://239.255.76.67:7667").unwrap_err();
    assert!(matches!(
        err,
        CreateError::Transport(TransportError::UnsupportedProvider(ref p)) if p == "udpm"
    ));
    assert!(matches!(
        Client::with_provider("nonsense").unwrap_err(),
        CreateError::Transport(TransportError::InvalidUrl(_))
    ));
}

#[tokio::test]
async fn test_loopback_publish_and_receive() {
    let client = Client::from_settings(&settings()).unwrap();
    let mut sub = client.subscribe("TEST", 16).unwrap();
    assert_eq!(client.subscriptions(), vec!["TEST".to_string()]);

    client.publish("TEST", b"hello").unwrap();
    let msg = timeout(WAIT, sub.recv()).await.unwrap().unwrap();
    assert_eq!(&*msg.channel, "TEST");
    assert_eq!(&msg.data[..], b"hello");
    assert!(msg.recv_utime > 0);

    client.destroy().unwrap();
}

#[test]
fn test_double_subscribe_is_rejected() {
    let client = Client::from_settings(&settings()).unwrap();
    let _sub = client.subscribe("TEST", 4).unwrap();
    assert_eq!(
        client.subscribe("TEST", 4).unwrap_err(),
        SubscribeError::AlreadySubscribed("TEST".to_string())
    );
    assert_eq!(
        client.subscribe("OTHER", 0).unwrap_err(),
        SubscribeError::InvalidCapacity
    );
    assert!(matches!(
        client.subscribe("", 4).unwrap_err(),
        SubscribeError::Transport {
            source: TransportError::InvalidChannel(_),
            ..
        }
    ));
    assert_eq!(client.subscriptions(), vec!["TEST".to_string()]);
}

#[tokio::test]
async fn test_unsubscribe_ends_the_stream() {
    let client = Client::from_settings(&settings()).unwrap();
    let mut sub = client.subscribe("TEST", 4).unwrap();

    client.unsubscribe(&sub).unwrap();
    assert!(client.subscriptions().is_empty());
    assert_eq!(timeout(WAIT, sub.recv()).await.unwrap(), None);
    assert_eq!(
        client.unsubscribe(&sub).unwrap_err(),
        UnsubscribeError::NotSubscribed("TEST".to_string())
    );

    // The channel can be subscribed again afterwards.
    let _again = client.subscribe("TEST", 4).unwrap();
}

#[test]
fn test_subscribe_default_uses_configured_capacity() {
    let mut settings = settings();
    settings.subscription.default_capacity = 7;
    let client = Client::from_settings(&settings).unwrap();
    let sub = client.subscribe_default("TEST").unwrap();
    assert_eq!(sub.capacity(), 7);
}

#[tokio::test]
async fn test_destroy_closes_every_subscription() {
    let client = Client::from_settings(&settings()).unwrap();
    let mut a = client.subscribe("A", 4).unwrap();
    let mut b = client.subscribe("B", 4).unwrap();
    client.publish("A", b"buffered").unwrap();

    client.destroy().unwrap();
    assert_eq!(timeout(WAIT, a.recv()).await.unwrap(), None);
    assert_eq!(timeout(WAIT, b.recv()).await.unwrap(), None);
    assert!(a.is_closed());
}

#[test]
fn test_drop_releases_the_session() {
    let bus = MemoryBus::new();
    let client = Client::with_transport(Arc::new(bus.open()), &settings()).unwrap();
    let _sub = client.subscribe("TEST", 4).unwrap();
    assert_eq!(bus.session_count(), 1);
    drop(client);
    assert_eq!(bus.session_count(), 0);
}

#[test]
fn test_subscribe_after_transport_closed() {
    let bus = MemoryBus::new();
    let transport = Arc::new(bus.open());
    let client = Client::with_transport(transport.clone(), &settings()).unwrap();
    transport.close();
    assert!(matches!(
        client.subscribe("TEST", 4).unwrap_err(),
        SubscribeError::Transport {
            source: TransportError::SessionClosed,
            ..
        }
    ));
}

#[tokio::test]
async fn test_event_loop_errors_are_reported() {
    let transport = Arc::new(FlakyTransport::new(3));
    let client = Client::with_transport(transport, &settings()).unwrap();
    let mut errors = client.take_errors().unwrap();
    assert!(client.take_errors().is_none());

    for _ in 0..3 {
        let err = timeout(WAIT, errors.recv()).await.unwrap().unwrap();
        assert_eq!(
            err,
            HandleError {
                source: TransportError::Rejected("poll".to_string()),
            }
        );
    }

    client.destroy().unwrap();
    // The event loop has stopped, so its stream ends.
    assert_eq!(timeout(WAIT, errors.recv()).await.unwrap(), None);
}

#[test]
fn test_synchronous_publish_error() {
    let client = Client::with_transport(Arc::new(FlakyTransport::new(0)), &settings()).unwrap();
    assert_eq!(
        client.publish("TEST", b"x").unwrap_err(),
        PublishError::Transport {
            channel: "TEST".to_string(),
            source: TransportError::Rejected("publish".to_string()),
        }
    );
}

#[tokio::test]
async fn test_destroy_reports_unsubscribe_failure_and_still_closes_queues() {
    let transport = Arc::new(FlakyTransport::new(0));
    let client = Client::with_transport(transport.clone(), &settings()).unwrap();
    let mut sub = client.subscribe("TEST", 4).unwrap();

    transport.fail_unsubscribe.store(true, Ordering::SeqCst);
    assert!(matches!(
        client.unsubscribe(&sub).unwrap_err(),
        UnsubscribeError::Transport { .. }
    ));
    assert_eq!(client.subscriptions(), vec!["TEST".to_string()]);

    assert!(matches!(
        client.destroy().unwrap_err(),
        UnsubscribeError::Transport { .. }
    ));
    assert!(transport.is_closed());
    assert_eq!(timeout(WAIT, sub.recv()).await.unwrap(), None);
}

#[tokio::test]
async fn test_publisher_pipeline_loopback() {
    let client = Client::from_settings(&settings()).unwrap();
    let mut sub = client.subscribe("TEST", 16).unwrap();
    let (publisher, _errors) = client.publisher("TEST").unwrap();

    for i in 0u8..3 {
        publisher.send(vec![i]).await.unwrap();
    }
    for i in 0u8..3 {
        let msg = timeout(WAIT, sub.recv()).await.unwrap().unwrap();
        assert_eq!(&msg.data[..], &[i]);
    }
}

/// Memq session whose `subscribe` is slow and records overlapping calls.
struct SlowSubscribe {
    inner: MemqTransport,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Transport for SlowSubscribe {
    fn subscribe(
        &self,
        channel: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<RouteId, TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        let result = self.inner.subscribe(channel, handler);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn unsubscribe(&self, route: RouteId) -> Result<(), TransportError> {
        self.inner.unsubscribe(route)
    }

    fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), TransportError> {
        self.inner.publish(channel, payload)
    }

    fn handle_timeout(&self, timeout: Duration) -> Result<bool, TransportError> {
        self.inner.handle_timeout(timeout)
    }

    fn close(&self) {
        self.inner.close()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

#[test]
fn test_oversized_capacity_is_rejected_before_the_transport() {
    let bus = MemoryBus::new();
    let transport = Arc::new(bus.open());
    let client = Client::with_transport(transport.clone(), &settings()).unwrap();

    for capacity in [MAX_QUEUE_CAPACITY + 1, usize::MAX] {
        assert_eq!(
            client.subscribe("BIG", capacity).unwrap_err(),
            SubscribeError::InvalidCapacity
        );
    }
    assert_eq!(transport.route_count(), 0);
    assert!(client.subscriptions().is_empty());
}

#[tokio::test]
async fn test_oversized_configured_capacities_are_clamped() {
    let mut settings = settings();
    settings.client.error_capacity = usize::MAX;
    settings.publisher.input_capacity = usize::MAX;
    settings.publisher.error_capacity = usize::MAX;

    let client = Client::from_settings(&settings).unwrap();
    let mut sub = client.subscribe("TEST", 4).unwrap();
    let (publisher, _errors) = client.publisher("TEST").unwrap();
    publisher.send(b"fits".to_vec()).await.unwrap();

    let msg = timeout(WAIT, sub.recv()).await.unwrap().unwrap();
    assert_eq!(&msg.data[..], b"fits");
}

#[test]
fn test_concurrent_subscribes_register_one_route() {
    const CALLERS: usize = 8;
    let transport = Arc::new(SlowSubscribe {
        inner: MemoryBus::new().open(),
        in_flight: AtomicUsize::new(0),
        max_in_flight: AtomicUsize::new(0),
    });
    let client = Client::with_transport(transport.clone(), &settings()).unwrap();
    let barrier = Barrier::new(CALLERS);

    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    client.subscribe("X", 8)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let mut subs: Vec<_> = results.into_iter().filter_map(Result::ok).collect();
    assert_eq!(subs.len(), 1);
    assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(transport.inner.route_count(), 1);

    client.publish("X", b"once").unwrap();
    let sub = &mut subs[0];
    let deadline = Instant::now() + WAIT;
    let msg = loop {
        if let Ok(msg) = sub.try_recv() {
            break msg;
        }
        assert!(Instant::now() < deadline, "message never arrived");
        std::thread::sleep(Duration::from_millis(5));
    };
    assert_eq!(&msg.data[..], b"once");

    std::thread::sleep(Duration::from_millis(50));
    assert!(sub.is_empty());
    assert_eq!(sub.drops(), 0);
}

#[test]
fn test_failing_event_loop_does_not_spin() {
    let transport = Arc::new(FlakyTransport::new(usize::MAX));
    let client = Client::with_transport(transport.clone(), &settings()).unwrap();

    std::thread::sleep(Duration::from_millis(200));
    client.destroy().unwrap();

    // One poll per 5 ms interval at most, with slack for scheduling.
    let polls = transport.polls.load(Ordering::SeqCst);
    assert!(polls > 0);
    assert!(polls < 100, "event loop polled {polls} times in 200ms");
}
