//! # Subscription Multiplexer
//!
//! Decouples "which views want which event streams" from the one physical
//! connection. A `Multiplexer` is an explicit context object: create one per
//! application and hand clones to every view or reconciler that needs live
//! updates.
//!
//! ## Registrations
//!
//! Each `subscribe` call adds one listener to the dispatch list for its
//! `(event, filter)` pair and returns a [`SubscriptionId`]. Upstream commands
//! are reference counted per pair: `subscribe <event> <filter>` goes out when
//! the first listener for a pair registers (and the socket is open), and
//! `unsubscribe <event> <filter>` when the last one leaves.
//!
//! ## Reconnects
//!
//! Every time the transport reports `Opened` the multiplexer replays a
//! `subscribe` for each registered pair, with the filter it was registered
//! under. [`ResubscribeMode::Wildcard`] restores the older behaviour of one
//! `subscribe <event> *` per event name.
//!
//! ## Dispatch
//!
//! A single pump task consumes transport events in delivery order. Envelopes
//! are parsed once, wrapped in an `Arc`, and handed to every listener whose
//! event name matches and whose filter matches the envelope's `uri`.
//! Callbacks run on the pump task, one at a time, outside the registry lock,
//! so a callback may itself subscribe or cancel. Malformed frames and events
//! nobody listens to are dropped.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

use tokio::sync::mpsc;

use crate::realtime::command::Command;
use crate::realtime::envelope::Envelope;
use crate::realtime::filter::UriFilter;
use crate::realtime::transport::{self, TransportConfig, TransportEvent, TransportHandle};

/// Listener invoked with every matching envelope.
pub type Callback = Arc<dyn Fn(&Arc<Envelope>) + Send + Sync>;

/// Identifies one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// What to replay after a reconnect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResubscribeMode {
    /// Each registered `(event, filter)` pair, as registered.
    #[default]
    OriginalFilter,
    /// One `subscribe <event> *` per registered event name.
    Wildcard,
}

#[derive(Debug, Clone, Default)]
pub struct MultiplexerConfig {
    pub resubscribe: ResubscribeMode,
}

struct Registration {
    event: String,
    filter: UriFilter,
    callback: Callback,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: BTreeMap<SubscriptionId, Registration>,
}

impl Registry {
    fn insert(&mut self, event: String, filter: UriFilter, callback: Callback) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.entries.insert(
            id,
            Registration {
                event,
                filter,
                callback,
            },
        );
        id
    }

    fn count(&self, event: &str, filter: &UriFilter) -> usize {
        self.entries
            .values()
            .filter(|r| r.event == event && &r.filter == filter)
            .count()
    }

    fn remove_pair(&mut self, event: &str, filter: &UriFilter) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, r| !(r.event == event && &r.filter == filter));
        before - self.entries.len()
    }

    fn pairs(&self) -> BTreeSet<(String, UriFilter)> {
        self.entries
            .values()
            .map(|r| (r.event.clone(), r.filter.clone()))
            .collect()
    }

    fn events(&self) -> BTreeSet<String> {
        self.entries.values().map(|r| r.event.clone()).collect()
    }

    fn listeners(&self, event: &str, uri: &str) -> Vec<Callback> {
        self.entries
            .values()
            .filter(|r| r.event == event && r.filter.matches(uri))
            .map(|r| Arc::clone(&r.callback))
            .collect()
    }
}

struct Inner {
    transport: TransportHandle,
    registry: Mutex<Registry>,
    config: MultiplexerConfig,
}

impl Inner {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, command: Command) -> bool {
        let sent = self.transport.send(command.to_string());
        tracing::debug!(%command, sent, "upstream command");
        sent
    }

    fn cancel(&self, id: SubscriptionId) -> bool {
        let (registration, last) = {
            let mut registry = self.registry();
            let Some(registration) = registry.entries.remove(&id) else {
                return false;
            };
            let last = registry.count(&registration.event, &registration.filter) == 0;
            (registration, last)
        };
        if last {
            self.send(Command::Unsubscribe {
                event: registration.event,
                filter: registration.filter,
            });
        }
        true
    }

    fn resubscribe_all(&self) {
        let commands: Vec<Command> = match self.config.resubscribe {
            ResubscribeMode::OriginalFilter => self
                .registry()
                .pairs()
                .into_iter()
                .map(|(event, filter)| Command::Subscribe { event, filter })
                .collect(),
            ResubscribeMode::Wildcard => self
                .registry()
                .events()
                .into_iter()
                .map(|event| Command::Subscribe {
                    event,
                    filter: UriFilter::wildcard(),
                })
                .collect(),
        };
        tracing::info!(count = commands.len(), "replaying subscriptions");
        for command in commands {
            self.send(command);
        }
    }

    fn dispatch(&self, text: &str) {
        let envelope = match Envelope::parse(text) {
            Ok(envelope) => Arc::new(envelope),
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed frame");
                return;
            }
        };

        let listeners = self.registry().listeners(envelope.event(), envelope.uri());
        if listeners.is_empty() {
            tracing::debug!(event = envelope.event(), uri = envelope.uri(), "no listener");
            return;
        }
        for callback in listeners {
            callback(&envelope);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.transport.shutdown();
    }
}

/// Shared handle onto the subscription registry and its transport.
#[derive(Clone)]
pub struct Multiplexer {
    inner: Arc<Inner>,
}

impl Multiplexer {
    /// Spawns a transport for `transport_config` and multiplexes it.
    pub fn connect(transport_config: TransportConfig, config: MultiplexerConfig) -> Self {
        let (handle, events) = transport::spawn(transport_config);
        Self::new(handle, events, config)
    }

    /// Multiplexes an existing transport. `events` must be that transport's
    /// event stream; the multiplexer becomes its only consumer.
    pub fn new(
        transport: TransportHandle,
        events: mpsc::UnboundedReceiver<TransportEvent>,
        config: MultiplexerConfig,
    ) -> Self {
        let inner = Arc::new(Inner {
            transport,
            registry: Mutex::new(Registry::default()),
            config,
        });
        tokio::spawn(pump(Arc::downgrade(&inner), events));
        Self { inner }
    }

    /// Registers `callback` for `event` envelopes whose uri matches `filter`.
    pub fn subscribe<F>(
        &self,
        event: impl Into<String>,
        filter: impl Into<UriFilter>,
        callback: F,
    ) -> SubscriptionId
    where
        F: Fn(&Arc<Envelope>) + Send + Sync + 'static,
    {
        let event = event.into();
        let filter = filter.into();
        let (id, first) = {
            let mut registry = self.inner.registry();
            let first = registry.count(&event, &filter) == 0;
            let id = registry.insert(event.clone(), filter.clone(), Arc::new(callback));
            (id, first)
        };
        if first {
            self.inner.send(Command::Subscribe { event, filter });
        }
        id
    }

    /// Channel flavour of [`Multiplexer::subscribe`]. Dropping the receiver
    /// cancels the listener at the next matching envelope.
    pub fn subscribe_channel(
        &self,
        event: impl Into<String>,
        filter: impl Into<UriFilter>,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<Arc<Envelope>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let own_id: Arc<OnceLock<SubscriptionId>> = Arc::default();
        let slot = Arc::clone(&own_id);
        let inner = Arc::downgrade(&self.inner);
        let id = self.subscribe(event, filter, move |envelope| {
            if tx.send(Arc::clone(envelope)).is_ok() {
                return;
            }
            // Receiver dropped; the listener cancels itself.
            if let (Some(inner), Some(id)) = (inner.upgrade(), slot.get()) {
                tracing::debug!(?id, "listener channel closed");
                inner.cancel(*id);
            }
        });
        let _ = own_id.set(id);
        (id, rx)
    }

    /// Drops every listener for `(event, filter)` and tells the server.
    pub fn unsubscribe(&self, event: &str, filter: impl Into<UriFilter>) {
        let filter = filter.into();
        let removed = self.inner.registry().remove_pair(event, &filter);
        tracing::debug!(event, %filter, removed, "unsubscribe");
        self.inner.send(Command::Unsubscribe {
            event: event.to_string(),
            filter,
        });
    }

    /// Drops one listener; the server is told once its pair has no listeners
    /// left. Returns whether the id was registered.
    pub fn cancel(&self, id: SubscriptionId) -> bool {
        self.inner.cancel(id)
    }

    /// Distinct `(event, filter)` pairs currently registered.
    pub fn registrations(&self) -> Vec<(String, UriFilter)> {
        self.inner.registry().pairs().into_iter().collect()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.registry().entries.len()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.transport.is_open()
    }

    pub fn transport(&self) -> &TransportHandle {
        &self.inner.transport
    }

    /// Stops the transport; registrations are kept but nothing is delivered.
    pub fn shutdown(&self) {
        self.inner.transport.shutdown();
    }
}

async fn pump(inner: Weak<Inner>, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        match event {
            TransportEvent::Opened => inner.resubscribe_all(),
            TransportEvent::Message(text) => inner.dispatch(&text),
            TransportEvent::Closed => {
                tracing::debug!("transport closed, subscriptions inactive until reopen");
            }
        }
    }
    tracing::debug!("multiplexer pump stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::realtime::transport::ReconnectPolicy;

    fn offline_mux() -> (Multiplexer, mpsc::UnboundedSender<TransportEvent>) {
        let mut config = TransportConfig::new("ws://127.0.0.1:9/");
        config.reconnect = ReconnectPolicy::constant(Duration::from_secs(60));
        let (handle, _events) = transport::spawn(config);
        let (tx, rx) = mpsc::unbounded_channel();
        (Multiplexer::new(handle, rx, MultiplexerConfig::default()), tx)
    }

    fn frame(event: &str, uri: &str) -> TransportEvent {
        TransportEvent::Message(Envelope::new(event, uri, Default::default()).to_json())
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[test]
    fn registry_counts_pairs() {
        let mut reg = Registry::default();
        let noop: Callback = Arc::new(|_| {});
        reg.insert("a:created".into(), "/x/*".into(), Arc::clone(&noop));
        reg.insert("a:created".into(), "/x/*".into(), Arc::clone(&noop));
        reg.insert("a:created".into(), "/y/*".into(), Arc::clone(&noop));
        reg.insert("b:deleted".into(), "/x/*".into(), noop);

        assert_eq!(reg.count("a:created", &"/x/*".into()), 2);
        assert_eq!(reg.pairs().len(), 3);
        assert_eq!(reg.events().len(), 2);
        assert_eq!(reg.listeners("a:created", "/x/1").len(), 2);
        assert_eq!(reg.listeners("a:created", "/z/1").len(), 0);
        assert_eq!(reg.remove_pair("a:created", &"/x/*".into()), 2);
        assert_eq!(reg.entries.len(), 2);
    }

    #[tokio::test]
    async fn dispatches_only_to_matching_listeners() {
        let (mux, events) = offline_mux();
        let l1 = Arc::new(AtomicUsize::new(0));
        let l2 = Arc::new(AtomicUsize::new(0));

        let c1 = Arc::clone(&l1);
        mux.subscribe("features:created", "/locations/L1/features/*", move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let c2 = Arc::clone(&l2);
        mux.subscribe("features:created", "/locations/L2/features/*", move |_| {
            c2.fetch_add(1, Ordering::SeqCst);
        });

        events.send(frame("features:created", "/locations/L1/features/F1")).unwrap();
        events.send(frame("features:created", "/locations/L2/features/F9")).unwrap();
        events.send(frame("features:deleted", "/locations/L1/features/F1")).unwrap();
        settle().await;

        assert_eq!(l1.load(Ordering::SeqCst), 1);
        assert_eq!(l2.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn several_listeners_share_one_event() {
        let (mux, events) = offline_mux();
        let (_a, mut rx_a) = mux.subscribe_channel("headsets:updated", "*");
        let (b, mut rx_b) = mux.subscribe_channel("headsets:updated", "*");
        assert_eq!(mux.registrations().len(), 1);
        assert_eq!(mux.listener_count(), 2);

        events.send(frame("headsets:updated", "/headsets/1")).unwrap();
        assert_eq!(rx_a.recv().await.unwrap().uri(), "/headsets/1");
        assert_eq!(rx_b.recv().await.unwrap().uri(), "/headsets/1");

        assert!(mux.cancel(b));
        assert!(!mux.cancel(b));
        assert_eq!(mux.registrations().len(), 1);
    }

    #[tokio::test]
    async fn dropped_receiver_cancels_its_listener() {
        let (mux, events) = offline_mux();
        let (_kept, mut kept_rx) = mux.subscribe_channel("photos:created", "*");
        let (_gone, gone_rx) = mux.subscribe_channel("photos:created", "*");
        drop(gone_rx);
        assert_eq!(mux.listener_count(), 2);

        events.send(frame("photos:created", "/photos/1")).unwrap();
        assert_eq!(kept_rx.recv().await.unwrap().uri(), "/photos/1");
        settle().await;
        assert_eq!(mux.listener_count(), 1);
        assert_eq!(mux.registrations().len(), 1);

        drop(kept_rx);
        events.send(frame("photos:created", "/photos/2")).unwrap();
        settle().await;
        assert_eq!(mux.listener_count(), 0);
        assert!(mux.registrations().is_empty());
    }

    #[tokio::test]
    async fn malformed_frames_are_dropped() {
        let (mux, events) = offline_mux();
        let (_id, mut rx) = mux.subscribe_channel("headsets:updated", "*");

        events.send(TransportEvent::Message("not json".into())).unwrap();
        events.send(TransportEvent::Message(r#"{"current":{}}"#.into())).unwrap();
        events.send(frame("headsets:updated", "/headsets/2")).unwrap();

        assert_eq!(rx.recv().await.unwrap().uri(), "/headsets/2");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_removes_every_listener_of_the_pair() {
        let (mux, events) = offline_mux();
        let (_a, mut rx_a) = mux.subscribe_channel("layers:created", "/locations/L1/layers/*");
        let (_b, _rx_b) = mux.subscribe_channel("layers:created", "/locations/L1/layers/*");

        mux.unsubscribe("layers:created", "/locations/L1/layers/*");
        assert_eq!(mux.listener_count(), 0);

        events.send(frame("layers:created", "/locations/L1/layers/1")).unwrap();
        settle().await;
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn callbacks_may_reenter_the_multiplexer() {
        let (mux, events) = offline_mux();
        let seen = Arc::new(AtomicUsize::new(0));
        let inner_mux = mux.clone();
        let counter = Arc::clone(&seen);
        mux.subscribe("photos:created", "*", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            inner_mux.unsubscribe("photos:created", "*");
        });

        events.send(frame("photos:created", "/photos/1")).unwrap();
        events.send(frame("photos:created", "/photos/2")).unwrap();
        settle().await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
