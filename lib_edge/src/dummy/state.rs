//! In-memory collections and the pub/sub hub of the dummy edge server.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::realtime::command::Command;
use crate::realtime::envelope::{Action, Envelope, Payload};
use crate::realtime::filter::UriFilter;

/// Frames queued for one connected socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Text(String),
    Close,
}

struct Client {
    subscriptions: HashSet<(String, UriFilter)>,
    tx: mpsc::UnboundedSender<ClientFrame>,
}

type Collections = BTreeMap<String, BTreeMap<String, Value>>;

#[derive(Default)]
struct Inner {
    collections: Mutex<Collections>,
    clients: Mutex<HashMap<usize, Client>>,
    commands: Mutex<Vec<String>>,
    next_id: AtomicU64,
    next_client: AtomicUsize,
    connections: AtomicUsize,
    mute_pong: AtomicBool,
    shutdown: CancellationToken,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared state behind every route of the dummy server.
#[derive(Clone, Default)]
pub struct DummyState {
    inner: Arc<Inner>,
}

/// A collection path split into what the hub needs to know about it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Route {
    /// Where the records are stored; `/locations/L1/headsets` is a view of
    /// `/headsets`.
    storage: String,
    /// Location pinned by the path, if any.
    location: Option<String>,
    /// Event kind announced for the stored records.
    kind: String,
}

impl Route {
    fn parse(collection: &str) -> Route {
        let segments: Vec<&str> = collection.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            ["locations", location, "headsets"] => Route {
                storage: "/headsets".to_string(),
                location: Some(location.to_string()),
                kind: "headsets".to_string(),
            },
            ["locations", location, kind] => Route {
                storage: format!("/locations/{location}/{kind}"),
                location: Some(location.to_string()),
                kind: kind.to_string(),
            },
            _ => Route {
                storage: format!("/{}", segments.join("/")),
                location: None,
                kind: segments.last().copied().unwrap_or_default().to_string(),
            },
        }
    }
}

fn location_of(record: &Value) -> Option<String> {
    match record.get("location_id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl DummyState {
    pub fn new() -> Self {
        Self::default()
    }

    fn collections(&self) -> MutexGuard<'_, Collections> {
        lock(&self.inner.collections)
    }

    /// Records under `collection`, ordered by id.
    pub fn list(&self, collection: &str) -> Vec<Value> {
        let route = Route::parse(collection);
        let collections = self.collections();
        let Some(records) = collections.get(&route.storage) else {
            return Vec::new();
        };
        records
            .values()
            .filter(|record| match (&route.storage[..], &route.location) {
                ("/headsets", Some(location)) => location_of(record).as_ref() == Some(location),
                _ => true,
            })
            .cloned()
            .collect()
    }

    pub fn get(&self, collection: &str, id: &str) -> Option<Value> {
        let route = Route::parse(collection);
        self.collections().get(&route.storage)?.get(id).cloned()
    }

    /// Stores records without announcing them.
    pub fn seed(&self, collection: &str, records: impl IntoIterator<Item = Value>) {
        let route = Route::parse(collection);
        let mut collections = self.collections();
        let stored = collections.entry(route.storage).or_default();
        for record in records {
            if let Some(id) = record_id(&record) {
                stored.insert(id, record);
            }
        }
    }

    /// Stores a new record, assigning an id when it has none, and announces
    /// it as created.
    pub fn create(&self, collection: &str, body: Value) -> Option<Value> {
        let route = Route::parse(collection);
        let Value::Object(mut record) = body else {
            return None;
        };
        let id = match record_id_in(&record) {
            Some(id) => id,
            None => {
                let id = (self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1).to_string();
                record.insert("id".to_string(), Value::String(id.clone()));
                id
            }
        };
        if let Some(location) = &route.location {
            record.insert("location_id".to_string(), Value::String(location.clone()));
        }
        let record = Value::Object(record);

        self.collections()
            .entry(route.storage.clone())
            .or_default()
            .insert(id.clone(), record.clone());
        self.announce(&route, &id, None, Some(record.clone()));
        Some(record)
    }

    /// Merges `fields` into the stored record and announces the update.
    pub fn patch(&self, collection: &str, id: &str, fields: Map<String, Value>) -> Option<Value> {
        let route = Route::parse(collection);
        let (previous, current) = {
            let mut collections = self.collections();
            let record = collections.get_mut(&route.storage)?.get_mut(id)?;
            let previous = record.clone();
            if let Value::Object(object) = record {
                for (key, value) in fields {
                    if key != "id" {
                        object.insert(key, value);
                    }
                }
            }
            (previous, record.clone())
        };
        self.announce(&route, id, Some(previous), Some(current.clone()));
        Some(current)
    }

    /// Replaces the stored record wholesale, keeping its id.
    pub fn replace(&self, collection: &str, id: &str, body: Value) -> Option<Value> {
        let route = Route::parse(collection);
        let Value::Object(mut record) = body else {
            return None;
        };
        record.insert("id".to_string(), Value::String(id.to_string()));
        let current = Value::Object(record);
        let previous = self
            .collections()
            .get_mut(&route.storage)?
            .insert(id.to_string(), current.clone());
        self.announce(&route, id, previous, Some(current.clone()));
        Some(current)
    }

    pub fn delete(&self, collection: &str, id: &str) -> Option<Value> {
        let route = Route::parse(collection);
        let previous = self.collections().get_mut(&route.storage)?.remove(id)?;
        self.announce(&route, id, Some(previous.clone()), None);
        Some(previous)
    }

    fn announce(&self, route: &Route, id: &str, previous: Option<Value>, current: Option<Value>) {
        let action = match (&previous, &current) {
            (None, _) => Action::Created,
            (Some(_), Some(_)) => Action::Updated,
            (Some(_), None) => Action::Deleted,
        };
        let uri = format!("{}/{id}", route.storage);
        self.publish(&Envelope::new(
            format!("{}:{action}", route.kind),
            uri,
            Payload {
                current: current.clone(),
                previous: previous.clone(),
            },
        ));

        if route.storage == "/headsets" {
            self.announce_location_headsets(id, previous, current);
        }
    }

    /// Mirrors a headset change onto the per-location headset views. A move
    /// between locations is a delete at the old one and a create at the new.
    fn announce_location_headsets(&self, id: &str, previous: Option<Value>, current: Option<Value>) {
        let before = previous.as_ref().and_then(location_of);
        let after = current.as_ref().and_then(location_of);
        let envelope = |location: &str, action: Action, payload: Payload| {
            Envelope::new(
                format!("location-headsets:{action}"),
                format!("/locations/{location}/headsets/{id}"),
                payload,
            )
        };

        if before == after {
            if let Some(location) = &after {
                let action = if previous.is_some() { Action::Updated } else { Action::Created };
                self.publish(&envelope(location, action, Payload { current, previous }));
            }
            return;
        }
        if let Some(location) = &before {
            let payload = Payload {
                current: None,
                previous: previous.clone(),
            };
            self.publish(&envelope(location, Action::Deleted, payload));
        }
        if let Some(location) = &after {
            let payload = Payload {
                current: current.clone(),
                previous: None,
            };
            self.publish(&envelope(location, Action::Created, payload));
        }
    }

    /// Sends `envelope` to every socket subscribed to its event under a
    /// filter matching its uri. Returns how many sockets it reached.
    pub fn publish(&self, envelope: &Envelope) -> usize {
        let text = envelope.to_json();
        let clients = lock(&self.inner.clients);
        let mut reached = 0;
        for client in clients.values() {
            let interested = client
                .subscriptions
                .iter()
                .any(|(event, filter)| event == envelope.event() && filter.matches(envelope.uri()));
            if interested && client.tx.send(ClientFrame::Text(text.clone())).is_ok() {
                reached += 1;
            }
        }
        reached
    }

    /// Sends `text` verbatim to every connected socket.
    pub fn publish_raw(&self, text: impl Into<String>) {
        let text = text.into();
        for client in lock(&self.inner.clients).values() {
            let _ = client.tx.send(ClientFrame::Text(text.clone()));
        }
    }

    /// Closes every connected socket from the server side.
    pub fn disconnect_all(&self) {
        for client in lock(&self.inner.clients).values() {
            let _ = client.tx.send(ClientFrame::Close);
        }
    }

    /// Stops (or resumes) answering `ping` with `pong`.
    pub fn set_mute_pong(&self, muted: bool) {
        self.inner.mute_pong.store(muted, Ordering::Relaxed);
    }

    /// Every command text received so far, in arrival order.
    pub fn received_commands(&self) -> Vec<String> {
        lock(&self.inner.commands).clone()
    }

    pub fn clear_received_commands(&self) {
        lock(&self.inner.commands).clear();
    }

    /// Sockets accepted since start, including closed ones.
    pub fn connection_count(&self) -> usize {
        self.inner.connections.load(Ordering::Relaxed)
    }

    pub fn client_count(&self) -> usize {
        lock(&self.inner.clients).len()
    }

    /// Distinct `(event, filter)` pairs any socket is subscribed to.
    pub fn subscriptions(&self) -> Vec<(String, UriFilter)> {
        let clients = lock(&self.inner.clients);
        let mut pairs: Vec<(String, UriFilter)> = clients
            .values()
            .flat_map(|client| client.subscriptions.iter().cloned())
            .collect();
        pairs.sort();
        pairs.dedup();
        pairs
    }

    /// Cancelled when the server shuts down; open sockets close on it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    pub(crate) fn connect(&self, tx: mpsc::UnboundedSender<ClientFrame>) -> usize {
        let id = self.inner.next_client.fetch_add(1, Ordering::Relaxed) + 1;
        self.inner.connections.fetch_add(1, Ordering::Relaxed);
        lock(&self.inner.clients).insert(
            id,
            Client {
                subscriptions: HashSet::new(),
                tx,
            },
        );
        id
    }

    pub(crate) fn disconnect(&self, client: usize) {
        lock(&self.inner.clients).remove(&client);
    }

    /// Applies one inbound text frame of `client` and returns the reply, if
    /// any.
    pub(crate) fn handle_command(&self, client: usize, text: &str) -> Option<String> {
        lock(&self.inner.commands).push(text.to_string());
        let command = match text.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                tracing::debug!(client, error = %e, "ignoring unknown frame");
                return None;
            }
        };

        let mut clients = lock(&self.inner.clients);
        let subscriptions = &mut clients.get_mut(&client)?.subscriptions;
        match command {
            Command::Ping if self.inner.mute_pong.load(Ordering::Relaxed) => None,
            Command::Ping => Some(crate::realtime::command::PONG.to_string()),
            Command::Subscribe { event, filter } => {
                subscriptions.insert((event, filter));
                None
            }
            Command::Unsubscribe { event, filter } => {
                subscriptions.remove(&(event, filter));
                None
            }
        }
    }
}

fn record_id(record: &Value) -> Option<String> {
    match record {
        Value::Object(object) => record_id_in(object),
        _ => None,
    }
}

fn record_id_in(object: &Map<String, Value>) -> Option<String> {
    match object.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn subscribed(state: &DummyState, commands: &[&str]) -> mpsc::UnboundedReceiver<ClientFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = state.connect(tx);
        for command in commands {
            state.handle_command(client, command);
        }
        rx
    }

    fn next_envelope(rx: &mut mpsc::UnboundedReceiver<ClientFrame>) -> Envelope {
        match rx.try_recv().unwrap() {
            ClientFrame::Text(text) => Envelope::parse(&text).unwrap(),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn routes_map_paths_to_storage_and_kind() {
        assert_eq!(
            Route::parse("/locations/L1/features"),
            Route {
                storage: "/locations/L1/features".into(),
                location: Some("L1".into()),
                kind: "features".into(),
            }
        );
        assert_eq!(Route::parse("/locations/L1/headsets").storage, "/headsets");
        assert_eq!(Route::parse("/photos").kind, "photos");
    }

    #[test]
    fn mutations_reach_matching_subscribers_only() {
        let state = DummyState::new();
        let mut l1 = subscribed(&state, &["subscribe features:created /locations/L1/features/*"]);
        let mut l2 = subscribed(&state, &["subscribe features:created /locations/L2/features/*"]);

        let created = state
            .create("/locations/L1/features", json!({"name": "door"}))
            .unwrap();
        assert_eq!(created["location_id"], "L1");

        let envelope = next_envelope(&mut l1);
        assert_eq!(envelope.event(), "features:created");
        assert_eq!(envelope.uri(), format!("/locations/L1/features/{}", created["id"].as_str().unwrap()));
        assert!(l2.try_recv().is_err());
    }

    #[test]
    fn headset_move_is_mirrored_on_location_views() {
        let state = DummyState::new();
        state.seed("/headsets", vec![json!({"id": "h1", "location_id": "L1"})]);
        let mut rx = subscribed(
            &state,
            &[
                "subscribe location-headsets:deleted /locations/L1/headsets/*",
                "subscribe location-headsets:created /locations/L2/headsets/*",
            ],
        );

        let mut fields = Map::new();
        fields.insert("location_id".into(), json!("L2"));
        state.patch("/headsets", "h1", fields).unwrap();

        assert_eq!(next_envelope(&mut rx).uri(), "/locations/L1/headsets/h1");
        assert_eq!(next_envelope(&mut rx).uri(), "/locations/L2/headsets/h1");
        assert_eq!(state.list("/locations/L2/headsets").len(), 1);
        assert!(state.list("/locations/L1/headsets").is_empty());
    }

    #[test]
    fn ping_is_answered_unless_muted() {
        let state = DummyState::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let client = state.connect(tx);
        assert_eq!(state.handle_command(client, "ping").as_deref(), Some("pong"));
        state.set_mute_pong(true);
        assert_eq!(state.handle_command(client, "ping"), None);
        assert_eq!(state.received_commands(), vec!["ping", "ping"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let state = DummyState::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = state.connect(tx);
        state.handle_command(client, "subscribe photos:deleted *");
        state.handle_command(client, "unsubscribe photos:deleted *");
        state.seed("/photos", vec![json!({"id": 3})]);
        assert!(state.delete("/photos", "3").is_some());
        assert!(rx.try_recv().is_err());
        assert!(state.subscriptions().is_empty());
    }
}
