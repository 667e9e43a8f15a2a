//! The synchronous half of a reconciler: one entity map, the scope it is
//! keyed to, and the bookkeeping that keeps REST snapshots and streamed
//! deltas from overwriting each other out of order.
//!
//! ## Generations and tickets
//!
//! Every scope change starts a new generation. Listeners and snapshot
//! requests remember the generation they were created under, and anything
//! arriving under an older one is dropped. Within a generation each snapshot
//! request gets an increasing `seq`; a response older than one already
//! applied is dropped too.
//!
//! ## The delta journal
//!
//! While a snapshot request is in flight, deltas are applied immediately and
//! also journaled with the seq of the newest request issued when they
//! arrived. When snapshot `s` lands, the map is replaced by it and the
//! journaled deltas tagged `>= s` are replayed on top. Deltas older than
//! request `s` are already reflected in its response.

use std::collections::BTreeSet;
use std::fmt::Display;
use std::sync::Arc;

use serde_json::Value;

use crate::model::Entity;
use crate::realtime::envelope::{Action, Envelope};
use crate::realtime::filter::UriFilter;
use crate::reconcile::entity_map::EntityMap;
use crate::reconcile::resource::{ResourceKind, Scope, ScopeRule};

/// A snapshot request issued under one scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub generation: u64,
    pub seq: u64,
    pub scope: Scope,
}

/// What became of a snapshot response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// The map now holds the snapshot (plus replayed deltas); carries its size.
    Applied(usize),
    /// Issued under an older scope, or superseded by a newer response.
    Stale,
    /// The fetch failed; the map was left as it was.
    Failed,
}

pub struct ReconcileState<E> {
    kind: ResourceKind,
    scope: Option<Scope>,
    filter: UriFilter,
    generation: u64,
    last_seq: u64,
    applied_seq: Option<u64>,
    in_flight: BTreeSet<u64>,
    journal: Vec<(u64, Arc<Envelope>)>,
    map: EntityMap<E>,
    last_error: Option<String>,
    revision: u64,
}

impl<E: Entity> ReconcileState<E> {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            scope: None,
            filter: UriFilter::wildcard(),
            generation: 0,
            last_seq: 0,
            applied_seq: None,
            in_flight: BTreeSet::new(),
            journal: Vec::new(),
            map: EntityMap::new(),
            last_error: None,
            revision: 0,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn map(&self) -> &EntityMap<E> {
        &self.map
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Bumped on every observable change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    /// Forgets the previous scope and starts a new generation with an empty
    /// map. Returns the new generation.
    pub fn begin_scope(&mut self, scope: Scope) -> u64 {
        self.reset();
        self.filter = self.kind.uri_filter(&scope);
        self.scope = Some(scope);
        self.generation
    }

    /// Drops the scope; nothing is applied until the next `begin_scope`.
    pub fn end(&mut self) {
        self.reset();
        self.scope = None;
    }

    fn reset(&mut self) {
        self.generation += 1;
        self.applied_seq = None;
        self.in_flight.clear();
        self.journal.clear();
        self.map.clear();
        self.last_error = None;
        self.touch();
    }

    /// Issues a snapshot request for the current scope, or `None` when no
    /// scope is set.
    pub fn issue(&mut self) -> Option<Ticket> {
        let scope = self.scope.clone()?;
        self.last_seq += 1;
        self.in_flight.insert(self.last_seq);
        self.touch();
        Some(Ticket {
            generation: self.generation,
            seq: self.last_seq,
            scope,
        })
    }

    fn is_current(&self, ticket: &Ticket) -> bool {
        ticket.generation == self.generation
            && self.applied_seq.is_none_or(|applied| ticket.seq > applied)
    }

    fn settle(&mut self, ticket: &Ticket) {
        if ticket.generation == self.generation {
            self.in_flight.remove(&ticket.seq);
            if self.in_flight.is_empty() {
                self.journal.clear();
            }
            self.touch();
        }
    }

    /// Replaces the map with `entities` if `ticket` is still current.
    pub fn apply_snapshot(&mut self, ticket: &Ticket, entities: Vec<E>) -> SnapshotOutcome {
        if !self.is_current(ticket) {
            tracing::debug!(kind = %self.kind, seq = ticket.seq, "discarding stale snapshot");
            self.settle(ticket);
            return SnapshotOutcome::Stale;
        }

        let scoped: Vec<E> = entities
            .into_iter()
            .filter(|entity| self.entity_in_scope(entity))
            .collect();
        self.map.replace_all(scoped);

        let replay: Vec<Arc<Envelope>> = self
            .journal
            .iter()
            .filter(|(tag, _)| *tag >= ticket.seq)
            .map(|(_, envelope)| Arc::clone(envelope))
            .collect();
        for envelope in &replay {
            self.apply_delta(envelope);
        }
        self.journal.retain(|(tag, _)| *tag >= ticket.seq);

        self.applied_seq = Some(ticket.seq);
        self.last_error = None;
        self.settle(ticket);
        tracing::debug!(
            kind = %self.kind,
            seq = ticket.seq,
            replayed = replay.len(),
            size = self.map.len(),
            "snapshot applied"
        );
        SnapshotOutcome::Applied(self.map.len())
    }

    /// Records a failed fetch. The map is left untouched.
    pub fn fail_snapshot(&mut self, ticket: &Ticket, error: impl Display) -> SnapshotOutcome {
        if !self.is_current(ticket) {
            self.settle(ticket);
            return SnapshotOutcome::Stale;
        }
        tracing::warn!(kind = %self.kind, scope = %ticket.scope, %error, "snapshot fetch failed");
        self.last_error = Some(error.to_string());
        self.settle(ticket);
        SnapshotOutcome::Failed
    }

    /// Applies a streamed delta received by a listener of `generation`.
    /// Returns whether the map changed.
    pub fn apply_envelope(&mut self, generation: u64, envelope: &Arc<Envelope>) -> bool {
        if generation != self.generation {
            return false;
        }
        match &self.scope {
            Some(scope) if self.kind.collection(scope).is_some() => {}
            _ => return false,
        }
        if !self.in_flight.is_empty() {
            self.journal.push((self.last_seq, Arc::clone(envelope)));
        }
        let changed = self.apply_delta(envelope);
        if changed {
            self.touch();
        }
        changed
    }

    fn apply_delta(&mut self, envelope: &Envelope) -> bool {
        let Some(name) = envelope.event_name() else {
            return false;
        };
        if name.kind() != self.kind.event_prefix() {
            return false;
        }
        if self.kind.scope_rule() == ScopeRule::Uri && !self.filter.matches(envelope.uri()) {
            return false;
        }

        match name.action() {
            Action::Created | Action::Updated => {
                let Some(current) = decode::<E>(envelope.payload.current.as_ref(), envelope) else {
                    return false;
                };
                if self.entity_in_scope(&current) {
                    self.map.upsert(current);
                    true
                } else {
                    // Moved out of scope; a fresh fetch would no longer list it.
                    self.map.remove(current.id()).is_some()
                }
            }
            Action::Deleted => match envelope.payload.previous.as_ref().and_then(raw_id) {
                Some(id) => self.map.remove(&id).is_some(),
                None => {
                    tracing::warn!(event = envelope.event(), "delete without previous id");
                    false
                }
            },
        }
    }

    fn entity_in_scope(&self, entity: &E) -> bool {
        match (self.kind.scope_rule(), &self.scope) {
            (ScopeRule::Field, Some(Scope::Location(location))) => {
                entity.location_id() == Some(location.as_str())
            }
            _ => true,
        }
    }
}

fn decode<E: Entity>(value: Option<&Value>, envelope: &Envelope) -> Option<E> {
    let Some(value) = value else {
        tracing::warn!(event = envelope.event(), "envelope without current entity");
        return None;
    };
    match serde_json::from_value(value.clone()) {
        Ok(entity) => Some(entity),
        Err(e) => {
            tracing::warn!(event = envelope.event(), error = %e, "undecodable entity");
            None
        }
    }
}

fn raw_id(value: &Value) -> Option<String> {
    match value.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Feature, Headset};
    use crate::realtime::envelope::Payload;
    use serde_json::json;

    fn feature(id: &str, location: &str, name: &str) -> Value {
        json!({"id": id, "location_id": location, "name": name, "type": "door"})
    }

    fn headset(id: &str, location: &str) -> Value {
        json!({"id": id, "location_id": location, "name": format!("hs-{id}")})
    }

    fn created(kind: &str, uri: &str, current: Value) -> Arc<Envelope> {
        Arc::new(Envelope::new(
            format!("{kind}:created"),
            uri,
            Payload {
                current: Some(current),
                previous: None,
            },
        ))
    }

    fn updated(kind: &str, uri: &str, previous: Value, current: Value) -> Arc<Envelope> {
        Arc::new(Envelope::new(
            format!("{kind}:updated"),
            uri,
            Payload {
                current: Some(current),
                previous: Some(previous),
            },
        ))
    }

    fn deleted(kind: &str, uri: &str, previous: Value) -> Arc<Envelope> {
        Arc::new(Envelope::new(
            format!("{kind}:deleted"),
            uri,
            Payload {
                current: None,
                previous: Some(previous),
            },
        ))
    }

    fn features(values: &[Value]) -> Vec<Feature> {
        values
            .iter()
            .map(|v| serde_json::from_value(v.clone()).unwrap())
            .collect()
    }

    fn features_at_l1() -> (ReconcileState<Feature>, u64) {
        let mut state = ReconcileState::<Feature>::new(ResourceKind::Features);
        let generation = state.begin_scope(Scope::location("L1"));
        (state, generation)
    }

    #[test]
    fn deltas_converge_with_a_fresh_fetch() {
        let (mut state, generation) = features_at_l1();
        let ticket = state.issue().unwrap();
        state.apply_snapshot(&ticket, features(&[feature("1", "L1", "a")]));

        let uri = "/locations/L1/features/";
        state.apply_envelope(generation, &created("features", &format!("{uri}2"), feature("2", "L1", "b")));
        state.apply_envelope(
            generation,
            &updated("features", &format!("{uri}1"), feature("1", "L1", "a"), feature("1", "L1", "a2")),
        );
        state.apply_envelope(generation, &deleted("features", &format!("{uri}2"), feature("2", "L1", "b")));

        let fresh = features(&[feature("1", "L1", "a2")]);
        assert_eq!(state.map().snapshot(), fresh);
    }

    #[test]
    fn events_for_another_location_are_ignored() {
        let (mut state, generation) = features_at_l1();
        let changed = state.apply_envelope(
            generation,
            &created("features", "/locations/L2/features/9", feature("9", "L2", "x")),
        );
        assert!(!changed);
        assert!(state.map().is_empty());
    }

    #[test]
    fn repeated_create_is_idempotent() {
        let (mut state, generation) = features_at_l1();
        let event = created("features", "/locations/L1/features/1", feature("1", "L1", "a"));
        state.apply_envelope(generation, &event);
        state.apply_envelope(generation, &event);
        assert_eq!(state.map().len(), 1);
    }

    #[test]
    fn create_during_fetch_survives_an_older_snapshot() {
        let (mut state, generation) = features_at_l1();
        let ticket = state.issue().unwrap();

        // F2 is created after the request left, the response only has F1.
        state.apply_envelope(
            generation,
            &created("features", "/locations/L1/features/2", feature("2", "L1", "F2")),
        );
        let outcome = state.apply_snapshot(&ticket, features(&[feature("1", "L1", "F1")]));

        assert_eq!(outcome, SnapshotOutcome::Applied(2));
        assert_eq!(state.map().ids(), vec!["1", "2"]);
        assert!(!state.is_loading());
    }

    #[test]
    fn update_during_fetch_survives_an_older_snapshot() {
        let (mut state, generation) = features_at_l1();
        let ticket = state.issue().unwrap();

        state.apply_envelope(
            generation,
            &updated(
                "features",
                "/locations/L1/features/1",
                feature("1", "L1", "F1"),
                feature("1", "L1", "F1 renamed"),
            ),
        );
        state.apply_snapshot(&ticket, features(&[feature("1", "L1", "F1")]));

        assert_eq!(state.map().ids(), vec!["1"]);
        assert_eq!(state.map().get("1").map(|f| f.name.as_str()), Some("F1 renamed"));
    }

    #[test]
    fn delete_during_fetch_survives_an_older_snapshot() {
        let (mut state, generation) = features_at_l1();
        let ticket = state.issue().unwrap();

        state.apply_envelope(
            generation,
            &deleted("features", "/locations/L1/features/1", feature("1", "L1", "F1")),
        );
        let outcome = state.apply_snapshot(&ticket, features(&[feature("1", "L1", "F1")]));

        assert_eq!(outcome, SnapshotOutcome::Applied(0));
        assert!(state.map().is_empty());
        assert!(!state.is_loading());
    }

    #[test]
    fn path_scoped_kind_ignores_deltas_without_a_location() {
        let mut state = ReconcileState::<Feature>::new(ResourceKind::Features);
        let generation = state.begin_scope(Scope::All);

        let changed = state.apply_envelope(
            generation,
            &created("features", "/locations/L2/features/9", feature("9", "L2", "F9")),
        );

        assert!(!changed);
        assert!(state.map().is_empty());
    }

    #[test]
    fn create_after_snapshot_is_applied_on_top() {
        let (mut state, generation) = features_at_l1();
        let ticket = state.issue().unwrap();
        state.apply_snapshot(&ticket, features(&[feature("1", "L1", "F1")]));
        state.apply_envelope(
            generation,
            &created("features", "/locations/L1/features/2", feature("2", "L1", "F2")),
        );
        assert_eq!(state.map().ids(), vec!["1", "2"]);
    }

    #[test]
    fn snapshot_from_previous_location_is_discarded() {
        let mut state = ReconcileState::<Feature>::new(ResourceKind::Features);
        let old_generation = state.begin_scope(Scope::location("L1"));
        let l1 = state.issue().unwrap();

        let generation = state.begin_scope(Scope::location("L2"));
        let l2 = state.issue().unwrap();

        assert_eq!(
            state.apply_snapshot(&l2, features(&[feature("7", "L2", "b")])),
            SnapshotOutcome::Applied(1)
        );
        assert_eq!(
            state.apply_snapshot(&l1, features(&[feature("1", "L1", "a")])),
            SnapshotOutcome::Stale
        );
        assert_eq!(state.map().ids(), vec!["7"]);

        // Listeners of the old generation are stale as well.
        assert!(!state.apply_envelope(
            old_generation,
            &created("features", "/locations/L2/features/8", feature("8", "L2", "c")),
        ));
        assert!(state.apply_envelope(
            generation,
            &created("features", "/locations/L2/features/8", feature("8", "L2", "c")),
        ));
    }

    #[test]
    fn older_response_in_same_generation_is_discarded() {
        let (mut state, _) = features_at_l1();
        let first = state.issue().unwrap();
        let second = state.issue().unwrap();
        state.apply_snapshot(&second, features(&[feature("2", "L1", "new")]));
        assert_eq!(
            state.apply_snapshot(&first, features(&[feature("1", "L1", "old")])),
            SnapshotOutcome::Stale
        );
        assert_eq!(state.map().ids(), vec!["2"]);
    }

    #[test]
    fn failed_fetch_keeps_the_map_and_records_the_error() {
        let (mut state, _) = features_at_l1();
        let ticket = state.issue().unwrap();
        state.apply_snapshot(&ticket, features(&[feature("1", "L1", "a")]));

        let retry = state.issue().unwrap();
        assert!(state.is_loading());
        assert_eq!(state.fail_snapshot(&retry, "server returned 500"), SnapshotOutcome::Failed);
        assert_eq!(state.map().ids(), vec!["1"]);
        assert_eq!(state.last_error(), Some("server returned 500"));
        assert!(!state.is_loading());

        let again = state.issue().unwrap();
        state.apply_snapshot(&again, features(&[]));
        assert_eq!(state.last_error(), None);
    }

    #[test]
    fn headset_moving_to_another_location_leaves_the_map() {
        let mut state = ReconcileState::<Headset>::new(ResourceKind::Headsets);
        let generation = state.begin_scope(Scope::location("L1"));
        let ticket = state.issue().unwrap();
        let fetched: Vec<Headset> = vec![
            serde_json::from_value(headset("h1", "L1")).unwrap(),
            serde_json::from_value(headset("h2", "L2")).unwrap(),
        ];
        state.apply_snapshot(&ticket, fetched);
        assert_eq!(state.map().ids(), vec!["h1"]);

        assert!(state.apply_envelope(
            generation,
            &updated("headsets", "/headsets/h1", headset("h1", "L1"), headset("h1", "L2")),
        ));
        assert!(state.map().is_empty());

        assert!(!state.apply_envelope(generation, &created("headsets", "/headsets/h3", headset("h3", "L3"))));
    }

    #[test]
    fn delete_accepts_numeric_ids() {
        let (mut state, generation) = features_at_l1();
        state.apply_envelope(
            generation,
            &created("features", "/locations/L1/features/5", json!({"id": 5, "location_id": "L1"})),
        );
        assert!(state.apply_envelope(
            generation,
            &deleted("features", "/locations/L1/features/5", json!({"id": 5})),
        ));
        assert!(state.map().is_empty());
    }

    #[test]
    fn end_drops_everything() {
        let (mut state, generation) = features_at_l1();
        state.apply_envelope(
            generation,
            &created("features", "/locations/L1/features/1", feature("1", "L1", "a")),
        );
        state.end();
        assert!(state.scope().is_none());
        assert!(state.map().is_empty());
        assert!(state.issue().is_none());
        assert!(!state.apply_envelope(
            state.generation(),
            &created("features", "/locations/L1/features/2", feature("2", "L1", "b")),
        ));
    }
}
