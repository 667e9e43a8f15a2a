//! # Entity Reconciler
//!
//! Keeps one [`EntityMap`] for one resource kind current for one consuming
//! view. A scope change tears down the previous scope's listeners, empties
//! the map, subscribes the kind's three event names under the new scope's
//! uri filter, and fetches a REST snapshot; [`ReconcileState`] decides what
//! of each snapshot and delta actually lands.
//!
//! Views re-render off [`Reconciler::changes`], a `watch` channel carrying
//! the state's revision number.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::watch;

use crate::model::Entity;
use crate::realtime::envelope::Action;
use crate::realtime::multiplexer::{Multiplexer, SubscriptionId};
use crate::reconcile::entity_map::EntityMap;
use crate::reconcile::resource::{ResourceKind, Scope};
use crate::reconcile::source::{FetchError, SnapshotSource};
use crate::reconcile::state::{ReconcileState, SnapshotOutcome, Ticket};

struct Shared<E> {
    state: Mutex<ReconcileState<E>>,
    revision: watch::Sender<u64>,
}

impl<E: Entity> Shared<E> {
    fn state(&self) -> MutexGuard<'_, ReconcileState<E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` on the state and publishes the revision if it moved.
    fn update<R>(&self, f: impl FnOnce(&mut ReconcileState<E>) -> R) -> R {
        let (result, revision) = {
            let mut state = self.state();
            let result = f(&mut state);
            (result, state.revision())
        };
        self.revision.send_if_modified(|current| {
            if *current == revision {
                return false;
            }
            *current = revision;
            true
        });
        result
    }
}

pub struct Reconciler<E: Entity, S: SnapshotSource<E>> {
    kind: ResourceKind,
    mux: Multiplexer,
    source: S,
    shared: Arc<Shared<E>>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

impl<E: Entity, S: SnapshotSource<E>> Reconciler<E, S> {
    /// An unscoped reconciler; nothing is subscribed until [`Reconciler::set_scope`].
    pub fn new(kind: ResourceKind, mux: Multiplexer, source: S) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            kind,
            mux,
            source,
            shared: Arc::new(Shared {
                state: Mutex::new(ReconcileState::new(kind)),
                revision,
            }),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    fn subscriptions(&self) -> MutexGuard<'_, Vec<SubscriptionId>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel_all(&self, subscriptions: &mut Vec<SubscriptionId>) {
        for id in subscriptions.drain(..) {
            self.mux.cancel(id);
        }
    }

    /// Switches the map to `scope` and waits for its snapshot.
    ///
    /// The returned outcome is [`SnapshotOutcome::Stale`] when another
    /// `set_scope` overtook this one before its snapshot arrived.
    pub async fn set_scope(&self, scope: Scope) -> SnapshotOutcome {
        let (ticket, scoped) = {
            let mut subscriptions = self.subscriptions();
            self.cancel_all(&mut subscriptions);

            let (generation, ticket) = self.shared.update(|state| {
                let generation = state.begin_scope(scope.clone());
                (generation, state.issue())
            });

            // A path-scoped kind under `Scope::All` has no collection to
            // converge with, so it gets no listeners either.
            let scoped = self.kind.collection(&scope).is_some();
            if scoped {
                let filter = self.kind.uri_filter(&scope);
                for action in Action::ALL {
                    let weak: Weak<Shared<E>> = Arc::downgrade(&self.shared);
                    let id = self.mux.subscribe(
                        self.kind.event_name(action).to_string(),
                        filter.clone(),
                        move |envelope| {
                            if let Some(shared) = weak.upgrade() {
                                shared.update(|state| state.apply_envelope(generation, envelope));
                            }
                        },
                    );
                    subscriptions.push(id);
                }
                tracing::info!(kind = %self.kind, %scope, %filter, generation, "scope set");
            }
            (ticket, scoped)
        };

        match ticket {
            Some(ticket) if !scoped => self.shared.update(|state| {
                state.fail_snapshot(&ticket, FetchError::Unscoped { kind: self.kind })
            }),
            Some(ticket) => self.load(ticket).await,
            None => SnapshotOutcome::Stale,
        }
    }

    /// Re-fetches the snapshot for the current scope.
    pub async fn refresh(&self) -> SnapshotOutcome {
        match self.shared.update(|state| state.issue()) {
            Some(ticket) => self.load(ticket).await,
            None => SnapshotOutcome::Stale,
        }
    }

    async fn load(&self, ticket: Ticket) -> SnapshotOutcome {
        let result = self.source.fetch(self.kind, &ticket.scope).await;
        self.shared.update(|state| match result {
            Ok(entities) => state.apply_snapshot(&ticket, entities),
            Err(e) => state.fail_snapshot(&ticket, e),
        })
    }

    /// Cancels every listener and drops the map. In-flight fetches resolve
    /// as stale.
    pub fn close(&self) {
        let mut subscriptions = self.subscriptions();
        self.cancel_all(&mut subscriptions);
        self.shared.update(|state| state.end());
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn scope(&self) -> Option<Scope> {
        self.shared.state().scope().cloned()
    }

    /// Owned copy of the map, ordered by id.
    pub fn snapshot(&self) -> Vec<E> {
        self.shared.state().map().snapshot()
    }

    pub fn get(&self, id: &str) -> Option<E> {
        self.shared.state().map().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.shared.state().map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.state().map().is_empty()
    }

    /// Reads the map in place; `f` must not call back into this reconciler.
    pub fn with_map<R>(&self, f: impl FnOnce(&EntityMap<E>) -> R) -> R {
        f(self.shared.state().map())
    }

    /// Error of the last failed fetch, cleared by the next applied snapshot.
    pub fn last_error(&self) -> Option<String> {
        self.shared.state().last_error().map(str::to_string)
    }

    pub fn is_loading(&self) -> bool {
        self.shared.state().is_loading()
    }

    /// Revision counter bumped on every change of the map or its status.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }
}

impl<E: Entity, S: SnapshotSource<E>> Drop for Reconciler<E, S> {
    fn drop(&mut self) {
        let mut subscriptions = self.subscriptions();
        self.cancel_all(&mut subscriptions);
    }
}
