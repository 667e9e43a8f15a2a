use lib_edge::model::{Feature, Headset};
use lib_edge::realtime::Multiplexer;
use lib_edge::reconcile::{Reconciler, ResourceKind, Scope, SnapshotOutcome};
use lib_edge::retrieve::EdgeApi;
use tokio::sync::watch;

/// The reconcilers one watched location needs.
pub struct Session {
    pub headsets: Reconciler<Headset, EdgeApi>,
    pub features: Reconciler<Feature, EdgeApi>,
}

impl Session {
    pub fn new(mux: Multiplexer, api: EdgeApi) -> Self {
        Self {
            headsets: Reconciler::new(ResourceKind::Headsets, mux.clone(), api.clone()),
            features: Reconciler::new(ResourceKind::Features, mux, api),
        }
    }

    /// Points both maps at `location` and waits for their snapshots.
    pub async fn switch(&self, location: &str) {
        let scope = Scope::location(location);
        let (headsets, features) = tokio::join!(
            self.headsets.set_scope(scope.clone()),
            self.features.set_scope(scope)
        );
        for (kind, outcome) in [("headsets", headsets), ("features", features)] {
            match outcome {
                SnapshotOutcome::Applied(count) => tracing::info!(location, kind, count, "snapshot loaded"),
                SnapshotOutcome::Stale => tracing::debug!(location, kind, "snapshot superseded"),
                SnapshotOutcome::Failed => tracing::warn!(location, kind, "snapshot failed, showing live updates only"),
            }
        }
    }

    pub fn location(&self) -> Option<String> {
        self.features
            .scope()
            .and_then(|scope| scope.location_id().map(str::to_string))
    }

    pub fn changes(&self) -> (watch::Receiver<u64>, watch::Receiver<u64>) {
        (self.headsets.changes(), self.features.changes())
    }

    pub fn close(&self) {
        self.headsets.close();
        self.features.close();
    }
}
