use std::future::Future;

use thiserror::Error;

use crate::model::Entity;
use crate::reconcile::resource::{ResourceKind, Scope};
use crate::retrieve::edge_api::EdgeApi;
use crate::retrieve::ky_http::ApiError;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{kind} needs a location scope")]
    Unscoped { kind: ResourceKind },

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Where a reconciler's REST snapshots come from.
pub trait SnapshotSource<E: Entity>: Send + Sync + 'static {
    /// Lists every `kind` entity under `scope`. Field-scoped kinds may
    /// return entities of other locations; the reconciler drops them.
    fn fetch(
        &self,
        kind: ResourceKind,
        scope: &Scope,
    ) -> impl Future<Output = Result<Vec<E>, FetchError>> + Send;
}

impl<E: Entity> SnapshotSource<E> for EdgeApi {
    fn fetch(
        &self,
        kind: ResourceKind,
        scope: &Scope,
    ) -> impl Future<Output = Result<Vec<E>, FetchError>> + Send {
        let collection = kind.collection(scope);
        async move {
            let collection = collection.ok_or(FetchError::Unscoped { kind })?;
            Ok(self.list(&collection).await?)
        }
    }
}
