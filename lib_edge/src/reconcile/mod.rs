//! # Reconcile Module
//!
//! Per-view entity caches that stay equal to what a fresh REST fetch would
//! return, without refetching.
//!
//! ## Contained Modules:
//!
//! - **`resource`**: the resource kinds, their event names, collection paths
//!   and uri filters, and how each is scoped to a location.
//! - **`entity_map`**: the `id -> entity` map a reconciler owns.
//! - **`state`**: generation/ticket bookkeeping and delta application,
//!   free of any I/O.
//! - **`source`**: where snapshots come from; implemented for `EdgeApi`.
//! - **`reconciler`**: the async driver tying a `Multiplexer`, a snapshot
//!   source and the state together.

pub mod entity_map;
pub mod reconciler;
pub mod resource;
pub mod source;
pub mod state;

pub use entity_map::EntityMap;
pub use reconciler::Reconciler;
pub use resource::{ResourceKind, Scope, ScopeRule};
pub use source::{FetchError, SnapshotSource};
pub use state::{ReconcileState, SnapshotOutcome, Ticket};
