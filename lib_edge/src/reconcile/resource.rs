//! Resource kinds the edge server streams events for, and how each one is
//! scoped, fetched and filtered.

use std::fmt;

use crate::realtime::envelope::{Action, EventName};
use crate::realtime::filter::UriFilter;
use crate::retrieve::edge_api::Collection;

/// The value a reconciler's map is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    All,
    Location(String),
}

impl Scope {
    pub fn location(id: impl Into<String>) -> Self {
        Scope::Location(id.into())
    }

    pub fn location_id(&self) -> Option<&str> {
        match self {
            Scope::All => None,
            Scope::Location(id) => Some(id),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::All => f.write_str("*"),
            Scope::Location(id) => write!(f, "location {id}"),
        }
    }
}

/// How an entity or envelope is tested against a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeRule {
    /// Compare the entity's `location_id` with the scoped location.
    Field,
    /// Match the envelope uri against the scope's uri filter.
    Uri,
    /// Unscoped kind; everything is in scope.
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Headsets,
    LocationHeadsets,
    Features,
    Layers,
    Photos,
    Locations,
}

impl ResourceKind {
    /// Prefix of this kind's event names.
    pub fn event_prefix(self) -> &'static str {
        match self {
            ResourceKind::Headsets => "headsets",
            ResourceKind::LocationHeadsets => "location-headsets",
            ResourceKind::Features => "features",
            ResourceKind::Layers => "layers",
            ResourceKind::Photos => "photos",
            ResourceKind::Locations => "locations",
        }
    }

    pub fn event_name(self, action: Action) -> EventName {
        EventName::new(self.event_prefix(), action)
    }

    pub fn scope_rule(self) -> ScopeRule {
        match self {
            ResourceKind::Headsets | ResourceKind::Photos => ScopeRule::Field,
            ResourceKind::LocationHeadsets | ResourceKind::Features | ResourceKind::Layers => {
                ScopeRule::Uri
            }
            ResourceKind::Locations => ScopeRule::Any,
        }
    }

    /// Collection the snapshot for `scope` is fetched from.
    ///
    /// Path-scoped kinds need a location; asking for one under
    /// [`Scope::All`] yields `None`.
    pub fn collection(self, scope: &Scope) -> Option<Collection> {
        let location = scope.location_id().map(str::to_string);
        match self {
            ResourceKind::Headsets => Some(Collection::Headsets),
            ResourceKind::Photos => Some(Collection::Photos),
            ResourceKind::Locations => Some(Collection::Locations),
            ResourceKind::LocationHeadsets => location.map(Collection::LocationHeadsets),
            ResourceKind::Features => location.map(Collection::Features),
            ResourceKind::Layers => location.map(Collection::Layers),
        }
    }

    /// REST path of [`ResourceKind::collection`].
    pub fn collection_path(self, scope: &Scope) -> Option<String> {
        self.collection(scope).map(|collection| collection.path())
    }

    /// Uri filter the events for `scope` are subscribed with.
    pub fn uri_filter(self, scope: &Scope) -> UriFilter {
        match self.collection(scope) {
            Some(collection) => UriFilter::new(format!("{collection}/*")),
            None => UriFilter::wildcard(),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_prefix())
    }
}
