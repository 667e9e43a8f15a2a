//! # Domain Model
//!
//! Typed records for everything the edge server manages, plus the two small
//! value types the map canvas needs to place them.
//!
//! - **`entities`**: `Headset`, `Location`, `Feature`, `Layer`, `Photo`,
//!   `Incident`, `User`, `Stream` and `WebsocketRecord`, all implementing the
//!   [`Entity`] trait the reconcilers key their maps with.
//! - **`feature_type`**: the closed set of feature kinds and their icons.
//! - **`viewport`**: image-to-screen scaling for a rendered layer image.

/// Server-managed records and the `Entity` trait.
pub mod entities;
/// Closed set of point-of-interest kinds with an icon fallback.
pub mod feature_type;
/// Explicit viewport metrics for coordinate scaling.
pub mod viewport;

pub use entities::{
    Entity, Feature, Headset, Incident, Layer, Location, Photo, Stream, User, WebsocketRecord,
};
pub use feature_type::FeatureType;
pub use viewport::{ImagePoint, ScreenPoint, ViewportMetrics};
