//! # lib_edge
//!
//! Client-side core of the AR edge console. Headsets report position and
//! orientation to the edge server; operators watch locations, layers,
//! features and photos update live. This crate owns the part of that console
//! with real engineering weight:
//!
//! - **`realtime`**: one reconnecting WebSocket per application, with a
//!   ping/pong heartbeat, and a multiplexer that fans the edge server's event
//!   envelopes out to every registered listener.
//! - **`reconcile`**: per-view entity maps seeded from a REST snapshot and
//!   kept current from streamed create/update/delete events, scoped to the
//!   selected location and immune to late responses from a previous scope.
//! - **`retrieve`**: the REST client the snapshots are fetched with.
//!
//! Ambient modules (`configs`, `loggers`, `model`, `dummy`) are gated behind
//! features of the same name so binaries only pay for what they use.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

#[cfg(feature = "configs")]
pub mod configs;
#[cfg(feature = "dummy")]
pub mod dummy;
#[cfg(feature = "loggers")]
pub mod loggers;
#[cfg(feature = "model")]
pub mod model;
#[cfg(feature = "realtime")]
pub mod realtime;
#[cfg(feature = "reconcile")]
pub mod reconcile;
#[cfg(feature = "retrieve")]
pub mod retrieve;
