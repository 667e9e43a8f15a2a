//! # Data Retrieval Module
//!
//! HTTP access to the edge server's REST API.
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: a generic `ApiClient` built on `reqwest` and
//!   `reqwest-middleware`, retrying transient failures with exponential
//!   backoff and normalising every response into an `ApiResponse`.
//! - **`edge_api`**: the typed collection/item surface of the edge server
//!   (`/headsets`, `/locations/{id}/features`, ...) on top of `ApiClient`.

/// Generic HTTP API client with retry middleware for resilient network requests.
pub mod ky_http;
/// Typed CRUD access to the edge server's collections.
pub mod edge_api;

pub use edge_api::{Collection, EdgeApi};
pub use ky_http::{ApiClient, ApiError, ApiResponse};
