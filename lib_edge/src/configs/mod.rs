//! # Configuration Modules
//!
//! Layered settings for the console binaries: built-in defaults, then an
//! optional JSON file, then environment variables and command line flags.
//! The merged [`ClientConfig`] is validated into [`EdgeSettings`], which
//! carries ready-made transport and multiplexer configuration.

/// Client settings, their merge order and validation.
pub mod settings;

pub use settings::{ClientConfig, ConfigError, DEFAULT_CONFIG_FILE, EdgeSettings};
