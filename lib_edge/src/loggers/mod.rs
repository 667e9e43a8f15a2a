//! # Loggers
//!
//! `tracing` subscriber installation for the binaries: a console layer and a
//! JSON file layer behind one `EnvFilter`, writing one file per run and
//! pruning the files of earlier runs.

/// Subscriber setup and log file pruning.
pub mod logger;

pub use logger::{LoggerError, cleanup_old_logs, setup_logging};
