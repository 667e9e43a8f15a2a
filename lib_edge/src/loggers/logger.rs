use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::non_blocking;
use tracing_appender::rolling::{Builder, InitError, Rotation};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Log files of earlier runs kept next to the current one.
pub const KEEP_PREVIOUS: usize = 4;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("log directory error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid log level {level:?}: {source}")]
    Level { level: String, source: ParseError },

    #[error("cannot open log file: {0}")]
    File(#[from] InitError),

    #[error("a global subscriber is already installed: {0}")]
    Init(#[from] TryInitError),
}

/// Installs the global subscriber for `app`.
///
/// `RUST_LOG` wins over `level` when set. Console output is human readable;
/// the file under `log_dir` gets one JSON object per event. The returned
/// guard flushes the file writer on drop and must live as long as the
/// program logs.
pub fn setup_logging(log_dir: &Path, level: &str, app: &str) -> Result<WorkerGuard, LoggerError> {
    fs::create_dir_all(log_dir)?;
    let removed = cleanup_old_logs(log_dir, app, KEEP_PREVIOUS)?;

    let file_stem = log_file_stem(app);
    let appender = Builder::new()
        .rotation(Rotation::NEVER)
        .filename_prefix(&file_stem)
        .filename_suffix("log")
        .build(log_dir)?;
    let (writer, guard) = non_blocking(appender);

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).map_err(|source| LoggerError::Level {
            level: level.to_string(),
            source,
        })?,
    };

    let console_layer = fmt::layer().with_target(true).with_ansi(true);
    let file_layer = fmt::layer().with_ansi(false).with_writer(writer).json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!(level, file = %log_dir.join(format!("{file_stem}.log")).display(), removed, "logging initialized");
    Ok(guard)
}

fn log_file_stem(app: &str) -> String {
    format!("{app}_{}", chrono::Local::now().format("%Y-%m-%d_%H-%M-%S"))
}

/// Deletes all but the newest `keep` log files of `app` in `log_dir` and
/// returns how many were deleted. Files of other apps are left alone.
pub fn cleanup_old_logs(log_dir: &Path, app: &str, keep: usize) -> io::Result<usize> {
    let prefix = format!("{app}_");
    let mut files: Vec<PathBuf> = fs::read_dir(log_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            let is_log = path.extension().is_some_and(|ext| ext == "log");
            let is_ours = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&prefix));
            is_log && is_ours
        })
        .collect();

    // Timestamped names sort chronologically; newest first.
    files.sort_by(|a, b| b.file_name().cmp(&a.file_name()));

    let mut removed = 0;
    for old in files.iter().skip(keep) {
        match fs::remove_file(old) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!("Failed to delete old log file {}: {e}", old.display()),
        }
    }
    Ok(removed)
}
