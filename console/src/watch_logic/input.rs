use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use crate::watch_logic::session::Session;

/// A location id typed on stdin, or `None` for blank lines.
pub fn parse_location(line: &str) -> Option<&str> {
    let location = line.trim();
    (!location.is_empty() && !location.contains(char::is_whitespace)).then_some(location)
}

/// Switches the session to each location entered on stdin.
pub async fn run(session: Arc<Session>, mut shutdown: broadcast::Receiver<()>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.recv() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) => match parse_location(&line) {
                Some(location) => {
                    tracing::info!(location, "switching location");
                    session.switch(location).await;
                }
                None => tracing::debug!(line, "ignoring input"),
            },
            Ok(None) => {
                tracing::debug!("stdin closed");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot read stdin");
                break;
            }
        }
    }
}
