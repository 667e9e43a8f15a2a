use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::realtime::filter::UriFilter;

/// Heartbeat request, sent by the client.
pub const PING: &str = "ping";
/// Heartbeat acknowledgement, sent by the server.
pub const PONG: &str = "pong";

/// A client-to-server text command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Subscribe { event: String, filter: UriFilter },
    Unsubscribe { event: String, filter: UriFilter },
    Ping,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command verb `{0}`")]
    UnknownVerb(String),
    #[error("`{0}` needs an event name and a uri filter")]
    MissingArgument(&'static str),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Subscribe { event, filter } => write!(f, "subscribe {event} {filter}"),
            Command::Unsubscribe { event, filter } => write!(f, "unsubscribe {event} {filter}"),
            Command::Ping => f.write_str(PING),
        }
    }
}

impl FromStr for Command {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let verb = parts.next().ok_or(CommandParseError::Empty)?;
        match verb {
            PING => Ok(Command::Ping),
            "subscribe" => {
                let (event, filter) = arguments(&mut parts, "subscribe")?;
                Ok(Command::Subscribe { event, filter })
            }
            "unsubscribe" => {
                let (event, filter) = arguments(&mut parts, "unsubscribe")?;
                Ok(Command::Unsubscribe { event, filter })
            }
            other => Err(CommandParseError::UnknownVerb(other.to_string())),
        }
    }
}

fn arguments<'a>(
    parts: &mut impl Iterator<Item = &'a str>,
    verb: &'static str,
) -> Result<(String, UriFilter), CommandParseError> {
    let event = parts.next().ok_or(CommandParseError::MissingArgument(verb))?;
    let filter = parts.next().ok_or(CommandParseError::MissingArgument(verb))?;
    Ok((event.to_string(), UriFilter::new(filter)))
}
