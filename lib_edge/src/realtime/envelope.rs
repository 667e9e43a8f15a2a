//! # Event Envelopes
//!
//! The edge server announces every change as a JSON text frame:
//!
//! ```json
//! { "_meta": { "event": "features:created", "uri": "/locations/L1/features/F2" },
//!   "current": { "id": "F2", ... } }
//! ```
//!
//! `current` is present for creates and updates, `previous` for updates and
//! deletes. The payload is kept as raw JSON here; the reconciler that owns a
//! given entity kind decides what type to decode it into.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What happened to the resource an envelope describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    Created,
    Updated,
    Deleted,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::Created, Action::Updated, Action::Deleted];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Created => "created",
            Action::Updated => "updated",
            Action::Deleted => "deleted",
        }
    }
}

impl FromStr for Action {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Action::Created),
            "updated" => Ok(Action::Updated),
            "deleted" => Ok(Action::Deleted),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `<resource-kind>:<action>` event name, e.g. `headsets:updated`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventName {
    kind: String,
    action: Action,
}

impl EventName {
    pub fn new(kind: impl Into<String>, action: Action) -> Self {
        Self {
            kind: kind.into(),
            action,
        }
    }

    /// Splits on the last `:`; `None` for names without a known action.
    pub fn parse(name: &str) -> Option<Self> {
        let (kind, action) = name.rsplit_once(':')?;
        if kind.is_empty() {
            return None;
        }
        Some(Self::new(kind, action.parse().ok()?))
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn action(&self) -> Action {
        self.action
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.action)
    }
}

/// Routing metadata carried under `_meta`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMeta {
    pub event: String,
    pub uri: String,
}

/// The envelope minus its metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "_meta")]
    pub meta: EventMeta,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Envelope {
    pub fn new(event: impl Into<String>, uri: impl Into<String>, payload: Payload) -> Self {
        Self {
            meta: EventMeta {
                event: event.into(),
                uri: uri.into(),
            },
            payload,
        }
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> String {
        // Serialising a struct of strings and `Value`s cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn event(&self) -> &str {
        &self.meta.event
    }

    pub fn uri(&self) -> &str {
        &self.meta.uri
    }

    pub fn event_name(&self) -> Option<EventName> {
        EventName::parse(&self.meta.event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_create_envelope() {
        let text = r#"{"_meta":{"event":"features:created","uri":"/locations/L1/features/F2"},
                       "current":{"id":"F2","name":"Door"}}"#;
        let env = Envelope::parse(text).unwrap();
        assert_eq!(env.event(), "features:created");
        assert_eq!(env.uri(), "/locations/L1/features/F2");
        assert_eq!(env.payload.current, Some(json!({"id": "F2", "name": "Door"})));
        assert_eq!(env.payload.previous, None);

        let name = env.event_name().unwrap();
        assert_eq!(name.kind(), "features");
        assert_eq!(name.action(), Action::Created);
    }

    #[test]
    fn missing_meta_is_a_protocol_violation() {
        assert!(Envelope::parse(r#"{"current":{"id":"F2"}}"#).is_err());
        assert!(Envelope::parse("pong").is_err());
        assert!(Envelope::parse(r#"{"_meta":{"event":"x:created"}}"#).is_err());
    }

    #[test]
    fn event_names_need_a_known_action() {
        assert_eq!(
            EventName::parse("location-headsets:deleted"),
            Some(EventName::new("location-headsets", Action::Deleted))
        );
        assert_eq!(EventName::parse("headsets:moved"), None);
        assert_eq!(EventName::parse("headsets"), None);
        assert_eq!(EventName::parse(":created"), None);
    }

    #[test]
    fn serialises_back_to_wire_shape() {
        let env = Envelope::new(
            "layers:deleted",
            "/locations/L1/layers/3",
            Payload {
                current: None,
                previous: Some(json!({"id": 3})),
            },
        );
        let v: Value = serde_json::from_str(&env.to_json()).unwrap();
        assert_eq!(v["_meta"]["event"], "layers:deleted");
        assert_eq!(v["previous"]["id"], 3);
        assert!(v.get("current").is_none());
    }
}
