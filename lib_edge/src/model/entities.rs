//! # Entities
//!
//! Every record the edge server manages carries an opaque `id`. The server is
//! inconsistent about whether ids are JSON strings or numbers, so they are
//! normalised to strings on the way in. Fields this console does not model
//! are kept in `extra` so a cached record can always be replaced wholesale
//! without losing data.

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::model::feature_type::FeatureType;

/// A server-managed record that can live in an entity map.
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The record's unique id.
    fn id(&self) -> &str;

    /// The location this record is scoped to, if its kind is location-scoped.
    fn location_id(&self) -> Option<&str> {
        None
    }
}

fn string_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!("expected string or number id, got {other}"))),
    }
}

fn optional_string_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

/// A device reporting its pose to the edge server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Headset {
    #[serde(deserialize_with = "string_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Location the headset last checked in at.
    #[serde(default, deserialize_with = "optional_string_id")]
    pub location_id: Option<String>,
    #[serde(default)]
    pub position_x: f64,
    #[serde(default)]
    pub position_y: f64,
    #[serde(default)]
    pub position_z: f64,
    #[serde(default)]
    pub orientation_x: f64,
    #[serde(default)]
    pub orientation_y: f64,
    #[serde(default)]
    pub orientation_z: f64,
    #[serde(default)]
    pub orientation_w: f64,
    /// Unix time of the last pose report.
    #[serde(default)]
    pub last_update: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity for Headset {
    fn id(&self) -> &str {
        &self.id
    }

    fn location_id(&self) -> Option<&str> {
        self.location_id.as_deref()
    }
}

/// A site ("map") operators track headsets in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(deserialize_with = "string_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity for Location {
    fn id(&self) -> &str {
        &self.id
    }
}

/// A point of interest placed on a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(deserialize_with = "string_id")]
    pub id: String,
    #[serde(default, deserialize_with = "optional_string_id")]
    pub location_id: Option<String>,
    #[serde(default)]
    pub name: String,
    /// Wire name of the feature kind; see [`Feature::feature_type`].
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub position_x: f64,
    #[serde(default)]
    pub position_y: f64,
    #[serde(default)]
    pub position_z: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Feature {
    /// Parsed feature kind; unrecognised names map to [`FeatureType::Unknown`].
    pub fn feature_type(&self) -> FeatureType {
        FeatureType::parse(&self.kind)
    }
}

impl Entity for Feature {
    fn id(&self) -> &str {
        &self.id
    }

    fn location_id(&self) -> Option<&str> {
        self.location_id.as_deref()
    }
}

/// A floor-plan image layered over a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    #[serde(deserialize_with = "string_id")]
    pub id: String,
    #[serde(default, deserialize_with = "optional_string_id")]
    pub location_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Map-space bounds as `[left, top, right, bottom]`.
    #[serde(default)]
    pub boundary: Option<[f64; 4]>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity for Layer {
    fn id(&self) -> &str {
        &self.id
    }

    fn location_id(&self) -> Option<&str> {
        self.location_id.as_deref()
    }
}

/// A photo uploaded from a headset camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    #[serde(deserialize_with = "string_id")]
    pub id: String,
    /// Location the photo was taken at.
    #[serde(default, deserialize_with = "optional_string_id")]
    pub camera_location_id: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub created: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity for Photo {
    fn id(&self) -> &str {
        &self.id
    }

    fn location_id(&self) -> Option<&str> {
        self.camera_location_id.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    #[serde(deserialize_with = "string_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub created: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity for Incident {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "string_id")]
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity for User {
    fn id(&self) -> &str {
        &self.id
    }
}

/// A live video stream published by a headset or fixed camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    #[serde(deserialize_with = "string_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity for Stream {
    fn id(&self) -> &str {
        &self.id
    }
}

/// An outbound websocket registration configured on the edge server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebsocketRecord {
    #[serde(deserialize_with = "string_id")]
    pub id: String,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub filter: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity for WebsocketRecord {
    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_ids_are_normalised_to_strings() {
        let headset: Headset =
            serde_json::from_value(json!({"id": 42, "name": "HL2", "location_id": 7})).unwrap();
        assert_eq!(headset.id(), "42");
        assert_eq!(headset.location_id(), Some("7"));
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let raw = json!({"id": "F1", "location_id": "L1", "type": "fire", "color": "red"});
        let feature: Feature = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(feature.extra.get("color"), Some(&json!("red")));
        assert_eq!(feature.feature_type(), FeatureType::Fire);

        let back = serde_json::to_value(&feature).unwrap();
        assert_eq!(back["color"], "red");
        assert_eq!(back["type"], "fire");
    }

    #[test]
    fn photo_is_scoped_by_camera_location() {
        let photo: Photo =
            serde_json::from_value(json!({"id": "P1", "camera_location_id": "L9"})).unwrap();
        assert_eq!(photo.location_id(), Some("L9"));
    }

    #[test]
    fn missing_id_is_rejected() {
        let err = serde_json::from_value::<Location>(json!({"name": "HQ"}));
        assert!(err.is_err());
        let err = serde_json::from_value::<Location>(json!({"id": true}));
        assert!(err.is_err());
    }

    #[test]
    fn unscoped_kinds_have_no_location() {
        let incident: Incident = serde_json::from_value(json!({"id": 3})).unwrap();
        assert_eq!(incident.location_id(), None);
    }
}
