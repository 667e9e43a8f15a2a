use std::collections::BTreeMap;
use std::sync::Arc;

use lib_edge::model::{Feature, FeatureType, Headset};
use tokio::sync::broadcast;

use crate::watch_logic::session::Session;

/// One line per headset plus feature counts by type, the way an operator
/// scans a location at a glance.
pub fn summary(location: &str, headsets: &[Headset], features: &[Feature]) -> String {
    let mut out = format!(
        "location {location}: {} headset(s), {} feature(s)",
        headsets.len(),
        features.len()
    );
    for headset in headsets {
        out.push_str(&format!(
            "\n  [headset] {} ({:.2}, {:.2}, {:.2})",
            display_name(&headset.name, &headset.id),
            headset.position_x,
            headset.position_y,
            headset.position_z
        ));
    }

    let mut by_type: BTreeMap<&'static str, (FeatureType, usize)> = BTreeMap::new();
    for feature in features {
        let kind = feature.feature_type();
        by_type.entry(kind.as_str()).or_insert((kind, 0)).1 += 1;
    }
    for (name, (kind, count)) in by_type {
        out.push_str(&format!("\n  [{}] {name} x{count}", kind.icon()));
    }
    out
}

fn display_name<'a>(name: &'a str, id: &'a str) -> &'a str {
    if name.is_empty() { id } else { name }
}

/// Logs a fresh summary whenever either map changes, until shutdown.
pub async fn run(session: Arc<Session>, mut shutdown: broadcast::Receiver<()>) {
    let (mut headsets, mut features) = session.changes();
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            changed = headsets.changed() => if changed.is_err() { break },
            changed = features.changed() => if changed.is_err() { break },
        }
        let Some(location) = session.location() else {
            continue;
        };
        let text = summary(&location, &session.headsets.snapshot(), &session.features.snapshot());
        tracing::info!("\n{text}");
        if let Some(error) = session.features.last_error().or_else(|| session.headsets.last_error()) {
            tracing::warn!(%error, "last snapshot fetch failed");
        }
    }
    tracing::debug!("view stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn summary_lists_headsets_and_counts_feature_types() {
        let headsets: Vec<Headset> = vec![
            serde_json::from_value(json!({"id": "h1", "name": "alpha", "position_x": 1.0})).unwrap(),
            serde_json::from_value(json!({"id": "h2"})).unwrap(),
        ];
        let features: Vec<Feature> = vec![
            serde_json::from_value(json!({"id": 1, "type": "door"})).unwrap(),
            serde_json::from_value(json!({"id": 2, "type": "Door"})).unwrap(),
            serde_json::from_value(json!({"id": 3, "type": "teleporter"})).unwrap(),
        ];

        let text = summary("L1", &headsets, &features);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "location L1: 2 headset(s), 3 feature(s)");
        assert_eq!(lines[1], "  [headset] alpha (1.00, 0.00, 0.00)");
        assert_eq!(lines[2], "  [headset] h2 (0.00, 0.00, 0.00)");
        assert!(lines.contains(&format!("  [{}] door x2", FeatureType::Door.icon()).as_str()));
        assert!(lines.contains(&"  [question] unknown x1"));
    }
}
