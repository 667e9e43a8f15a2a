use std::collections::HashMap;
use std::collections::hash_map::Values;

use crate::model::Entity;

/// `id -> entity` cache owned by exactly one reconciler.
#[derive(Debug, Clone)]
pub struct EntityMap<E> {
    entries: HashMap<String, E>,
}

impl<E> Default for EntityMap<E> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<E: Entity> EntityMap<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or wholesale replaces the entity under its id.
    pub fn upsert(&mut self, entity: E) {
        self.entries.insert(entity.id().to_string(), entity);
    }

    pub fn remove(&mut self, id: &str) -> Option<E> {
        self.entries.remove(id)
    }

    pub fn replace_all(&mut self, entities: impl IntoIterator<Item = E>) {
        self.entries.clear();
        for entity in entities {
            self.upsert(entity);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, id: &str) -> Option<&E> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> Values<'_, String, E> {
        self.entries.values()
    }

    /// Ids in ascending order.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Owned copy of every entity, ordered by id, for renderers.
    pub fn snapshot(&self) -> Vec<E> {
        let mut entities: Vec<E> = self.entries.values().cloned().collect();
        entities.sort_by(|a, b| a.id().cmp(b.id()));
        entities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Location;
    use serde_json::json;

    fn location(id: &str, name: &str) -> Location {
        serde_json::from_value(json!({"id": id, "name": name})).unwrap()
    }

    #[test]
    fn upsert_is_idempotent_and_replaces_wholesale() {
        let mut map = EntityMap::new();
        map.upsert(location("1", "north"));
        map.upsert(location("1", "north"));
        assert_eq!(map.len(), 1);

        map.upsert(location("1", "south"));
        assert_eq!(map.get("1").map(|l| l.name.as_str()), Some("south"));
    }

    #[test]
    fn replace_all_discards_previous_content() {
        let mut map = EntityMap::new();
        map.upsert(location("1", "a"));
        map.replace_all(vec![location("2", "b"), location("3", "c")]);
        assert_eq!(map.ids(), vec!["2", "3"]);
        assert!(!map.contains("1"));
        assert_eq!(map.remove("2").map(|l| l.name), Some("b".to_string()));
        assert_eq!(map.snapshot().len(), 1);
    }
}
