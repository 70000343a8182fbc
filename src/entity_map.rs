use std::collections::HashMap;

use serde_json::Value;

use crate::coordinate::Coordinate;
use crate::value::Properties;

/// The outcome of deploying one config: its coordinate, display name, the
/// properties later configs may reference, and whether it was skipped.
#[derive(Debug, Clone)]
pub struct ResolvedEntity {
    pub coordinate: Coordinate,
    pub entity_name: Option<String>,
    pub properties: Properties,
    pub skip: bool,
}

impl ResolvedEntity {
    pub fn id(&self) -> Option<&str> {
        self.properties.id()
    }
}

/// Process-scoped mapping from [`Coordinate`] to [`ResolvedEntity`], built up
/// one environment deployment at a time.
///
/// Invariant: once a coordinate is inserted it is never mutated or
/// overwritten — a second `put` for the same coordinate is a caller bug, not
/// a condition the map should paper over.
#[derive(Debug, Default)]
pub struct EntityMap {
    entities: HashMap<Coordinate, ResolvedEntity>,
    known_names: HashMap<String, HashMap<String, Coordinate>>,
}

impl EntityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the resolved entity for `coordinate`.
    ///
    /// # Panics
    /// Panics if `coordinate` has already been recorded — the scheduler must
    /// guarantee each vertex resolves at most once per environment.
    pub fn put(&mut self, entity: ResolvedEntity) {
        let coordinate = entity.coordinate.clone();
        if !entity.skip {
            if let Some(name) = &entity.entity_name {
                self.known_names
                    .entry(coordinate.config_type.clone())
                    .or_default()
                    .insert(name.clone(), coordinate.clone());
            }
        }
        let previous = self.entities.insert(coordinate.clone(), entity);
        assert!(
            previous.is_none(),
            "coordinate {coordinate} was already present in the entity map"
        );
    }

    pub fn get(&self, coordinate: &Coordinate) -> Option<&ResolvedEntity> {
        self.entities.get(coordinate)
    }

    pub fn get_property(&self, coordinate: &Coordinate, property: &str) -> Option<Value> {
        let entity = self.entities.get(coordinate)?;
        if property == "id" && entity.skip {
            return None;
        }
        entity.properties.get_path(property).cloned()
    }

    /// Whether `name` has already been claimed by a resolved, non-skipped
    /// config of the same type — used for classic-API duplicate-name checks.
    pub fn known_name(&self, config_type: &str, name: &str) -> bool {
        self.name_owner(config_type, name).is_some()
    }

    /// The coordinate that already claimed `name` for `config_type`, if any.
    pub fn name_owner(&self, config_type: &str, name: &str) -> Option<&Coordinate> {
        self.known_names.get(config_type)?.get(name)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(id: &str) -> Coordinate {
        Coordinate::new("p", "alerting-profile", id).unwrap()
    }

    fn entity(coordinate: Coordinate, name: &str, id: &str) -> ResolvedEntity {
        let mut properties = Properties::new();
        properties.insert("id", id);
        ResolvedEntity {
            coordinate,
            entity_name: Some(name.to_string()),
            properties,
            skip: false,
        }
    }

    #[test]
    fn get_property_returns_inserted_value() {
        let mut map = EntityMap::new();
        map.put(entity(coord("a"), "prod-alerts", "srv-1"));
        assert_eq!(
            map.get_property(&coord("a"), "id"),
            Some(Value::String("srv-1".to_string()))
        );
    }

    #[test]
    fn skipped_config_id_is_undefined() {
        let mut map = EntityMap::new();
        let mut properties = Properties::new();
        properties.insert("id", "would-be-id");
        map.put(ResolvedEntity {
            coordinate: coord("a"),
            entity_name: None,
            properties,
            skip: true,
        });
        assert_eq!(map.get_property(&coord("a"), "id"), None);
    }

    #[test]
    #[should_panic(expected = "already present")]
    fn double_put_panics() {
        let mut map = EntityMap::new();
        map.put(entity(coord("a"), "x", "1"));
        map.put(entity(coord("a"), "x", "1"));
    }

    #[test]
    fn known_name_tracks_non_skipped_entities_by_type() {
        let mut map = EntityMap::new();
        map.put(entity(coord("a"), "prod-alerts", "1"));
        assert!(map.known_name("alerting-profile", "prod-alerts"));
        assert!(!map.known_name("alerting-profile", "other"));
        assert!(!map.known_name("other-type", "prod-alerts"));
    }
}
