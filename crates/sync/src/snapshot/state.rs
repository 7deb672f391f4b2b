use std::collections::BTreeMap;

use rkyv::{Archive, Deserialize, Serialize};

use super::value::{Entity, blend_entity};

pub type EntityId = String;

/// Whole-simulation state: entity id to entity record.
#[derive(Debug, Clone, Default, PartialEq, Archive, Serialize, Deserialize)]
pub struct SimulationState {
    entities: BTreeMap<EntityId, Entity>,
}

impl SimulationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: impl Into<EntityId>, entity: Entity) -> Self {
        self.insert(id, entity);
        self
    }

    pub fn insert(&mut self, id: impl Into<EntityId>, entity: Entity) -> Option<Entity> {
        self.entities.insert(id.into(), entity)
    }

    pub fn remove(&mut self, id: &str) -> Option<Entity> {
        self.entities.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entity)> {
        self.entities.iter().map(|(id, entity)| (id.as_str(), entity))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Entity)> {
        self.entities
            .iter_mut()
            .map(|(id, entity)| (id.as_str(), entity))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl FromIterator<(EntityId, Entity)> for SimulationState {
    fn from_iter<T: IntoIterator<Item = (EntityId, Entity)>>(iter: T) -> Self {
        Self {
            entities: iter.into_iter().collect(),
        }
    }
}

/// Blends every entity appearing in either state. Entities that exist on only
/// one side (just spawned, about to vanish) keep their single known record.
pub fn blend_state(from: &SimulationState, to: &SimulationState, frac: f64) -> SimulationState {
    let mut blended = BTreeMap::new();

    for id in from.entities.keys().chain(to.entities.keys()) {
        if blended.contains_key(id) {
            continue;
        }
        if let Some(entity) = blend_entity(from.get(id), to.get(id), frac) {
            blended.insert(id.clone(), entity);
        }
    }

    SimulationState { entities: blended }
}
