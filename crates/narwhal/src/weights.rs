//! Per-entity weight overrides.
//!
//! A provider answers `None` when it has nothing to say about an entity; the aggregator then
//! falls back to the plane's global weight alone.

use rustc_hash::FxHashMap;
use std::hash::Hash;

pub trait WeightProvider<K>: Send + Sync {
    /// Individual weight of `plane` for `entity`.
    fn plane_weight(&self, _entity: &K, _plane: &str) -> Option<f64> {
        None
    }

    /// Individual weight of `tag` for `entity`.
    fn tag_weight(&self, _entity: &K, _tag: &str) -> Option<f64> {
        None
    }
}

/// Provider with no overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWeights;

impl<K> WeightProvider<K> for NoWeights {}

/// In-memory override table.
#[derive(Debug, Clone)]
pub struct WeightTable<K> {
    planes: FxHashMap<K, FxHashMap<String, f64>>,
    tags: FxHashMap<K, FxHashMap<String, f64>>,
}

impl<K> Default for WeightTable<K> {
    fn default() -> Self {
        Self {
            planes: FxHashMap::default(),
            tags: FxHashMap::default(),
        }
    }
}

impl<K: Eq + Hash> WeightTable<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_plane_weight(&mut self, entity: K, plane: impl Into<String>, weight: f64) {
        self.planes
            .entry(entity)
            .or_default()
            .insert(plane.into(), weight);
    }

    pub fn clear_plane_weight(&mut self, entity: &K, plane: &str) -> Option<f64> {
        remove_nested(&mut self.planes, entity, plane)
    }

    pub fn set_tag_weight(&mut self, entity: K, tag: impl Into<String>, weight: f64) {
        self.tags.entry(entity).or_default().insert(tag.into(), weight);
    }

    pub fn clear_tag_weight(&mut self, entity: &K, tag: &str) -> Option<f64> {
        remove_nested(&mut self.tags, entity, tag)
    }

    /// Drops every override held for `entity`.
    pub fn forget(&mut self, entity: &K) {
        self.planes.remove(entity);
        self.tags.remove(entity);
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty() && self.tags.is_empty()
    }
}

fn remove_nested<K: Eq + Hash>(
    map: &mut FxHashMap<K, FxHashMap<String, f64>>,
    entity: &K,
    name: &str,
) -> Option<f64> {
    let inner = map.get_mut(entity)?;
    let removed = inner.remove(name);
    if inner.is_empty() {
        map.remove(entity);
    }
    removed
}

impl<K> WeightProvider<K> for WeightTable<K>
where
    K: Eq + Hash + Send + Sync,
{
    fn plane_weight(&self, entity: &K, plane: &str) -> Option<f64> {
        self.planes.get(entity)?.get(plane).copied()
    }

    fn tag_weight(&self, entity: &K, tag: &str) -> Option<f64> {
        self.tags.get(entity)?.get(tag).copied()
    }
}
