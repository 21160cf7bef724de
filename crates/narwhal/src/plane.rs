//! Named, independently weighted force sources.
//!
//! A [`Plane`] wraps a [`ForceSource`] with the knobs the aggregator reads every tick: a global
//! weight (resettable to the weight it was built with), an enabled flag and a perception flag.
//! The [`PlaneRegistry`] keeps planes in insertion order under unique names.

use crate::error::{Error, Result};
use crate::weights::WeightProvider;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::hash::Hash;

/// Signed force between two entities: positive attracts `a` toward `b`, negative repels.
pub trait ForceSource<K>: Send + Sync {
    fn force(&self, a: &K, b: &K, distance: f64, weights: &dyn WeightProvider<K>) -> f64;
}

impl<K, F> ForceSource<K> for F
where
    F: Fn(&K, &K, f64) -> f64 + Send + Sync,
{
    fn force(&self, a: &K, b: &K, distance: f64, _weights: &dyn WeightProvider<K>) -> f64 {
        self(a, b, distance)
    }
}

/// Attraction between entities sharing a tag, repulsion otherwise.
///
/// The attraction is scaled by `a`'s individual weight for the shared tag when the weight
/// provider has one. Untagged entities feel nothing.
#[derive(Debug, Clone)]
pub struct TagAffinity<K> {
    tags: FxHashMap<K, String>,
    same: f64,
    different: f64,
}

impl<K: Eq + Hash> TagAffinity<K> {
    pub fn new(same: f64, different: f64) -> Self {
        Self {
            tags: FxHashMap::default(),
            same,
            different,
        }
    }

    pub fn tag(&mut self, entity: K, tag: impl Into<String>) {
        self.tags.insert(entity, tag.into());
    }

    pub fn with_tag(mut self, entity: K, tag: impl Into<String>) -> Self {
        self.tag(entity, tag);
        self
    }

    pub fn tag_of(&self, entity: &K) -> Option<&str> {
        self.tags.get(entity).map(String::as_str)
    }
}

impl<K> ForceSource<K> for TagAffinity<K>
where
    K: Eq + Hash + Send + Sync,
{
    fn force(&self, a: &K, b: &K, _distance: f64, weights: &dyn WeightProvider<K>) -> f64 {
        let (Some(ta), Some(tb)) = (self.tags.get(a), self.tags.get(b)) else {
            return 0.0;
        };
        if ta == tb {
            self.same * weights.tag_weight(a, ta).unwrap_or(1.0)
        } else {
            self.different
        }
    }
}

pub struct Plane<K> {
    name: String,
    weight: f64,
    default_weight: f64,
    enabled: bool,
    perceptionally_constrained: bool,
    link_drawing_enabled: bool,
    source: Box<dyn ForceSource<K>>,
}

impl<K> Plane<K> {
    /// An enabled, perception-constrained plane with weight 1.
    pub fn new(name: impl Into<String>, source: impl ForceSource<K> + 'static) -> Self {
        Self {
            name: name.into(),
            weight: 1.0,
            default_weight: 1.0,
            enabled: true,
            perceptionally_constrained: true,
            link_drawing_enabled: false,
            source: Box::new(source),
        }
    }

    /// Sets both the current weight and the weight [`Plane::reset_weight`] returns to.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self.default_weight = weight;
        self
    }

    pub fn with_perception_constraint(mut self, constrained: bool) -> Self {
        self.perceptionally_constrained = constrained;
        self
    }

    pub fn with_link_drawing(mut self, enabled: bool) -> Self {
        self.link_drawing_enabled = enabled;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn default_weight(&self) -> f64 {
        self.default_weight
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_perceptionally_constrained(&self) -> bool {
        self.perceptionally_constrained
    }

    /// Rendering hint only; the engine never reads it.
    pub fn is_link_drawing_enabled(&self) -> bool {
        self.link_drawing_enabled
    }

    pub fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }

    pub fn reset_weight(&mut self) {
        self.weight = self.default_weight;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_perceptionally_constrained(&mut self, constrained: bool) {
        self.perceptionally_constrained = constrained;
    }

    pub fn set_link_drawing(&mut self, enabled: bool) {
        self.link_drawing_enabled = enabled;
    }

    /// Raw, unweighted force of this plane.
    pub fn force(&self, a: &K, b: &K, distance: f64, weights: &dyn WeightProvider<K>) -> f64 {
        self.source.force(a, b, distance, weights)
    }
}

impl<K> std::fmt::Debug for Plane<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plane")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .field("default_weight", &self.default_weight)
            .field("enabled", &self.enabled)
            .field("perceptionally_constrained", &self.perceptionally_constrained)
            .field("link_drawing_enabled", &self.link_drawing_enabled)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct PlaneRegistry<K> {
    planes: IndexMap<String, Plane<K>>,
}

impl<K> Default for PlaneRegistry<K> {
    fn default() -> Self {
        Self {
            planes: IndexMap::new(),
        }
    }
}

impl<K> PlaneRegistry<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plane: Plane<K>) -> Result<()> {
        if self.planes.contains_key(plane.name()) {
            return Err(Error::DuplicatePlane {
                name: plane.name.clone(),
            });
        }
        self.planes.insert(plane.name.clone(), plane);
        Ok(())
    }

    /// Removes a plane, keeping the order of the others.
    pub fn remove(&mut self, name: &str) -> Result<Plane<K>> {
        self.planes
            .shift_remove(name)
            .ok_or_else(|| unknown_plane(name))
    }

    pub fn get(&self, name: &str) -> Option<&Plane<K>> {
        self.planes.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Plane<K>> {
        self.planes.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.planes.contains_key(name)
    }

    /// All planes in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Plane<K>> {
        self.planes.values()
    }

    pub fn enabled(&self) -> impl Iterator<Item = &Plane<K>> {
        self.planes.values().filter(|p| p.enabled)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.planes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.planes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    /// Whether some enabled plane ignores the perception distance.
    pub fn has_enabled_unconstrained(&self) -> bool {
        self.enabled().any(|p| !p.perceptionally_constrained)
    }

    pub fn set_weight(&mut self, name: &str, weight: f64) -> Result<()> {
        self.require_mut(name)?.set_weight(weight);
        Ok(())
    }

    pub fn reset_weight(&mut self, name: &str) -> Result<()> {
        self.require_mut(name)?.reset_weight();
        Ok(())
    }

    pub fn reset_all_weights(&mut self) {
        for plane in self.planes.values_mut() {
            plane.reset_weight();
        }
    }

    pub fn enable(&mut self, name: &str) -> Result<()> {
        self.require_mut(name)?.set_enabled(true);
        Ok(())
    }

    pub fn disable(&mut self, name: &str) -> Result<()> {
        self.require_mut(name)?.set_enabled(false);
        Ok(())
    }

    pub fn set_perceptionally_constrained(&mut self, name: &str, constrained: bool) -> Result<()> {
        self.require_mut(name)?
            .set_perceptionally_constrained(constrained);
        Ok(())
    }

    pub fn set_link_drawing(&mut self, name: &str, enabled: bool) -> Result<()> {
        self.require_mut(name)?.set_link_drawing(enabled);
        Ok(())
    }

    fn require_mut(&mut self, name: &str) -> Result<&mut Plane<K>> {
        self.planes
            .get_mut(name)
            .ok_or_else(|| unknown_plane(name))
    }
}

fn unknown_plane(name: &str) -> Error {
    Error::UnknownPlane {
        name: name.to_string(),
    }
}
