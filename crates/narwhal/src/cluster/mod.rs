//! Clustering collaborators and the bridge the engine drives after every tick.
//!
//! The engine hands `(entity, position)` pairs to a [`Clusterer`], optionally lets an
//! [`AttractionClusterer`] regroup the result, and reconciles the groups against a persistent
//! color cache so a cluster that survives a tick keeps its color.

mod palette;
mod proximity;

pub use palette::{Color, ColorRegistry, Palette};
pub use proximity::ProximityClusterer;

use crate::config::ClusterConfig;
use crate::geometry::{Geometry, Position};
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use std::hash::Hash;

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterParams {
    pub neighbor_distance: f64,
    pub min_cluster_size: usize,
    /// Grid geometry, so clusterers can measure across toroidal edges.
    pub geometry: Geometry,
}

pub trait Clusterer<K>: Send {
    /// Groups `points`; unclustered entities are simply absent from the result.
    fn cluster(&mut self, points: &[(K, Position)], params: &ClusterParams) -> Vec<Vec<K>>;
}

/// Second-level regrouping applied to the output of a [`Clusterer`].
pub trait AttractionClusterer<K>: Send {
    fn refine(&mut self, points: &[(K, Position)], groups: Vec<Vec<K>>) -> Vec<Vec<K>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cluster<K> {
    pub members: Vec<K>,
    pub color: Color,
    /// Member whose cache entry carries the color.
    pub anchor: K,
}

pub struct ClusterBridge<K> {
    enabled: bool,
    params: ClusterParams,
    clusterer: Option<Box<dyn Clusterer<K>>>,
    attraction: Option<Box<dyn AttractionClusterer<K>>>,
    registry: ColorRegistry<K>,
    clusters: Vec<Cluster<K>>,
}

impl<K: Clone + Eq + Hash> ClusterBridge<K> {
    pub fn new(config: &ClusterConfig, geometry: Geometry) -> Self {
        Self {
            enabled: config.enabled,
            params: ClusterParams {
                neighbor_distance: config.neighbor_distance,
                min_cluster_size: config.min_cluster_size,
                geometry,
            },
            clusterer: None,
            attraction: None,
            registry: ColorRegistry::new(config.color_seed, config.purge_unused_colors),
            clusters: Vec::new(),
        }
    }

    pub fn params(&self) -> &ClusterParams {
        &self.params
    }

    pub fn set_clusterer(&mut self, clusterer: impl Clusterer<K> + 'static) {
        self.clusterer = Some(Box::new(clusterer));
    }

    pub fn clear_clusterer(&mut self) -> bool {
        self.clusterer.take().is_some()
    }

    pub fn set_attraction_clusterer(&mut self, refiner: impl AttractionClusterer<K> + 'static) {
        self.attraction = Some(Box::new(refiner));
    }

    pub fn clear_attraction_clusterer(&mut self) -> bool {
        self.attraction.take().is_some()
    }

    /// Clusters `points` and stores the reconciled result. Returns `None` when skipped.
    pub fn run(&mut self, points: &[(K, Position)]) -> Option<&[Cluster<K>]> {
        if !self.enabled {
            tracing::debug!("clustering disabled; skipped");
            return None;
        }
        let Some(clusterer) = self.clusterer.as_mut() else {
            tracing::debug!("no clusterer configured; skipped");
            return None;
        };
        let mut groups = clusterer.cluster(points, &self.params);
        if let Some(refiner) = self.attraction.as_mut() {
            groups = refiner.refine(points, groups);
        }
        self.clusters = self.registry.reconcile(groups);
        Some(&self.clusters)
    }

    pub fn clusters(&self) -> &[Cluster<K>] {
        &self.clusters
    }

    /// Current `anchor -> color` cache.
    pub fn colors(&self) -> &IndexMap<K, Color, FxBuildHasher> {
        self.registry.colors()
    }

    /// Drops an entity from the color cache and from the last clusters.
    pub fn forget(&mut self, entity: &K) {
        self.registry.forget(entity);
        for cluster in &mut self.clusters {
            cluster.members.retain(|m| m != entity);
        }
        self.clusters
            .retain(|c| !c.members.is_empty() && c.anchor != *entity);
    }
}

impl<K> std::fmt::Debug for ClusterBridge<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterBridge")
            .field("enabled", &self.enabled)
            .field("params", &self.params)
            .field("has_clusterer", &self.clusterer.is_some())
            .field("has_attraction_clusterer", &self.attraction.is_some())
            .field("clusters", &self.clusters.len())
            .finish_non_exhaustive()
    }
}
