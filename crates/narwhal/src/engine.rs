//! The tick loop.
//!
//! One tick visits entities in registration order. Each entity sums the forces of its
//! candidates into a fresh [`ForceAccumulator`], moves by the (optionally clamped) resultant,
//! is wrapped back into the grid and re-indexed before the next entity is visited, so later
//! entities already see earlier moves. Clustering runs once all entities have moved.

use crate::cluster::{AttractionClusterer, Cluster, ClusterBridge, Clusterer, Color};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::force::{ForceAccumulator, ForceAggregator};
use crate::geometry::{Geometry, Position};
use crate::plane::{Plane, PlaneRegistry};
use crate::rng::XorShift64Star;
use crate::sector::{SectorCoord, SectorIndex};
use crate::weights::{NoWeights, WeightProvider};
use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashMap};
use std::fmt::Debug;
use std::hash::Hash;

/// Summary of one completed tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    /// 1-based tick number.
    pub tick: u64,
    pub entities: usize,
    /// Entities whose displacement was non-zero.
    pub moved: usize,
    pub max_displacement: f64,
    /// `None` when clustering was skipped.
    pub clusters: Option<usize>,
}

/// Owned copy of the engine state, for readers that must not hold the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<K> {
    pub tick: u64,
    pub positions: Vec<(K, Position)>,
    pub clusters: Vec<Cluster<K>>,
}

struct Integrated<K> {
    forces: FxHashMap<K, ForceAccumulator>,
    candidates: FxHashMap<K, usize>,
    moved: usize,
    max_displacement: f64,
}

pub struct Engine<K> {
    config: EngineConfig,
    geometry: Geometry,
    planes: PlaneRegistry<K>,
    positions: IndexMap<K, Position, FxBuildHasher>,
    sectors: Option<SectorIndex<K>>,
    weights: Option<Box<dyn WeightProvider<K>>>,
    last_forces: FxHashMap<K, ForceAccumulator>,
    candidate_counts: FxHashMap<K, usize>,
    bridge: ClusterBridge<K>,
    tick: u64,
}

impl<K> Engine<K>
where
    K: Clone + Eq + Hash + Debug + Send + Sync,
{
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let geometry = Geometry::from_grid(&config.grid);
        let sectors = match config.distances.maximal_perception {
            Some(perception) if config.sectors_active() => {
                Some(SectorIndex::new(&config.grid, perception)?)
            }
            _ => None,
        };
        let bridge = ClusterBridge::new(&config.clustering, geometry.clone());

        tracing::info!(
            axes = geometry.axes(),
            toroidal = geometry.is_toroidal(),
            sectors = sectors.is_some(),
            "force engine created"
        );

        Ok(Self {
            config,
            geometry,
            planes: PlaneRegistry::new(),
            positions: IndexMap::default(),
            sectors,
            weights: None,
            last_forces: FxHashMap::default(),
            candidate_counts: FxHashMap::default(),
            bridge,
            tick: 0,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Number of completed ticks.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn planes(&self) -> &PlaneRegistry<K> {
        &self.planes
    }

    pub fn planes_mut(&mut self) -> &mut PlaneRegistry<K> {
        &mut self.planes
    }

    pub fn register_plane(&mut self, plane: Plane<K>) -> Result<()> {
        self.planes.register(plane)
    }

    pub fn set_weight_provider(&mut self, provider: impl WeightProvider<K> + 'static) {
        self.weights = Some(Box::new(provider));
    }

    pub fn clear_weight_provider(&mut self) {
        self.weights = None;
    }

    pub fn set_clusterer(&mut self, clusterer: impl Clusterer<K> + 'static) {
        self.bridge.set_clusterer(clusterer);
    }

    pub fn set_attraction_clusterer(&mut self, refiner: impl AttractionClusterer<K> + 'static) {
        self.bridge.set_attraction_clusterer(refiner);
    }

    /// Adds an entity, or moves it if already present. The position is wrapped into the grid.
    pub fn add_entity(&mut self, entity: K, position: Position) -> Result<()> {
        check_finite(&entity, &position)?;
        let position = self.geometry.transpose_target(&position);
        if let Some(index) = self.sectors.as_mut() {
            index.register(&entity, &position);
        }
        self.positions.insert(entity, position);
        Ok(())
    }

    /// Moves a tracked entity.
    pub fn set_position(&mut self, entity: &K, position: Position) -> Result<()> {
        if !self.positions.contains_key(entity) {
            return Err(unknown_entity(entity));
        }
        self.add_entity(entity.clone(), position)
    }

    /// Places each entity at a seeded random point of the grid.
    pub fn scatter(&mut self, entities: impl IntoIterator<Item = K>, seed: u64) -> Result<()> {
        let mut rng = XorShift64Star::new(seed);
        for entity in entities {
            let position = self.geometry.random_point(&mut rng);
            self.add_entity(entity, position)?;
        }
        Ok(())
    }

    pub fn remove_entity(&mut self, entity: &K) -> Option<Position> {
        let position = self.positions.shift_remove(entity)?;
        if let Some(index) = self.sectors.as_mut() {
            index.unregister(entity);
        }
        self.last_forces.remove(entity);
        self.candidate_counts.remove(entity);
        self.bridge.forget(entity);
        Some(position)
    }

    pub fn contains(&self, entity: &K) -> bool {
        self.positions.contains_key(entity)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn position(&self, entity: &K) -> Option<Position> {
        self.positions.get(entity).copied()
    }

    /// Positions in registration order.
    pub fn positions(&self) -> impl Iterator<Item = (&K, &Position)> {
        self.positions.iter()
    }

    /// Force accumulated for `entity` during the last completed tick.
    pub fn last_force(&self, entity: &K) -> Option<&ForceAccumulator> {
        self.last_forces.get(entity)
    }

    /// Number of other entities `entity` evaluated during the last completed tick.
    pub fn candidate_count(&self, entity: &K) -> Option<usize> {
        self.candidate_counts.get(entity).copied()
    }

    pub fn sector_index(&self) -> Option<&SectorIndex<K>> {
        self.sectors.as_ref()
    }

    /// Occupied sectors and their members; empty when the sector index is inactive.
    pub fn sector_membership(
        &self,
    ) -> impl Iterator<Item = (&SectorCoord, indexmap::set::Iter<'_, K>)> {
        self.sectors.iter().flat_map(|index| index.membership())
    }

    pub fn clusters(&self) -> &[Cluster<K>] {
        self.bridge.clusters()
    }

    /// Persistent `anchor -> color` cache.
    pub fn cluster_colors(&self) -> &IndexMap<K, Color, FxBuildHasher> {
        self.bridge.colors()
    }

    pub fn snapshot(&self) -> Snapshot<K> {
        Snapshot {
            tick: self.tick,
            positions: self
                .positions
                .iter()
                .map(|(k, p)| (k.clone(), *p))
                .collect(),
            clusters: self.bridge.clusters().to_vec(),
        }
    }

    /// Runs up to `ticks` ticks, stopping at the first failure.
    pub fn run(&mut self, ticks: usize) -> Result<Vec<TickReport>> {
        let mut reports = Vec::with_capacity(ticks);
        for _ in 0..ticks {
            reports.push(self.step()?);
        }
        Ok(reports)
    }

    /// Advances the simulation by one tick.
    ///
    /// On error every position and the sector index are restored to their pre-tick state, and
    /// the per-entity diagnostics of the previous tick are kept.
    pub fn step(&mut self) -> Result<TickReport> {
        let span = tracing::debug_span!("tick", tick = self.tick + 1);
        let _enter = span.enter();

        let saved = self.positions.clone();
        let integrated = match self.integrate() {
            Ok(integrated) => integrated,
            Err(err) => {
                tracing::warn!(error = %err, "tick rolled back");
                self.positions = saved;
                if let Some(index) = self.sectors.as_mut() {
                    index.rebuild(self.positions.iter());
                }
                return Err(err);
            }
        };

        self.last_forces = integrated.forces;
        self.candidate_counts = integrated.candidates;
        self.tick += 1;

        let points: Vec<(K, Position)> = self
            .positions
            .iter()
            .map(|(k, p)| (k.clone(), *p))
            .collect();
        let clusters = self.bridge.run(&points).map(<[Cluster<K>]>::len);

        let report = TickReport {
            tick: self.tick,
            entities: self.positions.len(),
            moved: integrated.moved,
            max_displacement: integrated.max_displacement,
            clusters,
        };
        tracing::debug!(
            entities = report.entities,
            moved = report.moved,
            max_displacement = report.max_displacement,
            clusters = ?report.clusters,
            "tick complete"
        );
        Ok(report)
    }

    fn integrate(&mut self) -> Result<Integrated<K>> {
        let Self {
            config,
            geometry,
            planes,
            positions,
            sectors,
            weights,
            ..
        } = self;
        let config: &EngineConfig = config;
        let geometry: &Geometry = geometry;
        let planes: &PlaneRegistry<K> = planes;
        let weights: &dyn WeightProvider<K> = match weights.as_deref() {
            Some(provider) => provider,
            None => &NoWeights,
        };

        let aggregator = ForceAggregator::new(config);
        // Unconstrained planes look past the sector neighborhood; that union is everyone.
        let scan_all = sectors.is_none()
            || config.ignore_perception_limits
            || (config.perception_independence && planes.has_enabled_unconstrained());

        let mut out = Integrated {
            forces: FxHashMap::default(),
            candidates: FxHashMap::default(),
            moved: 0,
            max_displacement: 0.0,
        };

        for idx in 0..positions.len() {
            let Some((entity, origin)) = positions.get_index(idx).map(|(k, p)| (k.clone(), *p))
            else {
                continue;
            };

            let mut acc = ForceAccumulator::new();
            let mut seen = 0usize;
            {
                let mut visit = |other: &K, other_pos: &Position| {
                    if *other == entity {
                        return;
                    }
                    let pair = geometry.distance(&origin, other_pos);
                    aggregator.accumulate(&mut acc, &entity, other, &pair, planes, weights);
                    seen += 1;
                };
                match sectors.as_ref() {
                    Some(index) if !scan_all => index.for_each_candidate(&origin, |other| {
                        if let Some(p) = positions.get(other) {
                            visit(other, p);
                        }
                    }),
                    _ => {
                        for (other, other_pos) in positions.iter() {
                            visit(other, other_pos);
                        }
                    }
                }
            }

            let mut displacement = acc.resultant();
            if let Some(max) = config.max_movement_per_step {
                displacement = displacement.clamp_length(max);
            }
            let target = geometry.transpose_target(&(origin + displacement.to_vector()));
            check_finite(&entity, &target)?;

            tracing::trace!(
                entity = ?entity,
                candidates = seen,
                fx = acc.x,
                fy = acc.y,
                fz = acc.z,
                overall = acc.overall,
                displacement = displacement.length,
                "entity force"
            );

            if displacement.length != 0.0 {
                out.moved += 1;
            }
            out.max_displacement = out.max_displacement.max(displacement.length.abs());

            if let Some((_, slot)) = positions.get_index_mut(idx) {
                *slot = target;
            }
            if let Some(index) = sectors.as_mut() {
                index.register(&entity, &target);
            }
            out.forces.insert(entity.clone(), acc);
            out.candidates.insert(entity, seen);
        }
        Ok(out)
    }
}

impl<K: Debug> Debug for Engine<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("tick", &self.tick)
            .field("entities", &self.positions.len())
            .field("planes", &self.planes)
            .field("sectors", &self.sectors.is_some())
            .field("bridge", &self.bridge)
            .finish_non_exhaustive()
    }
}

fn check_finite<K: Debug>(entity: &K, p: &Position) -> Result<()> {
    if p.iter().all(|v| v.is_finite()) {
        return Ok(());
    }
    Err(Error::NonFinitePosition {
        entity: format!("{entity:?}"),
        x: p.x,
        y: p.y,
        z: p.z,
    })
}

fn unknown_entity<K: Debug>(entity: &K) -> Error {
    Error::UnknownEntity {
        entity: format!("{entity:?}"),
    }
}
