//! Pairwise force aggregation.
//!
//! For one pair, every enabled plane contributes a weighted scalar; the sum is then blended with
//! an in-group or out-group repulsion term and projected along the pair's shortest vector into an
//! entity-local [`ForceAccumulator`].

use crate::config::EngineConfig;
use crate::geometry::{DirectionVector, Position};
use crate::plane::PlaneRegistry;
use crate::weights::WeightProvider;

/// Force summed for one entity during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ForceAccumulator {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Sum of absolute pair forces, regardless of direction.
    pub overall: f64,
}

impl ForceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `force` along `pair`; positive values pull toward the pair's far end. A zero-length
    /// pair pushes along its angles (`+x` for coincident points).
    pub fn add(&mut self, pair: &DirectionVector, force: f64) {
        let unit = pair.unit();
        self.x += unit.x * force;
        self.y += unit.y * force;
        self.z += unit.z * force;
        self.overall += force.abs();
    }

    pub fn vector(&self) -> Position {
        Position::new(self.x, self.y, self.z)
    }

    pub fn resultant(&self) -> DirectionVector {
        DirectionVector::from_components(self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ForceAggregator<'a> {
    config: &'a EngineConfig,
}

impl<'a> ForceAggregator<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Scalar force of `b` on `a` at `distance`, repulsion included.
    pub fn force_between<K>(
        &self,
        a: &K,
        b: &K,
        distance: f64,
        planes: &PlaneRegistry<K>,
        weights: &dyn WeightProvider<K>,
    ) -> f64 {
        let attraction = self.plane_sum(a, b, distance, planes, weights);
        self.blend_repulsion(attraction, distance)
    }

    /// Weighted sum over planes, before repulsion blending.
    pub fn plane_sum<K>(
        &self,
        a: &K,
        b: &K,
        distance: f64,
        planes: &PlaneRegistry<K>,
        weights: &dyn WeightProvider<K>,
    ) -> f64 {
        let cfg = self.config;
        let distances = &cfg.distances;
        let mut sum = 0.0;
        for plane in planes.enabled() {
            if plane.is_perceptionally_constrained()
                && !cfg.ignore_perception_limits
                && !distances.perceives(distance)
            {
                continue;
            }

            let mut temp = plane.force(a, b, distance, weights);
            if temp > 0.0 {
                if !distances.attracts(distance) || distances.in_tolerance_band(distance) {
                    continue;
                }
                if cfg.amplification.enabled && distance > distances.tolerance_zone() {
                    temp *= distance.powf(cfg.amplification.power);
                }
            }
            if let Some(individual) = weights.plane_weight(a, plane.name()) {
                temp *= individual;
            }
            sum += temp * plane.weight();
        }
        sum
    }

    /// Adds in-group repulsion to attractive sums and out-group repulsion to the rest.
    pub fn blend_repulsion(&self, force: f64, distance: f64) -> f64 {
        let net = distance - self.config.distances.minimal;
        if force > 0.0 {
            force + in_group_repulsion(net)
        } else {
            force + self.out_group_repulsion(net, distance)
        }
    }

    fn out_group_repulsion(&self, net: f64, distance: f64) -> f64 {
        if net < 0.0 {
            return -(3f64.powf(net.abs()));
        }
        if !self.config.distances.repels(distance) {
            return 0.0;
        }
        let c = self.config.out_group_repulsion;
        if c == 0.0 {
            return c;
        }
        -(c.powi(3)) / net.powf(1.2).max(1.0)
    }

    /// Accumulates the force of `b` on `a` into `acc` and returns the scalar that was applied.
    pub fn accumulate<K>(
        &self,
        acc: &mut ForceAccumulator,
        a: &K,
        b: &K,
        pair: &DirectionVector,
        planes: &PlaneRegistry<K>,
        weights: &dyn WeightProvider<K>,
    ) -> f64 {
        let force = self.force_between(a, b, pair.length, planes, weights);
        acc.add(pair, force);
        force
    }
}

fn in_group_repulsion(net: f64) -> f64 {
    if net < 0.0 {
        -(2f64.powf(net.abs()))
    } else {
        0.0
    }
}
