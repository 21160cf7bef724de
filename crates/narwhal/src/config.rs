//! Engine configuration.
//!
//! Every section derives `serde` with field defaults so partial JSON documents are accepted.
//! Distances that may be "unlimited" are `Option<f64>`: `None` (or JSON `null`) disables the
//! corresponding cutoff.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Dimensions {
    #[default]
    #[serde(rename = "2d")]
    Two,
    #[serde(rename = "3d")]
    Three,
}

impl Dimensions {
    pub fn count(self) -> usize {
        match self {
            Self::Two => 2,
            Self::Three => 3,
        }
    }
}

pub(crate) const AXIS_NAMES: [char; 3] = ['x', 'y', 'z'];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub width: f64,
    pub height: f64,
    /// Ignored in 2D.
    pub depth: f64,
    pub dimensions: Dimensions,
    pub toroidal: bool,
    /// Sector edge length per axis (`x`, `y`, `z`).
    pub sector_size: [f64; 3],
    /// Use the sector index for neighbor queries. Without it every tick scans all pairs.
    pub use_sectors: bool,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: 100.0,
            height: 100.0,
            depth: 100.0,
            dimensions: Dimensions::Two,
            toroidal: false,
            sector_size: [10.0; 3],
            use_sectors: true,
        }
    }
}

impl GridConfig {
    pub fn extents(&self) -> [f64; 3] {
        [self.width, self.height, self.depth]
    }

    pub fn axes(&self) -> usize {
        self.dimensions.count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistanceConfig {
    /// Radius of the private zone. Pairs closer than this repel.
    pub minimal: f64,
    /// Buffer beyond `minimal` where attraction is suppressed; amplification starts past it.
    pub tolerance: f64,
    /// Perception radius for constrained planes and for sector queries.
    pub maximal_perception: Option<f64>,
    /// Positive plane forces beyond this distance are dropped.
    pub maximal_attraction: Option<f64>,
    /// Out-group repulsion beyond this distance is dropped.
    pub maximal_repulsion: Option<f64>,
}

impl Default for DistanceConfig {
    fn default() -> Self {
        Self {
            minimal: 2.0,
            tolerance: 0.0,
            maximal_perception: Some(20.0),
            maximal_attraction: None,
            maximal_repulsion: None,
        }
    }
}

impl DistanceConfig {
    /// End of the tolerance zone measured from the pair origin.
    pub fn tolerance_zone(&self) -> f64 {
        self.minimal + self.tolerance
    }

    /// Whether `distance` lies in the buffer `(minimal, minimal + tolerance]` where attraction
    /// is suppressed. Empty when `tolerance` is zero.
    pub fn in_tolerance_band(&self, distance: f64) -> bool {
        distance > self.minimal && distance <= self.tolerance_zone()
    }

    pub fn perceives(&self, distance: f64) -> bool {
        within(self.maximal_perception, distance)
    }

    pub fn attracts(&self, distance: f64) -> bool {
        within(self.maximal_attraction, distance)
    }

    pub fn repels(&self, distance: f64) -> bool {
        within(self.maximal_repulsion, distance)
    }
}

fn within(limit: Option<f64>, distance: f64) -> bool {
    limit.is_none_or(|max| distance <= max)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmplificationConfig {
    /// Scale positive forces of pairs beyond the tolerance zone by `distance^power`.
    pub enabled: bool,
    pub power: f64,
}

impl Default for AmplificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            power: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub enabled: bool,
    /// Two entities closer than this are density-reachable.
    pub neighbor_distance: f64,
    pub min_cluster_size: usize,
    /// Drop cached colors whose anchor no longer anchors a current cluster.
    pub purge_unused_colors: bool,
    pub color_seed: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            neighbor_distance: 5.0,
            min_cluster_size: 2,
            purge_unused_colors: true,
            color_seed: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub grid: GridConfig,
    pub distances: DistanceConfig,
    /// Out-group repulsion constant; `0` disables out-group repulsion outside the private zone.
    pub out_group_repulsion: f64,
    /// Per-tick displacement cap; `None` means unlimited.
    pub max_movement_per_step: Option<f64>,
    pub amplification: AmplificationConfig,
    /// Let unconstrained planes see every entity, not only sector candidates.
    pub perception_independence: bool,
    /// Global override: constrained planes ignore `maximal_perception`.
    pub ignore_perception_limits: bool,
    pub clustering: ClusterConfig,
}

impl EngineConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_value(value: Value) -> Result<Self> {
        let cfg: Self = serde_json::from_value(value)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn to_json_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Deep-merges a JSON overlay into this configuration and re-validates the result.
    pub fn merge_json(&mut self, overlay: &Value) -> Result<()> {
        let mut base = self.to_json_value()?;
        deep_merge_value(&mut base, overlay);
        let merged: Self = serde_json::from_value(base)?;
        merged.validate()?;
        *self = merged;
        Ok(())
    }

    /// Whether the sector index answers neighbor queries.
    pub fn sectors_active(&self) -> bool {
        self.grid.use_sectors
            && self
                .distances
                .maximal_perception
                .is_some_and(|d| d.is_finite())
    }

    pub fn validate(&self) -> Result<()> {
        let grid = &self.grid;
        let axes = grid.axes();
        let extents = grid.extents();

        for axis in 0..axes {
            let value = extents[axis];
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::InvalidExtent {
                    axis: AXIS_NAMES[axis],
                    value,
                });
            }
            let value = grid.sector_size[axis];
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::InvalidSectorSize {
                    axis: AXIS_NAMES[axis],
                    value,
                });
            }
        }

        if self.sectors_active() {
            for axis in 1..axes {
                if extents[axis] != extents[0] {
                    return Err(Error::AsymmetricGrid {
                        message: format!(
                            "extent {} on axis {} differs from extent {} on axis x",
                            extents[axis], AXIS_NAMES[axis], extents[0]
                        ),
                    });
                }
                if grid.sector_size[axis] != grid.sector_size[0] {
                    return Err(Error::AsymmetricGrid {
                        message: format!(
                            "sector size {} on axis {} differs from sector size {} on axis x",
                            grid.sector_size[axis], AXIS_NAMES[axis], grid.sector_size[0]
                        ),
                    });
                }
            }
            if grid.toroidal {
                for axis in 0..axes {
                    let ratio = extents[axis] / grid.sector_size[axis];
                    if (ratio - ratio.round()).abs() > 1e-9 * ratio.max(1.0) {
                        return Err(Error::UnalignedSectorSize {
                            axis: AXIS_NAMES[axis],
                            extent: extents[axis],
                            sector_size: grid.sector_size[axis],
                        });
                    }
                }
            }
        }

        let d = &self.distances;
        check_distance("minimal", d.minimal)?;
        check_distance("tolerance", d.tolerance)?;
        for (name, limit) in [
            ("maximal_perception", d.maximal_perception),
            ("maximal_attraction", d.maximal_attraction),
            ("maximal_repulsion", d.maximal_repulsion),
        ] {
            if let Some(value) = limit {
                if value.is_nan() || value < 0.0 {
                    return Err(Error::InvalidDistance { name, value });
                }
            }
        }
        if let Some(value) = self.max_movement_per_step {
            if value.is_nan() || value < 0.0 {
                return Err(Error::InvalidDistance {
                    name: "max_movement_per_step",
                    value,
                });
            }
        }
        if !self.out_group_repulsion.is_finite() {
            return Err(Error::InvalidConfig {
                message: format!(
                    "out_group_repulsion must be finite, got {}",
                    self.out_group_repulsion
                ),
            });
        }
        if !self.amplification.power.is_finite() {
            return Err(Error::InvalidConfig {
                message: format!(
                    "amplification power must be finite, got {}",
                    self.amplification.power
                ),
            });
        }
        if self.clustering.enabled {
            check_distance("neighbor_distance", self.clustering.neighbor_distance)?;
        }
        Ok(())
    }
}

fn check_distance(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidDistance { name, value })
    }
}

fn deep_merge_value(base: &mut Value, incoming: &Value) {
    match (base, incoming) {
        (Value::Object(base_map), Value::Object(in_map)) => {
            for (key, in_value) in in_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge_value(base_value, in_value),
                    None => {
                        base_map.insert(key.clone(), in_value.clone());
                    }
                }
            }
        }
        (base_slot, in_value) => {
            *base_slot = in_value.clone();
        }
    }
}
