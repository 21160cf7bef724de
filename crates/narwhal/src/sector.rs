//! Uniform sector grid for bounded neighbor queries.
//!
//! Entities are bucketed by `floor(position / sector_size)`. The set of sector offsets that can
//! hold a point within the perception distance is computed once: points are sampled on a
//! circle (2D) or sphere (3D) of radius `perception + sector diagonal`, rounded to the lattice,
//! mirrored, and gap-filled along every axis so the offset set has no holes.

use crate::config::{AXIS_NAMES, GridConfig};
use crate::error::{Error, Result};
use crate::geometry::Position;
use indexmap::IndexSet;
use rustc_hash::{FxBuildHasher, FxHashMap, FxHashSet};
use std::collections::{BTreeMap, BTreeSet};
use std::hash::Hash;

/// Upper bound on the arc length, in sectors, between two angular samples.
const SAMPLE_SPACING: f64 = 0.25;
const MIN_SAMPLES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SectorCoord {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl SectorCoord {
    pub const ORIGIN: Self = Self { x: 0, y: 0, z: 0 };

    pub fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    fn get(&self, axis: usize) -> i64 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    fn set(&mut self, axis: usize, v: i64) {
        match axis {
            0 => self.x = v,
            1 => self.y = v,
            _ => self.z = v,
        }
    }

    fn offset_by(&self, other: &Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    fn negated(&self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

type Bucket<K> = IndexSet<K, FxBuildHasher>;

#[derive(Debug, Clone)]
pub struct SectorIndex<K> {
    sector_size: [f64; 3],
    counts: [i64; 3],
    axes: usize,
    toroidal: bool,
    perception: f64,
    offsets: Vec<SectorCoord>,
    entity_sector: FxHashMap<K, SectorCoord>,
    buckets: FxHashMap<SectorCoord, Bucket<K>>,
}

impl<K: Clone + Eq + Hash> SectorIndex<K> {
    pub fn new(grid: &GridConfig, perception: f64) -> Result<Self> {
        let axes = grid.axes();
        let extents = grid.extents();
        let mut counts = [1i64; 3];
        for axis in 0..axes {
            let size = grid.sector_size[axis];
            if !(size.is_finite() && size > 0.0) {
                return Err(Error::InvalidSectorSize {
                    axis: AXIS_NAMES[axis],
                    value: size,
                });
            }
            if !(extents[axis].is_finite() && extents[axis] > 0.0) {
                return Err(Error::InvalidExtent {
                    axis: AXIS_NAMES[axis],
                    value: extents[axis],
                });
            }
            // Round away float noise before taking the ceiling (100 / 10 must stay 10).
            let ratio = extents[axis] / size;
            let snapped = if (ratio - ratio.round()).abs() < 1e-9 {
                ratio.round()
            } else {
                ratio.ceil()
            };
            counts[axis] = (snapped as i64).max(1);
        }
        if !(perception.is_finite() && perception >= 0.0) {
            return Err(Error::InvalidDistance {
                name: "maximal_perception",
                value: perception,
            });
        }
        for axis in 1..axes {
            if grid.sector_size[axis] != grid.sector_size[0] {
                return Err(Error::AsymmetricGrid {
                    message: format!(
                        "sector size {} on axis {} differs from sector size {} on axis x",
                        grid.sector_size[axis], AXIS_NAMES[axis], grid.sector_size[0]
                    ),
                });
            }
        }

        // Offsets past these bounds only alias sectors already covered (toroidal) or leave the
        // grid (bounded).
        let mut limits = [0i64; 3];
        for axis in 0..axes {
            limits[axis] = if grid.toroidal {
                counts[axis] / 2
            } else {
                counts[axis] - 1
            };
        }
        let offsets = visible_offsets(perception, grid.sector_size[0], axes, limits);
        tracing::info!(
            axes,
            perception,
            sector_size = grid.sector_size[0],
            offsets = offsets.len(),
            "precomputed visible sector offsets"
        );

        Ok(Self {
            sector_size: grid.sector_size,
            counts,
            axes,
            toroidal: grid.toroidal,
            perception,
            offsets,
            entity_sector: FxHashMap::default(),
            buckets: FxHashMap::default(),
        })
    }

    pub fn perception(&self) -> f64 {
        self.perception
    }

    /// Relative sector coordinates scanned by every query, sorted.
    pub fn visible_offsets(&self) -> &[SectorCoord] {
        &self.offsets
    }

    /// Number of sectors along each axis.
    pub fn sector_counts(&self) -> [i64; 3] {
        self.counts
    }

    pub fn sector_coord(&self, position: &Position) -> SectorCoord {
        let mut coord = SectorCoord::ORIGIN;
        for axis in 0..self.axes {
            let raw = (position[axis] / self.sector_size[axis]).floor() as i64;
            coord.set(axis, raw.clamp(0, self.counts[axis] - 1));
        }
        coord
    }

    /// Places `entity` in the sector containing `position`.
    ///
    /// Returns `true` when the entity changed sector (or was new). Staying inside the same sector
    /// is a single map lookup.
    pub fn register(&mut self, entity: &K, position: &Position) -> bool {
        let coord = self.sector_coord(position);
        match self.entity_sector.get(entity) {
            Some(old) if *old == coord => return false,
            Some(old) => {
                let old = *old;
                self.remove_from_bucket(entity, &old);
            }
            None => {}
        }
        self.entity_sector.insert(entity.clone(), coord);
        self.buckets.entry(coord).or_default().insert(entity.clone());
        true
    }

    pub fn unregister(&mut self, entity: &K) -> Option<SectorCoord> {
        let coord = self.entity_sector.remove(entity)?;
        self.remove_from_bucket(entity, &coord);
        Some(coord)
    }

    fn remove_from_bucket(&mut self, entity: &K, coord: &SectorCoord) {
        if let Some(bucket) = self.buckets.get_mut(coord) {
            bucket.swap_remove(entity);
            if bucket.is_empty() {
                self.buckets.remove(coord);
            }
        }
    }

    pub fn clear(&mut self) {
        self.entity_sector.clear();
        self.buckets.clear();
    }

    /// Replaces the whole membership.
    pub fn rebuild<'a>(&mut self, entries: impl IntoIterator<Item = (&'a K, &'a Position)>)
    where
        K: 'a,
    {
        self.clear();
        for (entity, position) in entries {
            self.register(entity, position);
        }
    }

    pub fn sector_of(&self, entity: &K) -> Option<SectorCoord> {
        self.entity_sector.get(entity).copied()
    }

    pub fn members(&self, sector: &SectorCoord) -> impl Iterator<Item = &K> + '_ {
        self.buckets.get(sector).into_iter().flat_map(|b| b.iter())
    }

    /// Occupied sectors with their members. Empty sectors are never stored.
    pub fn membership(&self) -> impl Iterator<Item = (&SectorCoord, indexmap::set::Iter<'_, K>)> {
        self.buckets.iter().map(|(coord, bucket)| (coord, bucket.iter()))
    }

    pub fn len(&self) -> usize {
        self.entity_sector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_sector.is_empty()
    }

    /// Visits every entity in a sector visible from `position`.
    ///
    /// Each sector is visited once even when wrapped offsets alias, so an entity is reported at
    /// most once. The querying entity itself is included when present.
    pub fn for_each_candidate<F>(&self, position: &Position, mut callback: F)
    where
        F: FnMut(&K),
    {
        let base = self.sector_coord(position);
        let mut seen: FxHashSet<SectorCoord> = FxHashSet::default();
        'offsets: for offset in &self.offsets {
            let mut target = base.offset_by(offset);
            for axis in 0..self.axes {
                let v = target.get(axis);
                let count = self.counts[axis];
                if self.toroidal {
                    target.set(axis, v.rem_euclid(count));
                } else if v < 0 || v >= count {
                    continue 'offsets;
                }
            }
            if !seen.insert(target) {
                continue;
            }
            if let Some(bucket) = self.buckets.get(&target) {
                for entity in bucket {
                    callback(entity);
                }
            }
        }
    }

    pub fn candidates_near(&self, position: &Position) -> Vec<K> {
        let mut out = Vec::new();
        self.for_each_candidate(position, |e| out.push(e.clone()));
        out
    }
}

/// Lattice offsets covering every sector that may hold a point within `perception` of a point in
/// the origin sector, restricted to `|offset[axis]| <= limits[axis]` on the active axes.
pub fn visible_offsets(
    perception: f64,
    sector_size: f64,
    axes: usize,
    limits: [i64; 3],
) -> Vec<SectorCoord> {
    let axes = axes.clamp(1, 3);
    // Center-to-center distance of two cells holding points `perception` apart is at most
    // `perception + diagonal`.
    let radius = perception / sector_size + (axes as f64).sqrt();
    if (0..axes).all(|axis| radius >= limits[axis] as f64) {
        return full_box(axes, limits);
    }
    let steps = ((std::f64::consts::TAU * radius / SAMPLE_SPACING).ceil() as usize).max(MIN_SAMPLES);

    let mut points: BTreeSet<SectorCoord> = BTreeSet::new();
    points.insert(SectorCoord::ORIGIN);

    let round = |v: f64| v.round() as i64;
    match axes {
        1 => {
            let r = round(radius);
            points.insert(SectorCoord::new(r, 0, 0));
            points.insert(SectorCoord::new(-r, 0, 0));
        }
        2 => {
            for i in 0..steps {
                let theta = std::f64::consts::TAU * (i as f64) / (steps as f64);
                points.insert(SectorCoord::new(
                    round(radius * theta.cos()),
                    round(radius * theta.sin()),
                    0,
                ));
            }
        }
        _ => {
            let rings = steps / 2;
            for j in 0..=rings {
                let phi = -std::f64::consts::FRAC_PI_2
                    + std::f64::consts::PI * (j as f64) / (rings as f64);
                let planar = radius * phi.cos();
                let z = round(radius * phi.sin());
                for i in 0..steps {
                    let theta = std::f64::consts::TAU * (i as f64) / (steps as f64);
                    points.insert(SectorCoord::new(
                        round(planar * theta.cos()),
                        round(planar * theta.sin()),
                        z,
                    ));
                }
            }
        }
    }

    let mirrored: Vec<SectorCoord> = points.iter().map(SectorCoord::negated).collect();
    points.extend(mirrored);

    for axis in 0..axes {
        fill_scan_lines(&mut points, axis);
    }
    // Scan lines are filled symmetrically, so dropping the overhang keeps the set hole-free.
    points
        .into_iter()
        .filter(|p| (0..axes).all(|axis| p.get(axis).abs() <= limits[axis]))
        .collect()
}

fn full_box(axes: usize, limits: [i64; 3]) -> Vec<SectorCoord> {
    let span = |axis: usize| {
        if axis < axes {
            -limits[axis]..=limits[axis]
        } else {
            0..=0
        }
    };
    let mut out = Vec::new();
    for x in span(0) {
        for y in span(1) {
            for z in span(2) {
                out.push(SectorCoord::new(x, y, z));
            }
        }
    }
    out
}

// Fills every hole between the extremes of each line parallel to `axis`.
fn fill_scan_lines(points: &mut BTreeSet<SectorCoord>, axis: usize) {
    let mut extremes: BTreeMap<(i64, i64), (i64, i64)> = BTreeMap::new();
    let others: Vec<usize> = (0..3).filter(|&a| a != axis).collect();
    for p in points.iter() {
        let key = (p.get(others[0]), p.get(others[1]));
        let v = p.get(axis);
        let entry = extremes.entry(key).or_insert((v, v));
        entry.0 = entry.0.min(v);
        entry.1 = entry.1.max(v);
    }
    for ((a, b), (lo, hi)) in extremes {
        for v in lo..=hi {
            let mut p = SectorCoord::ORIGIN;
            p.set(others[0], a);
            p.set(others[1], b);
            p.set(axis, v);
            points.insert(p);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Dimensions;

    const UNBOUNDED: [i64; 3] = [i64::MAX; 3];

    fn grid(toroidal: bool) -> GridConfig {
        GridConfig {
            toroidal,
            ..GridConfig::default()
        }
    }

    #[test]
    fn offsets_contain_origin_and_are_symmetric() {
        for axes in [2, 3] {
            let offsets = visible_offsets(17.0, 10.0, axes, UNBOUNDED);
            assert!(offsets.contains(&SectorCoord::ORIGIN));
            for o in &offsets {
                assert!(offsets.contains(&o.negated()), "{o:?} missing mirror");
            }
        }
    }

    #[test]
    fn offsets_have_no_holes_in_2d() {
        let offsets = visible_offsets(35.0, 10.0, 2, UNBOUNDED);
        let set: BTreeSet<_> = offsets.iter().copied().collect();
        let max = offsets.iter().map(|o| o.x).max().unwrap_or(0);
        for x in -max..=max {
            let ys: Vec<i64> = offsets.iter().filter(|o| o.x == x).map(|o| o.y).collect();
            let (lo, hi) = (*ys.iter().min().unwrap(), *ys.iter().max().unwrap());
            for y in lo..=hi {
                assert!(set.contains(&SectorCoord::new(x, y, 0)), "hole at ({x}, {y})");
            }
        }
    }

    #[test]
    fn two_dimensional_offsets_stay_flat() {
        assert!(visible_offsets(25.0, 10.0, 2, UNBOUNDED).iter().all(|o| o.z == 0));
        assert!(visible_offsets(25.0, 10.0, 3, UNBOUNDED).iter().any(|o| o.z != 0));
    }

    #[test]
    fn register_moves_between_buckets() {
        let mut index: SectorIndex<&str> = SectorIndex::new(&grid(false), 15.0).expect("index");
        assert!(index.register(&"a", &Position::new(5.0, 5.0, 0.0)));
        assert!(!index.register(&"a", &Position::new(6.0, 9.0, 0.0)));
        assert_eq!(index.sector_of(&"a"), Some(SectorCoord::new(0, 0, 0)));

        assert!(index.register(&"a", &Position::new(15.0, 5.0, 0.0)));
        assert_eq!(index.sector_of(&"a"), Some(SectorCoord::new(1, 0, 0)));
        assert_eq!(index.members(&SectorCoord::ORIGIN).count(), 0);
        assert_eq!(index.membership().count(), 1);

        assert_eq!(index.unregister(&"a"), Some(SectorCoord::new(1, 0, 0)));
        assert!(index.is_empty());
        assert_eq!(index.membership().count(), 0);
    }

    #[test]
    fn far_edge_is_clamped_into_last_sector() {
        let index: SectorIndex<u32> = SectorIndex::new(&grid(false), 15.0).expect("index");
        assert_eq!(
            index.sector_coord(&Position::new(100.0, 100.0, 0.0)),
            SectorCoord::new(9, 9, 0)
        );
    }

    #[test]
    fn toroidal_query_wraps_across_corner() {
        let mut index: SectorIndex<u32> = SectorIndex::new(&grid(true), 15.0).expect("index");
        index.register(&1, &Position::new(95.0, 95.0, 0.0));
        index.register(&2, &Position::new(50.0, 50.0, 0.0));
        let near = index.candidates_near(&Position::new(5.0, 5.0, 0.0));
        assert_eq!(near, vec![1]);
    }

    #[test]
    fn bounded_query_does_not_wrap() {
        let mut index: SectorIndex<u32> = SectorIndex::new(&grid(false), 15.0).expect("index");
        index.register(&1, &Position::new(95.0, 95.0, 0.0));
        assert!(index.candidates_near(&Position::new(5.0, 5.0, 0.0)).is_empty());
    }

    #[test]
    fn aliased_offsets_report_each_entity_once() {
        // Perception larger than the whole grid: every offset wraps onto every sector.
        let small = GridConfig {
            width: 20.0,
            height: 20.0,
            toroidal: true,
            ..GridConfig::default()
        };
        let mut index: SectorIndex<u32> = SectorIndex::new(&small, 50.0).expect("index");
        for (i, (x, y)) in [(1.0, 1.0), (15.0, 3.0), (7.0, 18.0)].into_iter().enumerate() {
            index.register(&(i as u32), &Position::new(x, y, 0.0));
        }
        let mut near = index.candidates_near(&Position::new(2.0, 2.0, 0.0));
        near.sort_unstable();
        assert_eq!(near, vec![0, 1, 2]);
    }

    #[test]
    fn perception_beyond_the_grid_is_capped_by_sector_count() {
        let mut g = grid(true);
        g.dimensions = Dimensions::Three;
        let index: SectorIndex<u32> = SectorIndex::new(&g, 400.0).expect("index");
        // 10 sectors per axis wrap onto offsets -5..=5.
        assert_eq!(index.visible_offsets().len(), 11 * 11 * 11);
        assert!(index.visible_offsets().iter().all(|o| o.x.abs() <= 5 && o.z.abs() <= 5));

        let bounded: SectorIndex<u32> = SectorIndex::new(&grid(false), 400.0).expect("index");
        assert_eq!(bounded.visible_offsets().len(), 19 * 19);
    }

    #[test]
    fn offsets_never_exceed_limits() {
        // Radius 4.9 sectors reaches past a 7x7 box, which is returned whole.
        let offsets = visible_offsets(35.0, 10.0, 2, [3, 3, 0]);
        assert_eq!(offsets.len(), 49);
        assert!(offsets.iter().all(|o| o.x.abs() <= 3 && o.y.abs() <= 3 && o.z == 0));

        // A radius inside the limits is still a disc, not the box.
        let disc = visible_offsets(35.0, 10.0, 2, [6, 6, 0]);
        assert!(disc.len() < 13 * 13);
        assert!(!disc.contains(&SectorCoord::new(6, 6, 0)));
        assert!(disc.contains(&SectorCoord::new(5, 0, 0)));
    }

    #[test]
    fn mismatched_sector_sizes_are_rejected() {
        let mut g = grid(false);
        g.dimensions = Dimensions::Three;
        g.sector_size = [10.0, 10.0, 5.0];
        let err = SectorIndex::<u32>::new(&g, 10.0);
        assert!(matches!(err, Err(Error::AsymmetricGrid { .. })));
    }

    #[test]
    fn zero_sector_size_is_rejected() {
        let mut g = grid(false);
        g.sector_size = [0.0; 3];
        let err = SectorIndex::<u32>::new(&g, 10.0);
        assert!(matches!(err, Err(Error::InvalidSectorSize { axis: 'x', .. })));
    }
}
