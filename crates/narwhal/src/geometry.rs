//! Shortest-path geometry on a bounded or toroidal grid.
//!
//! All functions are pure; the only state is the grid extent, dimensionality and the toroidal
//! flag. Positions are `nalgebra` vectors; in 2D the `z` component is ignored and kept at zero.

use crate::config::GridConfig;
use crate::rng::XorShift64Star;
use nalgebra as na;

pub type Position = na::Vector3<f64>;

/// A displacement as magnitude plus direction angles.
///
/// `xy_angle` is the heading in the XY plane (`atan2(dy, dx)`); `xz_angle` is the elevation out of
/// the XY plane (`atan2(dz, hypot(dx, dy))`) and stays 0 in 2D.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionVector {
    pub length: f64,
    pub xy_angle: f64,
    pub xz_angle: f64,
}

impl DirectionVector {
    pub const ZERO: Self = Self {
        length: 0.0,
        xy_angle: 0.0,
        xz_angle: 0.0,
    };

    pub fn from_components(dx: f64, dy: f64, dz: f64) -> Self {
        let planar = dx.hypot(dy);
        Self {
            length: (planar * planar + dz * dz).sqrt(),
            xy_angle: stable_atan2(dy, dx),
            xz_angle: stable_atan2(dz, planar),
        }
    }

    pub fn from_vector(v: &Position) -> Self {
        Self::from_components(v.x, v.y, v.z)
    }

    pub fn to_vector(&self) -> Position {
        let planar = self.length * self.xz_angle.cos();
        Position::new(
            planar * self.xy_angle.cos(),
            planar * self.xy_angle.sin(),
            self.length * self.xz_angle.sin(),
        )
    }

    /// Same direction, new magnitude.
    pub fn with_length(self, length: f64) -> Self {
        Self { length, ..self }
    }

    /// Limits the magnitude to `±max`, keeping the direction.
    pub fn clamp_length(self, max: f64) -> Self {
        if self.length > max {
            self.with_length(max)
        } else if self.length < -max {
            self.with_length(-max)
        } else {
            self
        }
    }

    /// Unit vector along the direction angles.
    ///
    /// A zero-length vector still has angles (both 0 for a zero delta), so coincident points get
    /// the `+x` direction instead of none.
    pub fn unit(&self) -> Position {
        self.with_length(1.0).to_vector()
    }
}

// A zero delta must read as angle 0 so the resulting direction stays well-defined.
fn stable_atan2(y: f64, x: f64) -> f64 {
    if y == 0.0 && x == 0.0 {
        0.0
    } else {
        y.atan2(x)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    extents: [f64; 3],
    axes: usize,
    toroidal: bool,
}

impl Geometry {
    pub fn new(extents: [f64; 3], axes: usize, toroidal: bool) -> Self {
        Self {
            extents,
            axes: axes.clamp(1, 3),
            toroidal,
        }
    }

    pub fn from_grid(grid: &GridConfig) -> Self {
        Self::new(grid.extents(), grid.axes(), grid.toroidal)
    }

    pub fn extents(&self) -> [f64; 3] {
        self.extents
    }

    pub fn axes(&self) -> usize {
        self.axes
    }

    pub fn is_toroidal(&self) -> bool {
        self.toroidal
    }

    /// Shortest vector from `from` to `to` under the grid's own wrap rule.
    pub fn distance(&self, from: &Position, to: &Position) -> DirectionVector {
        self.distance_with(from, to, self.toroidal)
    }

    /// Shortest vector from `from` to `to`, wrapping across edges when `toroidal` is set.
    pub fn distance_with(&self, from: &Position, to: &Position, toroidal: bool) -> DirectionVector {
        let d = self.delta_with(from, to, toroidal);
        DirectionVector::from_components(d.x, d.y, d.z)
    }

    /// Direct vector ignoring any wrap-around.
    pub fn absolute_distance(&self, from: &Position, to: &Position) -> DirectionVector {
        self.distance_with(from, to, false)
    }

    /// Per-axis shortest delta. Exactly half an extent does not wrap.
    pub fn delta_with(&self, from: &Position, to: &Position, toroidal: bool) -> Position {
        let mut out = Position::zeros();
        for axis in 0..self.axes {
            let raw = to[axis] - from[axis];
            let extent = self.extents[axis];
            out[axis] = if toroidal && raw.abs() > extent / 2.0 {
                raw - raw.signum() * extent
            } else {
                raw
            };
        }
        out
    }

    /// Maps a destination back into the grid.
    ///
    /// Toroidal grids fold every axis into `[0, extent)`, however many extents away the point
    /// is. Bounded grids clamp to `[0, extent]`.
    pub fn transpose_target(&self, point: &Position) -> Position {
        self.transpose_target_with(point, self.toroidal)
    }

    pub fn transpose_target_with(&self, point: &Position, toroidal: bool) -> Position {
        let mut out = Position::zeros();
        for axis in 0..self.axes {
            let extent = self.extents[axis];
            let v = point[axis];
            out[axis] = if toroidal {
                let folded = v.rem_euclid(extent);
                // `rem_euclid` can round a tiny negative value up to `extent` itself.
                if folded >= extent { 0.0 } else { folded }
            } else {
                v.clamp(0.0, extent)
            };
        }
        out
    }

    pub fn contains(&self, point: &Position) -> bool {
        (0..self.axes).all(|axis| point[axis] >= 0.0 && point[axis] <= self.extents[axis])
    }

    /// Length of a space diagonal across `cell` on the active axes.
    pub fn cell_diagonal(&self, cell: &[f64; 3]) -> f64 {
        (0..self.axes).map(|a| cell[a] * cell[a]).sum::<f64>().sqrt()
    }

    pub fn random_point(&self, rng: &mut XorShift64Star) -> Position {
        let mut out = Position::zeros();
        for axis in 0..self.axes {
            out[axis] = rng.next_f64_below(self.extents[axis]);
        }
        out
    }
}
