//! Map-space math utilities.
//!
//! All map geometry is two-dimensional and stored in double precision.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::constants::MAX_GRID_CELLS;
use crate::error::{Error, Result};
use crate::types::LineSide;

/// Reject cell sizes that are not positive and finite.
pub fn check_cell_size(cell_size: f64) -> Result<f64> {
    if cell_size.is_finite() && cell_size > 0.0 {
        Ok(cell_size)
    } else {
        Err(Error::InvalidCellSize(cell_size))
    }
}

/// Columns and rows of `cell_size` squares needed to cover `extent`.
pub fn grid_dimensions(extent: DVec2, cell_size: f64) -> Result<(usize, usize)> {
    let cell_size = check_cell_size(cell_size)?;
    let cells = (extent.max(DVec2::ZERO) / cell_size).floor() + DVec2::ONE;
    if !cells.is_finite() || cells.x * cells.y > MAX_GRID_CELLS as f64 {
        return Err(Error::GridTooLarge {
            columns: cells.x,
            rows: cells.y,
            limit: MAX_GRID_CELLS,
        });
    }
    Ok((cells.x as usize, cells.y as usize))
}

/// Axis-Aligned Bounding Box in map space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb2 {
    /// Minimum corner
    pub min: DVec2,
    /// Maximum corner
    pub max: DVec2,
}

impl Default for Aabb2 {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Aabb2 {
    /// An inverted box that any point expands into.
    pub const EMPTY: Self = Self {
        min: DVec2::splat(f64::INFINITY),
        max: DVec2::splat(f64::NEG_INFINITY),
    };

    /// Create a new box from min and max corners
    #[inline]
    pub const fn new(min: DVec2, max: DVec2) -> Self {
        Self { min, max }
    }

    /// Smallest box containing both points
    #[inline]
    pub fn from_points(a: DVec2, b: DVec2) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Box of the given half-extent around a center point
    #[inline]
    pub fn from_center(center: DVec2, radius: f64) -> Self {
        Self {
            min: center - DVec2::splat(radius),
            max: center + DVec2::splat(radius),
        }
    }

    /// Returns true if no point has been added yet
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y
    }

    /// Get the center of the box
    #[inline]
    pub fn center(&self) -> DVec2 {
        (self.min + self.max) * 0.5
    }

    /// Get the size of the box
    #[inline]
    pub fn size(&self) -> DVec2 {
        self.max - self.min
    }

    /// Width along X
    #[inline]
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    /// Height along Y
    #[inline]
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// Check if this box intersects another (touching edges count)
    #[inline]
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    /// Check if the interiors of the two boxes overlap (touching edges don't)
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
    }

    /// Expand box to include a point
    #[inline]
    pub fn expand_to_include(&mut self, point: DVec2) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Merge two boxes
    #[inline]
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Grow the box outward by `margin` on every side
    #[inline]
    pub fn inflate(&self, margin: f64) -> Self {
        Self {
            min: self.min - DVec2::splat(margin),
            max: self.max + DVec2::splat(margin),
        }
    }

    /// The four corners, counter-clockwise from `min`.
    #[inline]
    pub fn corners(&self) -> [DVec2; 4] {
        [
            self.min,
            DVec2::new(self.max.x, self.min.y),
            self.max,
            DVec2::new(self.min.x, self.max.y),
        ]
    }
}

/// Where a box lies relative to a dividing line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoxSide {
    /// Entirely on the front (right) side.
    Front,
    /// Entirely on the back (left) side.
    Back,
    /// The line passes through the box.
    Crossing,
}

/// An infinite line through `origin` along `direction`.
///
/// Used for BSP partitions, sight traces, and line side tests.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DivLine {
    /// A point on the line
    pub origin: DVec2,
    /// Direction (not normalized)
    pub direction: DVec2,
}

impl DivLine {
    /// Create a new dividing line
    #[inline]
    pub const fn new(origin: DVec2, direction: DVec2) -> Self {
        Self { origin, direction }
    }

    /// Line through `from` towards `to`
    #[inline]
    pub fn from_points(from: DVec2, to: DVec2) -> Self {
        Self {
            origin: from,
            direction: to - from,
        }
    }

    /// Cross product of the direction with the offset to `point`.
    ///
    /// Positive on the front (right) side, negative on the back.
    #[inline]
    pub fn cross(&self, point: DVec2) -> f64 {
        let d = point - self.origin;
        self.direction.y * d.x - self.direction.x * d.y
    }

    /// Signed perpendicular distance to `point`, positive on the front.
    #[inline]
    pub fn signed_distance(&self, point: DVec2) -> f64 {
        let len = self.direction.length();
        if len == 0.0 {
            return 0.0;
        }
        self.cross(point) / len
    }

    /// Which side of the line `point` is on.
    ///
    /// Points exactly on the line are on the back side.
    #[inline]
    pub fn point_on_side(&self, point: DVec2) -> LineSide {
        if self.cross(point) > 0.0 {
            LineSide::Front
        } else {
            LineSide::Back
        }
    }

    /// Fraction along `self` at which `other` crosses it.
    ///
    /// Returns 0 for parallel lines.
    pub fn intercept(&self, other: &Self) -> f64 {
        let den = other.direction.y * self.direction.x - other.direction.x * self.direction.y;
        if den == 0.0 {
            return 0.0;
        }
        let num = (other.origin.x - self.origin.x) * other.direction.y
            + (self.origin.y - other.origin.y) * other.direction.x;
        num / den
    }

    /// Classify a box against the line.
    pub fn box_on_side(&self, bounds: &Aabb2) -> BoxSide {
        let mut front = false;
        let mut back = false;
        for corner in bounds.corners() {
            match self.point_on_side(corner) {
                LineSide::Front => front = true,
                LineSide::Back => back = true,
            }
        }
        match (front, back) {
            (true, false) => BoxSide::Front,
            (false, true) => BoxSide::Back,
            _ => BoxSide::Crossing,
        }
    }
}
