//! Coarse grids: a sparse grid of mobjs and a static grid of map lines.
//!
//! * One cell covers `cell_size`×`cell_size` map units (128 by default).
//! * Mobj cells are `SmallVec`s: few mobjs share a cell, so the common
//!   case does not allocate.

use doomsday_core::{check_cell_size, grid_dimensions, Aabb2, LineId};
use glam::DVec2;
use hashbrown::HashMap;
use smallvec::SmallVec;

use super::mobj::MobjId;
use crate::error::Result;
use crate::map::Map;
use crate::valid_count::ValidCount;

/// Coarse grid of mobjs, kept alongside the sector and line rings.
pub trait MobjBlockmap {
    /// Insert a mobj at `position`.
    fn insert(&mut self, mobj: MobjId, position: DVec2);

    /// Remove a mobj previously inserted at `position`. Returns false if it
    /// was not there.
    fn remove(&mut self, mobj: MobjId, position: DVec2) -> bool;
}

type Cell = SmallVec<[MobjId; 8]>;

/// Sparse hashed mobj grid; cells are only allocated where mobjs live.
#[derive(Clone, Debug)]
pub struct MobjGrid {
    origin: DVec2,
    cell_size: f64,
    cells: HashMap<(i32, i32), Cell>,
    len: usize,
}

impl MobjGrid {
    /// Fails if `cell_size` is not positive and finite.
    pub fn new(origin: DVec2, cell_size: f64) -> Result<Self> {
        Ok(Self {
            origin,
            cell_size: check_cell_size(cell_size)?,
            cells: HashMap::new(),
            len: 0,
        })
    }

    #[inline]
    fn cell_of(&self, position: DVec2) -> (i32, i32) {
        let c = ((position - self.origin) / self.cell_size).floor();
        (c.x as i32, c.y as i32)
    }

    /// Number of mobjs in the grid.
    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Visit every mobj in the cells overlapped by `bounds`.
    ///
    /// Stops early and returns false when `f` does.
    pub fn for_each_in_box(&self, bounds: Aabb2, mut f: impl FnMut(MobjId) -> bool) -> bool {
        let (xl, yl) = self.cell_of(bounds.min);
        let (xh, yh) = self.cell_of(bounds.max);
        for x in xl..=xh {
            for y in yl..=yh {
                if let Some(cell) = self.cells.get(&(x, y)) {
                    for &mobj in cell {
                        if !f(mobj) {
                            return false;
                        }
                    }
                }
            }
        }
        true
    }
}

impl Default for MobjGrid {
    fn default() -> Self {
        Self {
            origin: DVec2::ZERO,
            cell_size: doomsday_core::constants::MAPBLOCK_UNITS,
            cells: HashMap::new(),
            len: 0,
        }
    }
}

impl MobjBlockmap for MobjGrid {
    fn insert(&mut self, mobj: MobjId, position: DVec2) {
        let key = self.cell_of(position);
        self.cells.entry(key).or_default().push(mobj);
        self.len += 1;
    }

    fn remove(&mut self, mobj: MobjId, position: DVec2) -> bool {
        let key = self.cell_of(position);
        let Some(cell) = self.cells.get_mut(&key) else {
            return false;
        };
        let Some(i) = cell.iter().position(|&m| m == mobj) else {
            return false;
        };
        cell.swap_remove(i);
        if cell.is_empty() {
            self.cells.remove(&key);
        }
        self.len -= 1;
        true
    }
}

/// Static grid of map lines, built once per map.
#[derive(Clone, Debug)]
pub struct LineBlockmap {
    origin: DVec2,
    cell_size: f64,
    columns: usize,
    rows: usize,
    cells: Vec<Vec<LineId>>,
}

impl LineBlockmap {
    /// Bucket every line into each cell its bounding box touches.
    ///
    /// Fails if `cell_size` is not positive and finite or the grid would be
    /// too large.
    pub fn build(map: &Map, cell_size: f64) -> Result<Self> {
        let bounds = map.bounds();
        let origin = if bounds.is_empty() { DVec2::ZERO } else { bounds.min };
        let extent = if bounds.is_empty() { DVec2::ZERO } else { bounds.size() };
        let (columns, rows) = grid_dimensions(extent, cell_size)?;

        let mut grid = Self {
            origin,
            cell_size,
            columns,
            rows,
            cells: vec![Vec::new(); columns * rows],
        };

        for index in 0..map.line_count() {
            let id = LineId::from(index);
            if let Some((x0, y0, x1, y1)) = grid.cell_range(map.line_bounds(id)) {
                for y in y0..=y1 {
                    for x in x0..=x1 {
                        grid.cells[y * columns + x].push(id);
                    }
                }
            }
        }
        Ok(grid)
    }

    /// Inclusive cell range covered by `bounds`, clamped to the grid.
    fn cell_range(&self, bounds: Aabb2) -> Option<(usize, usize, usize, usize)> {
        let lo = ((bounds.min - self.origin) / self.cell_size).floor();
        let hi = ((bounds.max - self.origin) / self.cell_size).floor();
        if hi.x < 0.0 || hi.y < 0.0 || lo.x >= self.columns as f64 || lo.y >= self.rows as f64 {
            return None;
        }
        let clamp = |v: f64, n: usize| (v.max(0.0) as usize).min(n - 1);
        Some((
            clamp(lo.x, self.columns),
            clamp(lo.y, self.rows),
            clamp(hi.x, self.columns),
            clamp(hi.y, self.rows),
        ))
    }

    pub const fn columns(&self) -> usize {
        self.columns
    }

    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Visit each line in the cells overlapped by `bounds` once.
    ///
    /// Stops early and returns false when `f` does.
    pub fn for_each_line_in_box(
        &self,
        bounds: Aabb2,
        valid: &mut ValidCount,
        mut f: impl FnMut(LineId) -> bool,
    ) -> bool {
        let Some((x0, y0, x1, y1)) = self.cell_range(bounds) else {
            return true;
        };
        valid.begin();
        for y in y0..=y1 {
            for x in x0..=x1 {
                for &line in &self.cells[y * self.columns + x] {
                    if valid.mark(line.index()) && !f(line) {
                        return false;
                    }
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorldError;
    use crate::map::MapBuilder;
    use doomsday_core::Error as CoreError;

    fn id(n: u32) -> MobjId {
        MobjId::from_raw(n, 0)
    }

    #[test]
    fn grid_insert_remove() {
        let mut grid = MobjGrid::default();
        let a = id(0);
        let b = id(1);
        grid.insert(a, DVec2::new(10.0, 10.0));
        grid.insert(b, DVec2::new(300.0, 10.0));
        assert_eq!(grid.len(), 2);

        let mut seen = Vec::new();
        grid.for_each_in_box(Aabb2::new(DVec2::ZERO, DVec2::splat(100.0)), |m| {
            seen.push(m);
            true
        });
        assert_eq!(seen, vec![a]);

        assert!(grid.remove(a, DVec2::new(10.0, 10.0)));
        assert!(!grid.remove(a, DVec2::new(10.0, 10.0)));
        assert_eq!(grid.len(), 1);
    }

    #[test]
    fn line_grid_dedupes_spanning_lines() {
        let mut b = MapBuilder::new();
        let s = b.sector(0.0, 128.0);
        b.room(&[(0.0, 0.0), (0.0, 512.0), (512.0, 512.0), (512.0, 0.0)], s);
        let map = b.build().unwrap();
        let grid = LineBlockmap::build(&map, 128.0).unwrap();
        assert_eq!(grid.columns(), 5);

        let mut valid = ValidCount::new(map.line_count());
        let mut lines = Vec::new();
        grid.for_each_line_in_box(map.bounds(), &mut valid, |l| {
            lines.push(l);
            true
        });
        lines.sort();
        assert_eq!(lines, vec![LineId(0), LineId(1), LineId(2), LineId(3)]);
    }

    #[test]
    fn degenerate_cell_sizes_are_config_errors() {
        let mut b = MapBuilder::new();
        let s = b.sector(0.0, 128.0);
        b.room(&[(0.0, 0.0), (0.0, 512.0), (512.0, 512.0), (512.0, 0.0)], s);
        let map = b.build().unwrap();

        for size in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                LineBlockmap::build(&map, size),
                Err(WorldError::Core(CoreError::InvalidCellSize(_)))
            ));
            assert!(MobjGrid::new(DVec2::ZERO, size).is_err());
        }
        assert!(matches!(
            LineBlockmap::build(&map, 1e-4),
            Err(WorldError::Core(CoreError::GridTooLarge { .. }))
        ));
    }
}
