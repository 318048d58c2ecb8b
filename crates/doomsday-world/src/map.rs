//! Map geometry as delivered by the level loader.
//!
//! The map is immutable after load except for sector heights, which movers
//! (doors, lifts) change during play.

use bitflags::bitflags;
use doomsday_core::{Aabb2, DivLine, LineId, PolyobjId, SectorId, VertexId};
use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorldError};

bitflags! {
    /// Line behaviour flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct LineFlags: u32 {
        /// Blocks movement.
        const BLOCKING  = 0x0001;
        /// Has sectors on both sides.
        const TWO_SIDED = 0x0004;
    }
}

/// A sector: a floor/ceiling region.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sector {
    pub floor_height: f64,
    pub ceiling_height: f64,
}

impl Sector {
    pub const fn new(floor_height: f64, ceiling_height: f64) -> Self {
        Self {
            floor_height,
            ceiling_height,
        }
    }
}

/// A map line (linedef) with the sectors on each side.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub from: VertexId,
    pub to: VertexId,
    /// Sector on the right-hand side.
    pub front: Option<SectorId>,
    /// Sector on the left-hand side.
    pub back: Option<SectorId>,
    pub flags: LineFlags,
    /// Owning polyobject, if the line is part of one.
    pub polyobj: Option<PolyobjId>,
}

impl Line {
    /// Returns true if both sides have a sector.
    #[inline]
    pub const fn is_two_sided(&self) -> bool {
        self.front.is_some() && self.back.is_some()
    }

    /// Returns true if both sides face the same sector.
    #[inline]
    pub fn is_self_referencing(&self) -> bool {
        self.front.is_some() && self.front == self.back
    }
}

/// A movable group of lines.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Polyobj {
    pub origin: DVec2,
    pub lines: Vec<LineId>,
}

/// Vertical gap through a two-sided line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineOpening {
    /// Lower of the two ceilings.
    pub top: f64,
    /// Higher of the two floors.
    pub bottom: f64,
    /// `top - bottom`; zero or negative when closed.
    pub range: f64,
    /// Lower of the two floors.
    pub low_floor: f64,
}

/// Loaded map geometry.
#[derive(Clone, Debug)]
pub struct Map {
    vertices: Vec<DVec2>,
    lines: Vec<Line>,
    sectors: Vec<Sector>,
    polyobjs: Vec<Polyobj>,
    /// Lines bordering each sector.
    sector_lines: Vec<Vec<LineId>>,
    line_bounds: Vec<Aabb2>,
    bounds: Aabb2,
}

impl Map {
    /// Assemble a map, checking every cross reference.
    pub fn new(
        vertices: Vec<DVec2>,
        lines: Vec<Line>,
        sectors: Vec<Sector>,
        polyobjs: Vec<Polyobj>,
    ) -> Result<Self> {
        if !vertices.iter().all(|v| v.is_finite()) {
            return Err(WorldError::InvalidMap("non-finite vertex".into()));
        }

        let mut sector_lines = vec![Vec::new(); sectors.len()];
        let mut line_bounds = Vec::with_capacity(lines.len());
        let mut bounds = Aabb2::EMPTY;

        for (index, line) in lines.iter().enumerate() {
            let id = LineId::from(index);
            let (Some(&a), Some(&b)) = (
                vertices.get(line.from.index()),
                vertices.get(line.to.index()),
            ) else {
                return Err(WorldError::InvalidMap(format!(
                    "line {id} references a missing vertex"
                )));
            };

            for sector in [line.front, line.back].into_iter().flatten() {
                let Some(list) = sector_lines.get_mut(sector.index()) else {
                    return Err(WorldError::UnknownSector(sector));
                };
                if list.last() != Some(&id) {
                    list.push(id);
                }
            }

            if let Some(po) = line.polyobj {
                if po.index() >= polyobjs.len() {
                    return Err(WorldError::InvalidMap(format!(
                        "line {id} references missing polyobj {po}"
                    )));
                }
            }

            let line_box = Aabb2::from_points(a, b);
            bounds = bounds.merge(&line_box);
            line_bounds.push(line_box);
        }

        for (index, po) in polyobjs.iter().enumerate() {
            if let Some(bad) = po.lines.iter().find(|l| l.index() >= lines.len()) {
                return Err(WorldError::InvalidMap(format!(
                    "polyobj #{index} references missing line {bad}"
                )));
            }
        }

        Ok(Self {
            vertices,
            lines,
            sectors,
            polyobjs,
            sector_lines,
            line_bounds,
            bounds,
        })
    }

    /// All vertices.
    pub fn vertices(&self) -> &[DVec2] {
        &self.vertices
    }

    /// All lines.
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// All sectors.
    pub fn sectors(&self) -> &[Sector] {
        &self.sectors
    }

    /// All polyobjs.
    pub fn polyobjs(&self) -> &[Polyobj] {
        &self.polyobjs
    }

    /// Bounds of every line in the map.
    pub fn bounds(&self) -> Aabb2 {
        self.bounds
    }

    /// Number of lines.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Number of sectors.
    pub fn sector_count(&self) -> usize {
        self.sectors.len()
    }

    /// Position of a vertex.
    #[inline]
    pub fn vertex(&self, id: VertexId) -> DVec2 {
        self.vertices[id.index()]
    }

    /// Line by id.
    #[inline]
    pub fn line(&self, id: LineId) -> &Line {
        &self.lines[id.index()]
    }

    /// Sector by id.
    #[inline]
    pub fn sector(&self, id: SectorId) -> &Sector {
        &self.sectors[id.index()]
    }

    /// Mutable sector, for movers that change heights.
    pub fn sector_mut(&mut self, id: SectorId) -> Result<&mut Sector> {
        self.sectors
            .get_mut(id.index())
            .ok_or(WorldError::UnknownSector(id))
    }

    /// Lines bordering a sector.
    pub fn sector_lines(&self, id: SectorId) -> &[LineId] {
        self.sector_lines
            .get(id.index())
            .map_or(&[], Vec::as_slice)
    }

    /// Both endpoints of a line.
    #[inline]
    pub fn line_points(&self, id: LineId) -> (DVec2, DVec2) {
        let line = self.line(id);
        (self.vertex(line.from), self.vertex(line.to))
    }

    /// Bounding box of a line.
    #[inline]
    pub fn line_bounds(&self, id: LineId) -> Aabb2 {
        self.line_bounds[id.index()]
    }

    /// The line as a dividing line through both endpoints.
    #[inline]
    pub fn line_div(&self, id: LineId) -> DivLine {
        let (a, b) = self.line_points(id);
        DivLine::from_points(a, b)
    }

    /// Length of a line.
    pub fn line_length(&self, id: LineId) -> f64 {
        let (a, b) = self.line_points(id);
        a.distance(b)
    }

    /// The vertical opening through a two-sided line.
    ///
    /// Returns `None` for one-sided lines.
    pub fn line_opening(&self, id: LineId) -> Option<LineOpening> {
        let line = self.line(id);
        let front = self.sector(line.front?);
        let back = self.sector(line.back?);

        let top = front.ceiling_height.min(back.ceiling_height);
        let bottom = front.floor_height.max(back.floor_height);
        Some(LineOpening {
            top,
            bottom,
            range: top - bottom,
            low_floor: front.floor_height.min(back.floor_height),
        })
    }

    /// Even-odd test of `point` against the lines bordering `sector`.
    ///
    /// Lines with the sector on both sides don't bound it and are ignored.
    pub fn check_point_in_sector(&self, point: DVec2, sector: SectorId) -> bool {
        let mut inside = false;
        for &id in self.sector_lines(sector) {
            if self.line(id).is_self_referencing() {
                continue;
            }
            let (a, b) = self.line_points(id);
            if (a.y > point.y) != (b.y > point.y) {
                let x = a.x + (point.y - a.y) * (b.x - a.x) / (b.y - a.y);
                if point.x < x {
                    inside = !inside;
                }
            }
        }
        inside
    }
}

/// Incremental map construction for loaders and tests.
#[derive(Debug, Default)]
pub struct MapBuilder {
    vertices: Vec<DVec2>,
    lines: Vec<Line>,
    sectors: Vec<Sector>,
    polyobjs: Vec<Polyobj>,
}

impl MapBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex.
    pub fn vertex(&mut self, x: f64, y: f64) -> VertexId {
        self.vertices.push(DVec2::new(x, y));
        VertexId::from(self.vertices.len() - 1)
    }

    /// Add a sector.
    pub fn sector(&mut self, floor_height: f64, ceiling_height: f64) -> SectorId {
        self.sectors.push(Sector::new(floor_height, ceiling_height));
        SectorId::from(self.sectors.len() - 1)
    }

    /// Add a line; two-sidedness is derived from the sectors given.
    pub fn line(
        &mut self,
        from: VertexId,
        to: VertexId,
        front: Option<SectorId>,
        back: Option<SectorId>,
    ) -> LineId {
        let flags = if front.is_some() && back.is_some() {
            LineFlags::TWO_SIDED
        } else {
            LineFlags::BLOCKING
        };
        self.lines.push(Line {
            from,
            to,
            front,
            back,
            flags,
            polyobj: None,
        });
        LineId::from(self.lines.len() - 1)
    }

    /// Add a closed loop of one-sided lines facing into `sector`.
    ///
    /// Points must wind clockwise so the sector lies on the right.
    pub fn room(&mut self, points: &[(f64, f64)], sector: SectorId) -> Vec<LineId> {
        let verts: Vec<VertexId> = points.iter().map(|&(x, y)| self.vertex(x, y)).collect();
        (0..verts.len())
            .map(|i| self.line(verts[i], verts[(i + 1) % verts.len()], Some(sector), None))
            .collect()
    }

    /// Add a polyobj owning the given lines.
    pub fn polyobj(&mut self, origin: DVec2, lines: Vec<LineId>) -> PolyobjId {
        let id = PolyobjId::from(self.polyobjs.len());
        for line in &lines {
            if let Some(l) = self.lines.get_mut(line.index()) {
                l.polyobj = Some(id);
            }
        }
        self.polyobjs.push(Polyobj { origin, lines });
        id
    }

    /// Mutable access to an already added line.
    pub fn line_mut(&mut self, id: LineId) -> Option<&mut Line> {
        self.lines.get_mut(id.index())
    }

    /// Finish and validate the map.
    pub fn build(self) -> Result<Map> {
        Map::new(self.vertices, self.lines, self.sectors, self.polyobjs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_room() -> Map {
        let mut b = MapBuilder::new();
        let s = b.sector(0.0, 128.0);
        b.room(&[(0.0, 0.0), (0.0, 256.0), (256.0, 256.0), (256.0, 0.0)], s);
        b.build().unwrap()
    }

    #[test]
    fn builds_sector_line_lists() {
        let map = square_room();
        assert_eq!(map.line_count(), 4);
        assert_eq!(map.sector_lines(SectorId(0)).len(), 4);
        assert_eq!(map.bounds().max, DVec2::new(256.0, 256.0));
    }

    #[test]
    fn point_in_sector() {
        let map = square_room();
        assert!(map.check_point_in_sector(DVec2::new(128.0, 128.0), SectorId(0)));
        assert!(!map.check_point_in_sector(DVec2::new(300.0, 128.0), SectorId(0)));
    }

    #[test]
    fn room_faces_inward() {
        let map = square_room();
        let div = map.line_div(LineId(0));
        assert_eq!(
            div.point_on_side(DVec2::new(128.0, 128.0)),
            doomsday_core::LineSide::Front
        );
    }

    #[test]
    fn opening_of_two_sided_line() {
        let mut b = MapBuilder::new();
        let low = b.sector(0.0, 128.0);
        let high = b.sector(24.0, 96.0);
        let v1 = b.vertex(0.0, 0.0);
        let v2 = b.vertex(0.0, 64.0);
        let l = b.line(v1, v2, Some(low), Some(high));
        let map = b.build().unwrap();

        let opening = map.line_opening(l).unwrap();
        assert_eq!(opening.top, 96.0);
        assert_eq!(opening.bottom, 24.0);
        assert_eq!(opening.range, 72.0);
        assert_eq!(opening.low_floor, 0.0);
    }

    #[test]
    fn rejects_dangling_vertex() {
        let mut b = MapBuilder::new();
        let s = b.sector(0.0, 128.0);
        let v = b.vertex(0.0, 0.0);
        b.line(v, VertexId(9), Some(s), None);
        assert!(matches!(b.build(), Err(WorldError::InvalidMap(_))));
    }
}
