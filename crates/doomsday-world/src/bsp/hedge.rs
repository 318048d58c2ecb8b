//! Half-edges produced while partitioning.

use doomsday_core::{Aabb2, DivLine, LineId, LineSide, SectorId, VertexId};
use glam::DVec2;

use super::superblockmap::BlockId;

/// Index of a half-edge in the builder's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HEdgeId(pub u32);

impl HEdgeId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Where a half-edge currently lives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Placement {
    /// Held in a work list by the partitioner.
    #[default]
    Unplaced,
    /// Owned by a block of the spatial index.
    Block(BlockId),
    /// Assigned to a finished leaf.
    Leaf(u32),
}

/// A directed edge between two vertices.
///
/// A half-edge without a `line` is a mini-hedge, created along a partition
/// or behind a one-sided window.
#[derive(Clone, Debug, PartialEq)]
pub struct HEdge {
    pub from: VertexId,
    pub to: VertexId,
    pub start: DVec2,
    pub end: DVec2,
    /// Map line this half-edge runs along, `None` for mini-hedges.
    pub line: Option<LineId>,
    /// Map line this half-edge was derived from.
    pub source_line: Option<LineId>,
    pub side: LineSide,
    pub sector: Option<SectorId>,
    pub twin: Option<HEdgeId>,
    pub placement: Placement,
}

impl HEdge {
    pub fn new(from: VertexId, to: VertexId, start: DVec2, end: DVec2) -> Self {
        Self {
            from,
            to,
            start,
            end,
            line: None,
            source_line: None,
            side: LineSide::Front,
            sector: None,
            twin: None,
            placement: Placement::Unplaced,
        }
    }

    #[inline]
    pub const fn is_mini(&self) -> bool {
        self.line.is_none()
    }

    #[inline]
    pub fn delta(&self) -> DVec2 {
        self.end - self.start
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.start.distance(self.end)
    }

    #[inline]
    pub fn div_line(&self) -> DivLine {
        DivLine::from_points(self.start, self.end)
    }

    #[inline]
    pub fn bounds(&self) -> Aabb2 {
        Aabb2::from_points(self.start, self.end)
    }

    pub(crate) fn set_start(&mut self, vertex: VertexId, pos: DVec2) {
        self.from = vertex;
        self.start = pos;
    }

    pub(crate) fn set_end(&mut self, vertex: VertexId, pos: DVec2) {
        self.to = vertex;
        self.end = pos;
    }
}
