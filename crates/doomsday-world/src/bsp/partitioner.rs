//! Partition selection and half-edge division.
//!
//! Costs follow the classic node-builder heuristic: splits and near misses
//! are penalised in proportion to the configured factor, imbalance between
//! the two sides is penalised in proportion to the edge counts, and axis
//! aligned partitions get a slight preference.

use doomsday_core::{Aabb2, DivLine, LineId, LineSide, SectorId, VertexId};
use glam::DVec2;
use smallvec::SmallVec;
use tracing::warn;

use super::builder::BuildState;
use super::hedge::{HEdge, HEdgeId, Placement};
use super::superblockmap::BlockId;

/// Perpendicular distance under which a vertex counts as on a partition.
pub(super) const DIST_EPSILON: f64 = 1.0 / 128.0;
/// Distance under which a near miss or split end is considered iffy.
const IFFY_LEN: f64 = 4.0;
/// Angular tolerance in degrees for wall tip matching.
const ANG_EPSILON: f64 = 1.0 / 1024.0;
/// Cuts closer than this along the partition are merged.
const CUT_MERGE_DIST: f64 = 0.2;

/// A wall leaving a vertex, with the sectors either side when facing away
/// from the vertex.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(super) struct WallTip {
    angle: f64,
    left: Option<SectorId>,
    right: Option<SectorId>,
}

pub(super) type WallTips = SmallVec<[WallTip; 4]>;

/// Angle of a direction in degrees, in `[0, 360)`.
pub(super) fn angle_of(delta: DVec2) -> f64 {
    let angle = delta.y.atan2(delta.x).to_degrees();
    if angle < 0.0 {
        angle + 360.0
    } else {
        angle
    }
}

/// Add a tip keeping the set sorted by angle.
pub(super) fn add_wall_tip(
    tips: &mut WallTips,
    delta: DVec2,
    left: Option<SectorId>,
    right: Option<SectorId>,
) {
    let angle = angle_of(delta);
    let at = tips
        .iter()
        .position(|t| t.angle > angle)
        .unwrap_or(tips.len());
    tips.insert(at, WallTip { angle, left, right });
}

/// Sector open in direction `delta` from a vertex, `None` if a wall runs
/// that way or the space is void.
fn open_sector(tips: &[WallTip], delta: DVec2) -> Option<SectorId> {
    let angle = angle_of(delta);
    let along_wall = tips.iter().any(|t| {
        let diff = (t.angle - angle).abs();
        diff < ANG_EPSILON || diff > 360.0 - ANG_EPSILON
    });
    if along_wall {
        return None;
    }
    match tips.iter().find(|t| angle + ANG_EPSILON < t.angle) {
        Some(tip) => tip.right,
        None => tips.last().and_then(|t| t.left),
    }
}

/// The partition line chosen for one step.
#[derive(Clone, Copy, Debug)]
pub(super) struct Partition {
    pub origin: DVec2,
    pub direction: DVec2,
    pub length: f64,
    pub source_line: Option<LineId>,
}

impl Partition {
    fn from_hedge(hedge: &HEdge) -> Self {
        Self {
            origin: hedge.start,
            direction: hedge.delta(),
            length: hedge.length(),
            source_line: hedge.source_line,
        }
    }

    /// Signed distance from the partition, positive on the right.
    #[inline]
    fn perp(&self, p: DVec2) -> f64 {
        let d = p - self.origin;
        (self.direction.y * d.x - self.direction.x * d.y) / self.length
    }

    /// Distance along the partition from its origin.
    #[inline]
    fn para(&self, p: DVec2) -> f64 {
        (p - self.origin).dot(self.direction) / self.length
    }

    #[inline]
    fn is_axis_aligned(&self) -> bool {
        self.direction.x == 0.0 || self.direction.y == 0.0
    }

    pub fn div_line(&self) -> DivLine {
        DivLine::new(self.origin, self.direction)
    }

    /// Side a whole box lies on, or `None` if the partition touches it.
    fn box_side(&self, bounds: &Aabb2) -> Option<LineSide> {
        let (mut right, mut left) = (false, false);
        for corner in bounds.corners() {
            let d = self.perp(corner);
            if d > DIST_EPSILON {
                right = true;
            } else if d < -DIST_EPSILON {
                left = true;
            } else {
                return None;
            }
        }
        match (right, left) {
            (true, false) => Some(LineSide::Front),
            (false, true) => Some(LineSide::Back),
            _ => None,
        }
    }

    /// Perpendicular distances of both ends of `hedge`.
    ///
    /// Half-edges of the partition's own line are treated as lying on it.
    fn distances(&self, hedge: &HEdge) -> (f64, f64) {
        if hedge.source_line.is_some() && hedge.source_line == self.source_line {
            (0.0, 0.0)
        } else {
            (self.perp(hedge.start), self.perp(hedge.end))
        }
    }
}

/// Where a half-edge falls relative to a partition.
enum Division {
    OnLine { same_direction: bool },
    Right,
    Left,
    Split,
}

fn classify(part: &Partition, hedge: &HEdge, a: f64, b: f64) -> Division {
    if a.abs() <= DIST_EPSILON && b.abs() <= DIST_EPSILON {
        Division::OnLine {
            same_direction: hedge.delta().dot(part.direction) >= 0.0,
        }
    } else if a > -DIST_EPSILON && b > -DIST_EPSILON {
        Division::Right
    } else if a < DIST_EPSILON && b < DIST_EPSILON {
        Division::Left
    } else {
        Division::Split
    }
}

#[derive(Debug, Default)]
struct PartitionCost {
    real_left: i64,
    real_right: i64,
    mini_left: i64,
    mini_right: i64,
    cost: i64,
}

impl PartitionCost {
    fn add(&mut self, side: LineSide, mini: bool) {
        let counter = match (side, mini) {
            (LineSide::Front, false) => &mut self.real_right,
            (LineSide::Front, true) => &mut self.mini_right,
            (LineSide::Back, false) => &mut self.real_left,
            (LineSide::Back, true) => &mut self.mini_left,
        };
        *counter += 1;
    }
}

/// A vertex lying on the partition.
#[derive(Clone, Copy, Debug)]
pub(super) struct Cut {
    vertex: VertexId,
    along: f64,
    /// Sector open just before the vertex, looking back along the partition.
    before: Option<SectorId>,
    /// Sector open just after the vertex.
    after: Option<SectorId>,
}

impl BuildState<'_> {
    /// Pick the cheapest partition for the half-edges below `block`.
    ///
    /// Returns `None` when no line divides them, meaning they bound a convex
    /// region.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub(super) fn choose_partition(&mut self, block: BlockId) -> Option<Partition> {
        self.tried.begin();
        let mut best: Option<(i64, Partition)> = None;

        for id in self.blockmap.collect(block) {
            let hedge = &self.hedges[id.index()];
            let Some(line) = hedge.line else {
                continue;
            };
            let part = Partition::from_hedge(hedge);
            if !self.tried.mark(line.index()) {
                continue;
            }

            let limit = best.as_ref().map_or(i64::MAX, |(cost, _)| *cost);
            if let Some(cost) = self.evaluate(block, &part, limit) {
                if cost < limit {
                    best = Some((cost, part));
                }
            }
        }

        best.map(|(_, part)| part)
    }

    fn evaluate(&self, block: BlockId, part: &Partition, limit: i64) -> Option<i64> {
        let mut cost = PartitionCost::default();
        if !self.evaluate_block(block, part, limit, &mut cost) {
            return None;
        }
        if cost.real_left == 0 || cost.real_right == 0 {
            return None;
        }

        cost.cost += 100 * (cost.real_left - cost.real_right).abs();
        cost.cost += 50 * (cost.mini_left - cost.mini_right).abs();
        if !part.is_axis_aligned() {
            cost.cost += 25;
        }
        Some(cost.cost)
    }

    /// Accumulate the cost of one block and its children; false once the
    /// running cost exceeds `limit`.
    fn evaluate_block(
        &self,
        block: BlockId,
        part: &Partition,
        limit: i64,
        cost: &mut PartitionCost,
    ) -> bool {
        let factor = f64::from(self.config.split_cost_factor);

        let bounds = self.blockmap.bounds(block).inflate(IFFY_LEN * 1.5);
        if let Some(side) = part.box_side(&bounds) {
            let (real, mini) = (
                self.blockmap.real_count(block) as i64,
                self.blockmap.mini_count(block) as i64,
            );
            match side {
                LineSide::Front => {
                    cost.real_right += real;
                    cost.mini_right += mini;
                }
                LineSide::Back => {
                    cost.real_left += real;
                    cost.mini_left += mini;
                }
            }
            return true;
        }

        for &id in self.blockmap.hedges(block) {
            if cost.cost > limit {
                return false;
            }

            let hedge = &self.hedges[id.index()];
            let mini = hedge.is_mini();
            let (a, b) = part.distances(hedge);

            match classify(part, hedge, a, b) {
                Division::OnLine { same_direction } => {
                    let side = if same_direction {
                        LineSide::Front
                    } else {
                        LineSide::Back
                    };
                    cost.add(side, mini);
                }
                Division::Right => {
                    cost.add(LineSide::Front, mini);
                    let clear = (a >= IFFY_LEN && b >= IFFY_LEN)
                        || (a <= DIST_EPSILON && b >= IFFY_LEN)
                        || (b <= DIST_EPSILON && a >= IFFY_LEN);
                    if !clear {
                        // Near miss: closer means shorter future mini-hedges.
                        let q = if a <= DIST_EPSILON || b <= DIST_EPSILON {
                            IFFY_LEN / a.max(b)
                        } else {
                            IFFY_LEN / a.min(b)
                        };
                        cost.cost += (100.0 * factor * (q * q - 1.0)) as i64;
                    }
                }
                Division::Left => {
                    cost.add(LineSide::Back, mini);
                    let clear = (a <= -IFFY_LEN && b <= -IFFY_LEN)
                        || (a >= -DIST_EPSILON && b <= -IFFY_LEN)
                        || (b >= -DIST_EPSILON && a <= -IFFY_LEN);
                    if !clear {
                        let q = if a >= -DIST_EPSILON || b >= -DIST_EPSILON {
                            IFFY_LEN / -a.min(b)
                        } else {
                            IFFY_LEN / -a.max(b)
                        };
                        cost.cost += (70.0 * factor * (q * q - 1.0)) as i64;
                    }
                }
                Division::Split => {
                    cost.cost += (100.0 * factor) as i64;
                    let (fa, fb) = (a.abs(), b.abs());
                    if fa < IFFY_LEN || fb < IFFY_LEN {
                        let q = IFFY_LEN / fa.min(fb);
                        cost.cost += (140.0 * factor * (q * q - 1.0)) as i64;
                    }
                }
            }
        }

        for index in 0..2 {
            if let Some(child) = self.blockmap.child(block, index) {
                if !self.evaluate_block(child, part, limit, cost) {
                    return false;
                }
            }
        }
        true
    }

    /// Move every half-edge below `block` to the right or left root,
    /// splitting the ones the partition crosses.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub(super) fn separate(
        &mut self,
        block: BlockId,
        part: &Partition,
        right: BlockId,
        left: BlockId,
    ) -> Vec<Cut> {
        let mut cuts = Vec::new();
        let mut work = self.blockmap.take_all(block, &mut self.hedges);

        while let Some(id) = work.pop() {
            let hedge = &self.hedges[id.index()];
            let (a, b) = part.distances(hedge);
            let (from, to) = (hedge.from, hedge.to);

            match classify(part, hedge, a, b) {
                Division::OnLine { same_direction } => {
                    self.add_cut(&mut cuts, part, from);
                    self.add_cut(&mut cuts, part, to);
                    let target = if same_direction { right } else { left };
                    self.blockmap.push(target, &mut self.hedges, id);
                }
                division @ (Division::Right | Division::Left) => {
                    // One end may touch the partition.
                    if a.abs() < DIST_EPSILON {
                        self.add_cut(&mut cuts, part, from);
                    } else if b.abs() < DIST_EPSILON {
                        self.add_cut(&mut cuts, part, to);
                    }
                    let target = if matches!(division, Division::Right) {
                        right
                    } else {
                        left
                    };
                    self.blockmap.push(target, &mut self.hedges, id);
                }
                Division::Split => {
                    let (vertex, tail) = self.split_hedge(id, part, a, b, &mut work);
                    self.add_cut(&mut cuts, part, vertex);
                    let (head_side, tail_side) = if a < 0.0 { (left, right) } else { (right, left) };
                    self.blockmap.push(head_side, &mut self.hedges, id);
                    self.blockmap.push(tail_side, &mut self.hedges, tail);
                }
            }
        }

        cuts
    }

    /// Split a half-edge (and its twin) where the partition crosses it.
    ///
    /// The original keeps the start half; the returned half-edge runs from
    /// the new vertex to the old end.
    fn split_hedge(
        &mut self,
        id: HEdgeId,
        part: &Partition,
        a: f64,
        b: f64,
        work: &mut Vec<HEdgeId>,
    ) -> (VertexId, HEdgeId) {
        let original = self.hedges[id.index()].clone();
        let pos = intersection(part, &original, a, b);

        let vertex = VertexId::from(self.vertices.len());
        self.vertices.push(pos);

        let delta = original.delta();
        let back = original.twin.and_then(|t| self.hedges[t.index()].sector);
        let mut tips = WallTips::new();
        add_wall_tip(&mut tips, -delta, original.sector, back);
        add_wall_tip(&mut tips, delta, back, original.sector);
        self.tips.push(tips);

        let tail_id = HEdgeId(self.hedges.len() as u32);
        let mut tail = original.clone();
        tail.set_start(vertex, pos);
        tail.placement = Placement::Unplaced;
        tail.twin = None;
        self.hedges[id.index()].set_end(vertex, pos);
        self.hedges.push(tail);

        if let Some(twin) = original.twin {
            // Twin ran end -> start; it keeps the half ending at our start.
            let twin_tail_id = HEdgeId(self.hedges.len() as u32);
            let mut twin_tail = self.hedges[twin.index()].clone();
            twin_tail.set_end(vertex, pos);
            twin_tail.twin = Some(tail_id);
            twin_tail.placement = Placement::Unplaced;
            self.hedges[twin.index()].set_start(vertex, pos);
            self.hedges.push(twin_tail);
            self.hedges[tail_id.index()].twin = Some(twin_tail_id);

            match self.hedges[twin.index()].placement {
                Placement::Block(block) => {
                    self.blockmap.push_at(block, &mut self.hedges, twin_tail_id);
                }
                Placement::Leaf(leaf) => {
                    self.leaves[leaf as usize].push(twin_tail_id);
                    self.hedges[twin_tail_id.index()].placement = Placement::Leaf(leaf);
                }
                Placement::Unplaced => work.push(twin_tail_id),
            }
        }

        (vertex, tail_id)
    }

    fn add_cut(&self, cuts: &mut Vec<Cut>, part: &Partition, vertex: VertexId) {
        if cuts.iter().any(|c| c.vertex == vertex) {
            return;
        }
        let tips = &self.tips[vertex.index()];
        let pos = self.vertices[vertex.index()];
        cuts.push(Cut {
            vertex,
            along: part.para(pos),
            before: open_sector(tips, -part.direction),
            after: open_sector(tips, part.direction),
        });
    }

    /// Close the gaps along the partition with mini-hedge pairs.
    pub(super) fn add_minihedges(
        &mut self,
        part: &Partition,
        mut cuts: Vec<Cut>,
        right: BlockId,
        left: BlockId,
    ) {
        cuts.sort_by(|a, b| a.along.total_cmp(&b.along));

        let mut merged: Vec<Cut> = Vec::with_capacity(cuts.len());
        for cut in cuts {
            if let Some(prev) = merged.last_mut() {
                if cut.along - prev.along <= CUT_MERGE_DIST {
                    for (mine, theirs) in [(prev.before, cut.before), (prev.after, cut.after)] {
                        if let (Some(x), Some(y)) = (mine, theirs) {
                            if x != y {
                                let at = self.vertices[cut.vertex.index()];
                                warn!(a = %x, b = %y, x = at.x, y = at.y, "Sector mismatch at merged cut");
                            }
                        }
                    }
                    prev.before = prev.before.or(cut.before);
                    prev.after = prev.after.or(cut.after);
                    continue;
                }
            }
            merged.push(cut);
        }

        for pair in merged.windows(2) {
            let (cur, next) = (pair[0], pair[1]);
            let sector = match (cur.after, next.before) {
                (None, None) => continue,
                (Some(open), None) | (None, Some(open)) => {
                    let at = self.vertices[cur.vertex.index()];
                    warn!(sector = %open, x = at.x, y = at.y, "Sector is unclosed");
                    continue;
                }
                (Some(a), Some(b)) => {
                    if a != b {
                        let at = self.vertices[cur.vertex.index()];
                        warn!(a = %a, b = %b, x = at.x, y = at.y, "Sector mismatch");
                    }
                    a
                }
            };

            let start = self.vertices[cur.vertex.index()];
            let end = self.vertices[next.vertex.index()];
            let seg_id = HEdgeId(self.hedges.len() as u32);
            let buddy_id = HEdgeId(seg_id.0 + 1);

            let mut seg = HEdge::new(cur.vertex, next.vertex, start, end);
            seg.sector = Some(sector);
            seg.source_line = part.source_line;
            seg.twin = Some(buddy_id);

            let mut buddy = HEdge::new(next.vertex, cur.vertex, end, start);
            buddy.sector = Some(sector);
            buddy.source_line = part.source_line;
            buddy.side = LineSide::Back;
            buddy.twin = Some(seg_id);

            self.hedges.push(seg);
            self.hedges.push(buddy);
            self.blockmap.push(right, &mut self.hedges, seg_id);
            self.blockmap.push(left, &mut self.hedges, buddy_id);
        }
    }
}

/// Point where the partition crosses a half-edge.
///
/// Axis-aligned pairs snap to the exact coordinate.
fn intersection(part: &Partition, hedge: &HEdge, a: f64, b: f64) -> DVec2 {
    let d = hedge.delta();
    if part.direction.y == 0.0 && d.x == 0.0 {
        return DVec2::new(hedge.start.x, part.origin.y);
    }
    if part.direction.x == 0.0 && d.y == 0.0 {
        return DVec2::new(part.origin.x, hedge.start.y);
    }

    let ds = a / (a - b);
    DVec2::new(
        if d.x == 0.0 {
            hedge.start.x
        } else {
            hedge.start.x + d.x * ds
        },
        if d.y == 0.0 {
            hedge.start.y
        } else {
            hedge.start.y + d.y * ds
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn angles_are_normalised() {
        assert_relative_eq!(angle_of(DVec2::X), 0.0);
        assert_relative_eq!(angle_of(DVec2::Y), 90.0);
        assert_relative_eq!(angle_of(-DVec2::Y), 270.0);
    }

    #[test]
    fn open_sector_between_tips() {
        let s = SectorId(3);
        let mut tips = WallTips::new();
        // Wall running east with the sector to its south, as seen from its
        // start vertex.
        add_wall_tip(&mut tips, DVec2::X, None, Some(s));
        // And back west from the same vertex, sector again south.
        add_wall_tip(&mut tips, -DVec2::X, Some(s), None);

        assert_eq!(open_sector(&tips, -DVec2::Y), Some(s));
        assert_eq!(open_sector(&tips, DVec2::Y), None);
        assert_eq!(open_sector(&tips, DVec2::X), None);
    }

    #[test]
    fn perpendicular_sign_matches_front() {
        let mut h = HEdge::new(VertexId(0), VertexId(1), DVec2::ZERO, DVec2::new(8.0, 0.0));
        h.line = Some(LineId(0));
        let part = Partition::from_hedge(&h);
        assert!(part.perp(DVec2::new(1.0, -2.0)) > 0.0);
        assert_relative_eq!(part.para(DVec2::new(3.0, 5.0)), 3.0);
    }

    #[test]
    fn split_point_snaps_on_axes() {
        let mut p = HEdge::new(VertexId(0), VertexId(1), DVec2::new(64.0, 0.0), DVec2::new(64.0, 128.0));
        p.line = Some(LineId(0));
        let part = Partition::from_hedge(&p);
        let h = HEdge::new(VertexId(2), VertexId(3), DVec2::new(0.0, 10.0), DVec2::new(100.0, 10.0));
        let (a, b) = part.distances(&h);
        assert_eq!(intersection(&part, &h, a, b), DVec2::new(64.0, 10.0));
    }
}
