//! BSP builder entry point and leaf finalisation.

use std::time::Instant;

use doomsday_core::constants::MAPBLOCK_UNITS;
use doomsday_core::{Aabb2, LineId, LineSide, SectorId, VertexId};
use glam::DVec2;
use smallvec::SmallVec;
use tracing::{debug, info, warn};

use super::hedge::{HEdge, HEdgeId, Placement};
use super::partitioner::{add_wall_tip, angle_of, WallTips, DIST_EPSILON};
use super::superblockmap::{BlockId, SuperBlockmap};
use super::tree::{BspChild, BspLeaf, BspNode, BspTree, Segment};
use super::BspConfig;
use crate::error::{Result, WorldError};
use crate::map::Map;
use crate::valid_count::ValidCount;

/// Result of a successful build.
#[derive(Clone, Debug)]
pub struct BspOutput {
    pub tree: BspTree,
    /// Map vertices followed by the vertices created by splits.
    pub vertices: Vec<DVec2>,
}

/// Builds a BSP tree from map lines.
#[derive(Clone, Debug, Default)]
pub struct BspBuilder {
    config: BspConfig,
}

impl BspBuilder {
    pub const fn new(config: BspConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &BspConfig {
        &self.config
    }

    /// Partition the map into convex leaves.
    ///
    /// All intermediate state is owned by the call, so a failed build leaves
    /// nothing behind.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn build(&self, map: &Map) -> Result<BspOutput> {
        let started = Instant::now();
        let mut state = BuildState::new(map, &self.config);

        state.create_hedges()?;
        if state.hedges.is_empty() {
            return Err(WorldError::InvalidMap("map has no usable lines".into()));
        }

        let root = SuperBlockmap::root();
        for index in 0..state.hedges.len() {
            state
                .blockmap
                .push(root, &mut state.hedges, HEdgeId(index as u32));
        }
        debug!(
            hedges = state.hedges.len(),
            bounds = ?state.blockmap.bounds(root),
            "Half-edges created"
        );

        let root_child = state.partition(root, 0)?;
        let new_vertices = state.vertices.len() - map.vertices().len();
        let (mut tree, vertices) = state.finish(root_child)?;
        tree.link_polyobjs(map);

        info!(
            nodes = tree.node_count(),
            leaves = tree.leaf_count(),
            segments = tree.segment_count(),
            new_vertices,
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "BSP built"
        );
        Ok(BspOutput { tree, vertices })
    }
}

/// Working state of one build.
pub(super) struct BuildState<'a> {
    pub(super) map: &'a Map,
    pub(super) config: &'a BspConfig,
    pub(super) vertices: Vec<DVec2>,
    pub(super) tips: Vec<WallTips>,
    pub(super) hedges: Vec<HEdge>,
    pub(super) blockmap: SuperBlockmap,
    pub(super) leaves: Vec<Vec<HEdgeId>>,
    pub(super) nodes: Vec<BspNode>,
    /// Lines already tried as partitions in the current step.
    pub(super) tried: ValidCount,
}

impl<'a> BuildState<'a> {
    fn new(map: &'a Map, config: &'a BspConfig) -> Self {
        Self {
            map,
            config,
            vertices: map.vertices().to_vec(),
            tips: vec![WallTips::new(); map.vertices().len()],
            hedges: Vec::with_capacity(map.line_count() * 2),
            blockmap: SuperBlockmap::new(root_bounds(map.bounds())),
            leaves: Vec::new(),
            nodes: Vec::new(),
            tried: ValidCount::new(map.line_count()),
        }
    }

    fn create_hedges(&mut self) -> Result<()> {
        let map = self.map;
        let windows = if self.config.detect_window_effects {
            find_window_effects(map)
        } else {
            vec![None; map.line_count()]
        };

        for (index, line) in map.lines().iter().enumerate() {
            let id = LineId::from(index);
            if line.polyobj.is_some() || is_zero_length(map, id) {
                continue;
            }

            let front = match (line.front, line.back) {
                (None, None) => return Err(WorldError::UnsectoredLine(id)),
                (None, Some(_)) => {
                    warn!(line = %id, "Line has no front side, skipping");
                    continue;
                }
                (Some(front), _) => front,
            };

            let (a, b) = map.line_points(id);
            let front_id = self.add_hedge(line.from, line.to, Some(id), LineSide::Front, Some(front));

            let back_sector = line.back.or(windows[index]);
            if let Some(back) = back_sector {
                let real_back = line.back.map(|_| id);
                let back_id = self.add_hedge(line.to, line.from, real_back, LineSide::Back, Some(back));
                self.hedges[back_id.index()].source_line = Some(id);
                self.hedges[front_id.index()].twin = Some(back_id);
                self.hedges[back_id.index()].twin = Some(front_id);
            }

            add_wall_tip(&mut self.tips[line.from.index()], b - a, back_sector, Some(front));
            add_wall_tip(&mut self.tips[line.to.index()], a - b, Some(front), back_sector);
        }
        Ok(())
    }

    fn add_hedge(
        &mut self,
        from: VertexId,
        to: VertexId,
        line: Option<LineId>,
        side: LineSide,
        sector: Option<SectorId>,
    ) -> HEdgeId {
        let id = HEdgeId(self.hedges.len() as u32);
        let mut hedge = HEdge::new(from, to, self.vertices[from.index()], self.vertices[to.index()]);
        hedge.line = line;
        hedge.source_line = line;
        hedge.side = side;
        hedge.sector = sector;
        self.hedges.push(hedge);
        id
    }

    /// Recursively partition the half-edges below `block`.
    fn partition(&mut self, block: BlockId, depth: usize) -> Result<BspChild> {
        if depth > self.config.max_depth {
            return Err(WorldError::DepthExceeded(self.config.max_depth));
        }

        let Some(part) = self.choose_partition(block) else {
            return Ok(self.make_leaf(block));
        };

        let bounds = self.blockmap.bounds(block);
        let right = self.blockmap.add_root(bounds);
        let left = self.blockmap.add_root(bounds);

        let cuts = self.separate(block, &part, right, left);
        self.add_minihedges(&part, cuts, right, left);

        if self.blockmap.total_count(right) == 0 || self.blockmap.total_count(left) == 0 {
            return Err(WorldError::NoProgress { depth });
        }

        let bounds = [
            self.blockmap.find_hedge_bounds(right, &self.hedges),
            self.blockmap.find_hedge_bounds(left, &self.hedges),
        ];
        let front = self.partition(right, depth + 1)?;
        let back = self.partition(left, depth + 1)?;

        let index = self.nodes.len() as u32;
        self.nodes.push(BspNode {
            partition: part.div_line(),
            bounds,
            children: [front, back],
        });
        Ok(BspChild::Node(index))
    }

    fn make_leaf(&mut self, block: BlockId) -> BspChild {
        let index = self.leaves.len() as u32;
        let ids = self.blockmap.take_all(block, &mut self.hedges);
        for id in &ids {
            self.hedges[id.index()].placement = Placement::Leaf(index);
        }
        self.leaves.push(ids);
        BspChild::Leaf(index)
    }

    /// Order each leaf clockwise and flatten everything into a tree.
    fn finish(mut self, root: BspChild) -> Result<(BspTree, Vec<DVec2>)> {
        let mut segment_of = vec![u32::MAX; self.hedges.len()];
        let mut segments = Vec::with_capacity(self.hedges.len());
        let mut leaves = Vec::with_capacity(self.leaves.len());

        for (index, ids) in std::mem::take(&mut self.leaves).into_iter().enumerate() {
            let leaf_index = index as u32;
            let (ordered, center) = self.clockwise(ids);

            let sector = ordered
                .iter()
                .map(|id| &self.hedges[id.index()])
                .find(|h| !h.is_mini())
                .or_else(|| ordered.iter().map(|id| &self.hedges[id.index()]).find(|h| h.sector.is_some()))
                .and_then(|h| h.sector)
                .ok_or(WorldError::SectorlessLeaf(leaf_index))?;

            let first_segment = segments.len() as u32;
            for id in &ordered {
                let hedge = &self.hedges[id.index()];
                segment_of[id.index()] = segments.len() as u32;
                segments.push(Segment {
                    from: hedge.from,
                    to: hedge.to,
                    line: hedge.line,
                    side: hedge.side,
                    sector: hedge.sector,
                    twin: None,
                    leaf: leaf_index,
                    offset: self.offset_of(hedge),
                });
            }

            leaves.push(BspLeaf {
                sector,
                first_segment,
                segment_count: ordered.len() as u32,
                polyobjs: SmallVec::new(),
                center,
            });
        }

        for (index, hedge) in self.hedges.iter().enumerate() {
            let seg = segment_of[index];
            if seg == u32::MAX {
                continue;
            }
            segments[seg as usize].twin = hedge
                .twin
                .map(|t| segment_of[t.index()])
                .filter(|&t| t != u32::MAX);
        }

        let tree = BspTree::from_parts(self.nodes, leaves, segments, root);
        Ok((tree, self.vertices))
    }

    /// Sort a leaf's half-edges clockwise around their midpoint, starting
    /// with a real one whose line is not self-referencing when possible.
    fn clockwise(&self, mut ids: Vec<HEdgeId>) -> (Vec<HEdgeId>, DVec2) {
        let mut sum = DVec2::ZERO;
        for id in &ids {
            let h = &self.hedges[id.index()];
            sum += h.start + h.end;
        }
        let center = if ids.is_empty() {
            DVec2::ZERO
        } else {
            sum / (ids.len() as f64 * 2.0)
        };

        ids.sort_by(|a, b| {
            let a = angle_of(self.hedges[a.index()].start - center);
            let b = angle_of(self.hedges[b.index()].start - center);
            b.total_cmp(&a)
        });

        let first = ids
            .iter()
            .position(|id| {
                self.hedges[id.index()]
                    .line
                    .is_some_and(|line| !self.map.line(line).is_self_referencing())
            })
            .or_else(|| ids.iter().position(|id| !self.hedges[id.index()].is_mini()));
        if let Some(first) = first {
            ids.rotate_left(first);
        }
        (ids, center)
    }

    fn offset_of(&self, hedge: &HEdge) -> f64 {
        let Some(line) = hedge.line else {
            return 0.0;
        };
        let line = self.map.line(line);
        let origin = match hedge.side {
            LineSide::Front => self.map.vertex(line.from),
            LineSide::Back => self.map.vertex(line.to),
        };
        origin.distance(hedge.start)
    }
}

fn is_zero_length(map: &Map, id: LineId) -> bool {
    map.line_length(id) < DIST_EPSILON
}

/// Root box of the spatial index: the map bounds aligned down to 8 units
/// and grown to a square power-of-two number of blockmap cells.
fn root_bounds(bounds: Aabb2) -> Aabb2 {
    if bounds.is_empty() {
        return Aabb2::new(DVec2::ZERO, DVec2::splat(MAPBLOCK_UNITS));
    }
    let min = (bounds.min / 8.0).floor() * 8.0;
    let cells = ((bounds.max - min) / MAPBLOCK_UNITS).floor() + DVec2::ONE;
    let size = (cells.x.max(cells.y) as u64).next_power_of_two() as f64 * MAPBLOCK_UNITS;
    Aabb2::new(min, min + DVec2::splat(size))
}

/// Find one-sided lines that have open space behind them.
///
/// A ray is cast from the middle of each one-sided line along the axis most
/// perpendicular to it. When the nearest wall hit in front faces the line's
/// own sector and the nearest wall hit behind faces an open sector, the line
/// is a see-through window onto that sector.
fn find_window_effects(map: &Map) -> Vec<Option<SectorId>> {
    let mut windows = vec![None; map.line_count()];

    for (index, line) in map.lines().iter().enumerate() {
        let id = LineId::from(index);
        let Some(front) = line.front else { continue };
        if line.back.is_some() || line.polyobj.is_some() || is_zero_length(map, id) {
            continue;
        }

        let (a, b) = map.line_points(id);
        let mid = (a + b) * 0.5;
        let d = b - a;
        let cast_horizontal = d.x.abs() < d.y.abs();

        let mut front_hit: Option<(f64, Option<SectorId>)> = None;
        let mut back_hit: Option<(f64, Option<SectorId>)> = None;

        for (other_index, other) in map.lines().iter().enumerate() {
            let other_id = LineId::from(other_index);
            if other_index == index || other.polyobj.is_some() || is_zero_length(map, other_id) {
                continue;
            }
            let (oa, ob) = map.line_points(other_id);
            let od = ob - oa;

            let (dist, is_front, facing_front) = if cast_horizontal {
                if od.y.abs() < DIST_EPSILON
                    || oa.y.max(ob.y) < mid.y - DIST_EPSILON
                    || oa.y.min(ob.y) > mid.y + DIST_EPSILON
                {
                    continue;
                }
                let dist = (oa.x + (mid.y - oa.y) * od.x / od.y) - mid.x;
                let is_front = (d.y > 0.0) == (dist > 0.0);
                let facing_front = (d.y > 0.0) ^ (od.y > 0.0) ^ !is_front;
                (dist.abs(), is_front, facing_front)
            } else {
                if od.x.abs() < DIST_EPSILON
                    || oa.x.max(ob.x) < mid.x - DIST_EPSILON
                    || oa.x.min(ob.x) > mid.x + DIST_EPSILON
                {
                    continue;
                }
                let dist = (oa.y + (mid.x - oa.x) * od.y / od.x) - mid.y;
                let is_front = (d.x > 0.0) != (dist > 0.0);
                let facing_front = (d.x > 0.0) ^ (od.x > 0.0) ^ !is_front;
                (dist.abs(), is_front, facing_front)
            };

            if dist < DIST_EPSILON {
                continue;
            }
            let hit_sector = if facing_front { other.front } else { other.back };
            let slot = if is_front {
                &mut front_hit
            } else {
                &mut back_hit
            };
            if slot.map_or(true, |(best, _)| dist < best) {
                *slot = Some((dist, hit_sector));
            }
        }

        if let (Some((_, Some(front_open))), Some((_, Some(back_open)))) = (front_hit, back_hit) {
            if front_open == front {
                warn!(line = %id, back = %back_open, "Line seems to be a one-sided window");
                windows[index] = Some(back_open);
            }
        }
    }

    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::MapBuilder;

    fn square(b: &mut MapBuilder, x: f64, y: f64, size: f64, sector: SectorId) -> Vec<LineId> {
        b.room(
            &[(x, y), (x, y + size), (x + size, y + size), (x + size, y)],
            sector,
        )
    }

    #[test]
    fn root_box_is_power_of_two_cells() {
        let bounds = Aabb2::new(DVec2::new(-13.0, 5.0), DVec2::new(300.0, 100.0));
        let root = root_bounds(bounds);
        assert_eq!(root.min, DVec2::new(-16.0, 0.0));
        assert_eq!(root.width(), 512.0);
        assert_eq!(root.height(), 512.0);
    }

    #[test]
    fn square_room_is_one_leaf() {
        let mut b = MapBuilder::new();
        let s = b.sector(0.0, 128.0);
        square(&mut b, 0.0, 0.0, 256.0, s);
        let map = b.build().unwrap();

        let out = BspBuilder::default().build(&map).unwrap();
        assert_eq!(out.tree.leaf_count(), 1);
        assert_eq!(out.tree.node_count(), 0);
        assert_eq!(out.tree.segment_count(), 4);
        assert_eq!(out.tree.root(), BspChild::Leaf(0));
        assert_eq!(out.vertices.len(), 4);
    }

    #[test]
    fn leaf_segments_run_clockwise() {
        let mut b = MapBuilder::new();
        let s = b.sector(0.0, 128.0);
        square(&mut b, 0.0, 0.0, 256.0, s);
        let map = b.build().unwrap();
        let out = BspBuilder::default().build(&map).unwrap();

        let segs = out.tree.segments_of(0);
        for pair in segs.windows(2) {
            assert_eq!(pair[0].to, pair[1].from);
        }
        assert_eq!(segs.last().unwrap().to, segs[0].from);
    }

    #[test]
    fn l_shape_splits_into_two_leaves() {
        let mut b = MapBuilder::new();
        let s = b.sector(0.0, 128.0);
        b.room(
            &[
                (0.0, 0.0),
                (0.0, 256.0),
                (128.0, 256.0),
                (128.0, 128.0),
                (256.0, 128.0),
                (256.0, 0.0),
            ],
            s,
        );
        let map = b.build().unwrap();

        let out = BspBuilder::default().build(&map).unwrap();
        assert_eq!(out.tree.leaf_count(), 2);
        assert_eq!(out.tree.node_count(), 1);
        assert_eq!(out.vertices.len(), 7);
        // Each leaf has one mini segment closing the cut.
        for leaf in 0..2 {
            let minis = out.tree.segments_of(leaf).iter().filter(|s| s.line.is_none()).count();
            assert_eq!(minis, 1);
        }
    }

    #[test]
    fn unsectored_line_fails() {
        let mut b = MapBuilder::new();
        let s = b.sector(0.0, 128.0);
        square(&mut b, 0.0, 0.0, 256.0, s);
        let v1 = b.vertex(64.0, 64.0);
        let v2 = b.vertex(96.0, 64.0);
        let bad = b.line(v1, v2, None, None);
        let map = b.build().unwrap();

        let err = BspBuilder::default().build(&map).unwrap_err();
        assert!(matches!(err, WorldError::UnsectoredLine(id) if id == bad));
    }

    #[test]
    fn backless_line_is_skipped() {
        let mut b = MapBuilder::new();
        let s = b.sector(0.0, 128.0);
        square(&mut b, 0.0, 0.0, 256.0, s);
        let v1 = b.vertex(300.0, 300.0);
        let v2 = b.vertex(300.0, 400.0);
        b.line(v1, v2, None, Some(s));
        let map = b.build().unwrap();

        let out = BspBuilder::default().build(&map).unwrap();
        assert_eq!(out.tree.segment_count(), 4);
    }

    #[test]
    fn depth_limit_is_enforced() {
        let mut b = MapBuilder::new();
        let s = b.sector(0.0, 128.0);
        b.room(
            &[
                (0.0, 0.0),
                (0.0, 256.0),
                (128.0, 256.0),
                (128.0, 128.0),
                (256.0, 128.0),
                (256.0, 0.0),
            ],
            s,
        );
        let map = b.build().unwrap();

        let builder = BspBuilder::new(BspConfig::default().with_max_depth(0));
        assert!(matches!(builder.build(&map), Err(WorldError::DepthExceeded(0))));
    }

    #[test]
    fn empty_map_is_rejected() {
        let map = MapBuilder::new().build().unwrap();
        assert!(matches!(
            BspBuilder::default().build(&map),
            Err(WorldError::InvalidMap(_))
        ));
    }
}
