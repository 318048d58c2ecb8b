//! Structural invariants of the spatial index and of built BSP trees.

use doomsday_core::{Aabb2, DivLine, LineId, LineSide, PolyobjId, SectorId, VertexId};
use doomsday_test::{
    build_tree, door_rooms, l_shape, nested_diamond, polyobj_room, room_grid, window_rooms,
    GRID_CELL,
};
use doomsday_world::bsp::{BlockId, BspLeaf, HEdge, HEdgeId, Placement, SuperBlockmap};
use doomsday_world::{BspBuilder, BspConfig, BspOutput, Map};
use glam::DVec2;
use proptest::prelude::*;

// ── Spatial index ─────────────────────────────────────────────────────────

fn hedge_strategy() -> impl Strategy<Value = (DVec2, DVec2, bool)> {
    (0.0..2048.0f64, 0.0..2048.0f64, 0.0..2048.0f64, 0.0..2048.0f64, any::<bool>())
        .prop_map(|(x0, y0, x1, y1, mini)| (DVec2::new(x0, y0), DVec2::new(x1, y1), mini))
}

fn make_hedges(specs: &[(DVec2, DVec2, bool)]) -> Vec<HEdge> {
    specs
        .iter()
        .enumerate()
        .map(|(i, &(a, b, mini))| {
            let mut h = HEdge::new(VertexId::from(2 * i), VertexId::from(2 * i + 1), a, b);
            if !mini {
                h.line = Some(doomsday_core::LineId::from(i));
            }
            h
        })
        .collect()
}

/// Every hedge is listed by exactly the block its placement names.
fn assert_owned_once(map: &SuperBlockmap, hedges: &[HEdge]) {
    let mut owners = vec![Vec::new(); hedges.len()];
    map.visit(SuperBlockmap::root(), &mut |block, ids| {
        for id in ids {
            owners[id.index()].push(block);
        }
    });
    for (i, found) in owners.iter().enumerate() {
        assert_eq!(found.len(), 1, "hedge {i} owned by {found:?}");
        assert_eq!(hedges[i].placement, Placement::Block(found[0]));
    }
    let real = hedges.iter().filter(|h| !h.is_mini()).count();
    assert_eq!(map.real_count(SuperBlockmap::root()), real);
    assert_eq!(map.mini_count(SuperBlockmap::root()), hedges.len() - real);
}

fn root_box() -> Aabb2 {
    Aabb2::new(DVec2::ZERO, DVec2::splat(2048.0))
}

proptest! {
    #[test]
    fn pushed_hedges_have_one_owner(specs in proptest::collection::vec(hedge_strategy(), 1..64)) {
        let mut hedges = make_hedges(&specs);
        let mut map = SuperBlockmap::new(root_box());
        for i in 0..hedges.len() {
            map.push(SuperBlockmap::root(), &mut hedges, HEdgeId(i as u32));
        }
        assert_owned_once(&map, &hedges);
        prop_assert_eq!(map.collect(SuperBlockmap::root()).len(), hedges.len());
    }

    #[test]
    fn pop_then_push_keeps_ownership(
        specs in proptest::collection::vec(hedge_strategy(), 1..64),
        picks in proptest::collection::vec(any::<prop::sample::Index>(), 1..16),
    ) {
        let mut hedges = make_hedges(&specs);
        let mut map = SuperBlockmap::new(root_box());
        for i in 0..hedges.len() {
            map.push(SuperBlockmap::root(), &mut hedges, HEdgeId(i as u32));
        }

        for pick in picks {
            let id = HEdgeId(pick.index(hedges.len()) as u32);
            let Placement::Block(block) = hedges[id.index()].placement else {
                panic!("hedge {id:?} lost its block");
            };
            // Pop down to the chosen hedge, then put everything back.
            let mut popped = Vec::new();
            while let Some(top) = map.pop(block, &mut hedges) {
                popped.push(top);
                if top == id {
                    break;
                }
            }
            for top in popped.into_iter().rev() {
                map.push(SuperBlockmap::root(), &mut hedges, top);
            }
            assert_owned_once(&map, &hedges);
        }
    }

    #[test]
    fn leaves_are_small(specs in proptest::collection::vec(hedge_strategy(), 1..64)) {
        let mut hedges = make_hedges(&specs);
        let mut map = SuperBlockmap::new(root_box());
        for i in 0..hedges.len() {
            map.push(SuperBlockmap::root(), &mut hedges, HEdgeId(i as u32));
        }

        let mut blocks: Vec<BlockId> = Vec::new();
        map.visit(SuperBlockmap::root(), &mut |block, _| blocks.push(block));
        for block in blocks {
            let bounds = map.bounds(block);
            let small = bounds.width() <= 256.0 && bounds.height() <= 256.0;
            if map.is_leaf(block) {
                prop_assert!(small || map.total_count(block) == 0);
            }
            if small {
                continue;
            }
            // Above leaf size a block only keeps hedges crossing its midpoint.
            let mid = bounds.center();
            let wide = bounds.width() >= bounds.height();
            for id in map.hedges(block) {
                let h = &hedges[id.index()];
                let high = |p: DVec2| if wide { p.x >= mid.x } else { p.y >= mid.y };
                prop_assert_ne!(high(h.start), high(h.end));
            }
        }
    }
}

// ── Built trees ───────────────────────────────────────────────────────────

fn build(map: &Map) -> BspOutput {
    BspBuilder::default().build(map).expect("map builds")
}

fn assert_twins_symmetric(out: &BspOutput) {
    let segs = out.tree.segments();
    for (i, seg) in segs.iter().enumerate() {
        let Some(twin) = seg.twin else { continue };
        let other = &segs[twin as usize];
        assert_eq!(other.twin, Some(i as u32), "segment {i}");
        assert_eq!(other.line, seg.line, "segment {i}");
        assert_eq!((other.from, other.to), (seg.to, seg.from), "segment {i}");
    }
}

fn assert_leaves_convex(out: &BspOutput) {
    for leaf in 0..out.tree.leaf_count() as u32 {
        let segs = out.tree.segments_of(leaf);
        assert!(segs.len() >= 3, "leaf {leaf} has {} segments", segs.len());
        for seg in segs {
            let a = out.vertices[seg.from.index()];
            let b = out.vertices[seg.to.index()];
            let div = DivLine::from_points(a, b);
            for other in segs {
                for v in [other.from, other.to] {
                    let d = div.signed_distance(out.vertices[v.index()]);
                    assert!(d >= -0.01, "leaf {leaf} is not convex ({d})");
                }
            }
        }
    }
}

fn assert_chains_closed(out: &BspOutput) {
    for leaf in 0..out.tree.leaf_count() as u32 {
        let segs = out.tree.segments_of(leaf);
        for (i, seg) in segs.iter().enumerate() {
            let next = &segs[(i + 1) % segs.len()];
            assert_eq!(seg.to, next.from, "leaf {leaf} breaks after segment {i}");
        }
    }
}

#[test]
fn grid_builds_one_leaf_per_room() {
    for n in 1..=4 {
        let map = room_grid(n);
        let out = build(&map);
        assert_eq!(out.tree.leaf_count(), n * n, "grid {n}");
        assert_eq!(out.tree.node_count(), n * n - 1, "grid {n}");
        // Grid lines meet at vertices, so nothing is split.
        assert_eq!(out.vertices.len(), map.vertices().len(), "grid {n}");

        for j in 0..n {
            for i in 0..n {
                let center = DVec2::new(i as f64 + 0.5, j as f64 + 0.5) * GRID_CELL;
                assert_eq!(out.tree.sector_at(center), SectorId::from(j * n + i));
            }
        }
        assert_twins_symmetric(&out);
        assert_leaves_convex(&out);
        assert_chains_closed(&out);
    }
}

#[test]
fn l_shape_leaves_are_convex() {
    let out = build(&l_shape());
    assert_eq!(out.tree.leaf_count(), 2);
    assert_twins_symmetric(&out);
    assert_leaves_convex(&out);
    assert_chains_closed(&out);
}

#[test]
fn door_rooms_keep_sectors_apart() {
    let map = door_rooms(true);
    let out = build(&map);
    assert_eq!(out.tree.leaf_count(), 3);
    assert_eq!(out.tree.sector_at(DVec2::new(128.0, 128.0)), SectorId(0));
    assert_eq!(out.tree.sector_at(DVec2::new(264.0, 128.0)), SectorId(1));
    assert_eq!(out.tree.sector_at(DVec2::new(400.0, 128.0)), SectorId(2));
    assert_twins_symmetric(&out);
    assert_leaves_convex(&out);

    let mut seen = Vec::new();
    out.tree.visit_leaves(|_, leaf: &BspLeaf| seen.push(leaf.sector));
    seen.sort();
    assert_eq!(seen, vec![SectorId(0), SectorId(1), SectorId(2)]);
}

#[test]
fn one_sided_window_gets_a_back_segment() {
    let map = window_rooms();
    let wall = LineId(2);
    let out = build(&map);
    assert_eq!(out.tree.leaf_count(), 2);
    assert_eq!(out.tree.sector_at(DVec2::new(128.0, 128.0)), SectorId(0));
    assert_eq!(out.tree.sector_at(DVec2::new(384.0, 128.0)), SectorId(1));

    let segs = out.tree.segments();
    let front = segs
        .iter()
        .find(|s| s.line == Some(wall))
        .expect("wall has a segment");
    let back = &segs[front.twin.expect("window wall has a twin") as usize];
    assert_eq!(back.line, None);
    assert_eq!(back.side, LineSide::Back);
    assert_eq!(back.sector, Some(SectorId(1)));
    assert_eq!(out.tree.leaf(back.leaf).sector, SectorId(1));
    assert_twins_symmetric(&out);
    assert_leaves_convex(&out);
    assert_chains_closed(&out);
}

#[test]
fn window_detection_can_be_disabled() {
    let map = window_rooms();
    let wall = LineId(2);
    let out = BspBuilder::new(BspConfig::default().with_window_effects(false))
        .build(&map)
        .expect("map builds");
    let segs = out.tree.segments();
    let walls: Vec<_> = segs.iter().filter(|s| s.line == Some(wall)).collect();
    assert_eq!(walls.len(), 1);
    assert_eq!(walls[0].twin, None);
}

#[test]
fn split_two_sided_lines_keep_their_twins() {
    let map = nested_diamond();
    for factor in [1, 7, 20] {
        let out = BspBuilder::new(BspConfig::default().with_split_cost_factor(factor))
            .build(&map)
            .expect("map builds");
        assert!(out.vertices.len() > map.vertices().len(), "factor {factor}");

        // A split two-sided line has at least two pieces on each side.
        let segs = out.tree.segments();
        let split = (4..8).map(LineId).filter(|&line| {
            segs.iter().filter(|s| s.line == Some(line)).count() >= 4
        });
        assert!(split.count() > 0, "factor {factor}");

        for seg in segs.iter().filter(|s| s.line.is_some_and(|l| map.line(l).is_two_sided())) {
            assert!(seg.twin.is_some(), "factor {factor}");
        }
        assert_twins_symmetric(&out);
        assert_leaves_convex(&out);
        assert_chains_closed(&out);

        assert_eq!(out.tree.sector_at(DVec2::new(256.0, 256.0)), SectorId(1), "factor {factor}");
        assert_eq!(out.tree.sector_at(DVec2::new(256.0, 150.0)), SectorId(2), "factor {factor}");
        assert_eq!(out.tree.sector_at(DVec2::new(150.0, 256.0)), SectorId(2), "factor {factor}");
        assert_eq!(out.tree.sector_at(DVec2::new(32.0, 32.0)), SectorId(0), "factor {factor}");
        assert_eq!(out.tree.sector_at(DVec2::new(480.0, 480.0)), SectorId(0), "factor {factor}");
    }
}

#[test]
fn polyobj_lines_stay_out_of_the_tree() {
    let map = polyobj_room();
    let tree = build_tree(&map);
    assert_eq!(tree.leaf_count(), 1);
    assert_eq!(tree.segment_count(), 4);
    assert!(tree
        .segments()
        .iter()
        .all(|s| s.line.is_some_and(|l| map.line(l).polyobj.is_none())));
    assert_eq!(tree.leaf(0).polyobjs.as_slice(), &[PolyobjId(0)]);
}

#[test]
fn rebuilding_gives_the_same_tree() {
    let map = room_grid(3);
    let a = build(&map);
    let b = build(&map);
    assert_eq!(a.tree.nodes(), b.tree.nodes());
    assert_eq!(a.tree.segments(), b.tree.segments());
}
