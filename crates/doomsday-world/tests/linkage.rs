//! World linkage against BSP-located sectors.

use doomsday_core::{LineId, SectorId};
use doomsday_test::{build_tree, door_rooms, room_grid, square_room, GRID_CELL};
use doomsday_world::{
    BspTree, LinkFlags, LinkState, LinkageConfig, Map, MobjId, MobjSpawn, WorldLinkage,
};
use glam::{DVec2, DVec3};

const ALL: LinkFlags = LinkFlags::SECTOR.union(LinkFlags::BLOCKMAP);

struct World {
    map: Map,
    tree: BspTree,
    linkage: WorldLinkage,
}

impl World {
    fn new(map: Map) -> Self {
        let tree = build_tree(&map);
        let linkage = WorldLinkage::new(&map, LinkageConfig::default()).unwrap();
        Self { map, tree, linkage }
    }

    fn spawn(&mut self, x: f64, y: f64, radius: f64) -> MobjId {
        let id = self
            .linkage
            .spawn(MobjSpawn::new(DVec3::new(x, y, 0.0), radius, 56.0));
        self.linkage.link(&self.map, &self.tree, id, ALL).unwrap();
        id
    }

    fn lines_of(&mut self, id: MobjId) -> Vec<LineId> {
        let mut lines = Vec::new();
        self.linkage
            .lines_touching(id, |_, line| {
                lines.push(line);
                true
            })
            .unwrap();
        lines.sort();
        lines
    }
}

#[test]
fn mobj_at_grid_corner_touches_four_lines_and_sectors() {
    let mut world = World::new(room_grid(3));
    let id = world.spawn(GRID_CELL, GRID_CELL, 16.0);

    assert_eq!(world.linkage.mobj_line_count(id), 4);
    let lines = world.lines_of(id);
    assert!(lines.iter().all(|&l| world.map.line(l).is_two_sided()));

    let mut sectors = Vec::new();
    world
        .linkage
        .sectors_touching(id, |_, s| {
            sectors.push(s);
            true
        })
        .unwrap();
    sectors.sort();
    assert_eq!(
        sectors,
        vec![SectorId(0), SectorId(1), SectorId(3), SectorId(4)]
    );
}

#[test]
fn line_membership_is_mutual() {
    let mut world = World::new(room_grid(3));
    let ids: Vec<MobjId> = [(120.0, 64.0), (128.0, 128.0), (250.0, 260.0), (64.0, 64.0)]
        .into_iter()
        .map(|(x, y)| world.spawn(x, y, 20.0))
        .collect();

    for &id in &ids {
        for line in world.lines_of(id) {
            let mut found = false;
            world
                .linkage
                .mobjs_touching_line(line, |_, m| {
                    found |= m == id;
                    true
                })
                .unwrap();
            assert!(found, "{id} missing from {line}");
        }
    }
    let total_lines: usize = ids.iter().map(|&id| world.linkage.mobj_line_count(id)).sum();
    let total_mobjs: usize = (0..world.map.line_count())
        .map(|l| world.linkage.line_mobj_count(LineId::from(l)))
        .sum();
    assert_eq!(total_lines, total_mobjs);
}

#[test]
fn moving_and_relinking_changes_sector() {
    let mut world = World::new(door_rooms(true));
    let id = world.spawn(128.0, 128.0, 16.0);
    assert_eq!(world.linkage.mobj(id).unwrap().sector, Some(SectorId(0)));

    world
        .linkage
        .set_origin(id, DVec3::new(400.0, 128.0, 0.0))
        .unwrap();
    // Nothing changes until the mobj is relinked.
    assert_eq!(world.linkage.mobj(id).unwrap().sector, Some(SectorId(0)));

    world.linkage.relink(&world.map, &world.tree, id).unwrap();
    assert_eq!(world.linkage.mobj(id).unwrap().sector, Some(SectorId(2)));

    let mut in_west = 0;
    world
        .linkage
        .mobjs_touching_sector(SectorId(0), |_, _| {
            in_west += 1;
            true
        })
        .unwrap();
    assert_eq!(in_west, 0);
}

#[test]
fn standing_in_a_doorway_links_both_door_lines() {
    let mut world = World::new(door_rooms(true));
    let id = world.spawn(264.0, 128.0, 16.0);
    assert_eq!(world.linkage.mobj(id).unwrap().sector, Some(SectorId(1)));
    assert_eq!(world.linkage.mobj_line_count(id), 2);
    assert_eq!(
        world.linkage.link_state(id).unwrap(),
        LinkState::SectorBlockmapLines
    );
}

#[test]
fn every_mobj_in_a_crowded_sector_is_visited() {
    let mut world = World::new(square_room(1024.0));
    let count = 3000;
    let ids: Vec<MobjId> = (0..count)
        .map(|i| {
            let x = 16.0 + (i % 60) as f64 * 16.0;
            let y = 16.0 + (i / 60) as f64 * 16.0;
            world.spawn(x, y, 8.0)
        })
        .collect();

    let mut seen = Vec::with_capacity(count);
    let completed = world
        .linkage
        .mobjs_touching_sector(SectorId(0), |linkage, id| {
            seen.push(id);
            // Despawning mid-iteration must not disturb the snapshot.
            linkage.despawn(id).unwrap();
            true
        })
        .unwrap();

    assert!(completed);
    assert_eq!(seen.len(), count);
    seen.sort();
    let mut expected = ids;
    expected.sort();
    assert_eq!(seen, expected);
    assert_eq!(world.linkage.mobj_count(), 0);
    assert!(world.linkage.blockmap().is_empty());
}

#[test]
fn despawn_reports_what_was_linked() {
    let mut world = World::new(room_grid(2));
    let id = world.spawn(GRID_CELL, 64.0, 16.0);
    assert_eq!(world.linkage.despawn(id).unwrap(), ALL);
    assert!(world.linkage.mobj(id).is_none());
    assert!(world.linkage.despawn(id).is_err());
    assert_eq!(world.linkage.line_mobj_count(LineId(1)), 0);
}

#[test]
fn grid_queries_find_nearby_mobjs() {
    let mut world = World::new(room_grid(4));
    let near = world.spawn(100.0, 100.0, 16.0);
    let far = world.spawn(450.0, 450.0, 16.0);

    let mut found = Vec::new();
    world.linkage.blockmap().for_each_in_box(
        doomsday_core::Aabb2::from_center(DVec2::new(96.0, 96.0), 32.0),
        |m| {
            found.push(m);
            true
        },
    );
    assert!(found.contains(&near));
    assert!(!found.contains(&far));
}
