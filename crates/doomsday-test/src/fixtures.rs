//! Synthetic maps.
//!
//! Every fixture winds its walls clockwise so sectors lie on the right of
//! their lines. Fixtures are known-good, so they panic on build failure.

use doomsday_core::SectorId;
use doomsday_world::{BspBuilder, BspTree, Map, MapBuilder};
use glam::DVec2;

/// Side of one cell of [`room_grid`].
pub const GRID_CELL: f64 = 128.0;

fn finish(builder: MapBuilder) -> Map {
    builder.build().expect("fixture map is valid")
}

/// A single square room with its corner at the origin.
pub fn square_room(size: f64) -> Map {
    let mut b = MapBuilder::new();
    let s = b.sector(0.0, 128.0);
    b.room(&[(0.0, 0.0), (0.0, size), (size, size), (size, 0.0)], s);
    finish(b)
}

/// An L-shaped room: 256×256 with the top right 128×128 quarter missing.
pub fn l_shape() -> Map {
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
    finish(b)
}

/// Two 256×256 rooms joined through a 16 unit deep door sector.
///
/// Sectors: 0 west room, 1 door, 2 east room. A closed door has its
/// ceiling on the floor.
pub fn door_rooms(door_open: bool) -> Map {
    let mut b = MapBuilder::new();
    let west = b.sector(0.0, 128.0);
    let door = b.sector(0.0, if door_open { 128.0 } else { 0.0 });
    let east = b.sector(0.0, 128.0);

    let w0 = b.vertex(0.0, 0.0);
    let w1 = b.vertex(0.0, 256.0);
    let d0 = b.vertex(256.0, 256.0);
    let d1 = b.vertex(256.0, 0.0);
    let e0 = b.vertex(272.0, 256.0);
    let e1 = b.vertex(272.0, 0.0);
    let x0 = b.vertex(528.0, 256.0);
    let x1 = b.vertex(528.0, 0.0);

    b.line(w0, w1, Some(west), None);
    b.line(w1, d0, Some(west), None);
    b.line(d0, d1, Some(west), Some(door));
    b.line(d1, w0, Some(west), None);

    b.line(d0, e0, Some(door), None);
    b.line(e0, e1, Some(door), Some(east));
    b.line(e1, d1, Some(door), None);

    b.line(e0, x0, Some(east), None);
    b.line(x0, x1, Some(east), None);
    b.line(x1, e1, Some(east), None);
    finish(b)
}

/// An `n`×`n` grid of [`GRID_CELL`] rooms, each its own sector, with
/// two-sided lines between neighbours.
///
/// Floors step by 8 units in a repeating pattern; cell `(i, j)` is sector
/// `j * n + i`.
pub fn room_grid(n: usize) -> Map {
    assert!(n > 0, "grid needs at least one cell");
    let mut b = MapBuilder::new();
    for j in 0..n {
        for i in 0..n {
            b.sector(((i + 2 * j) % 3) as f64 * 8.0, 128.0);
        }
    }
    let cell = |i: usize, j: usize| SectorId::from(j * n + i);

    let mut verts = Vec::with_capacity((n + 1) * (n + 1));
    for j in 0..=n {
        for i in 0..=n {
            verts.push(b.vertex(i as f64 * GRID_CELL, j as f64 * GRID_CELL));
        }
    }
    let v = |i: usize, j: usize| verts[j * (n + 1) + i];

    // Vertical edges: going up, the cell to the east is on the right.
    for i in 0..=n {
        for j in 0..n {
            let east = (i < n).then(|| cell(i, j));
            let west = (i > 0).then(|| cell(i - 1, j));
            match east {
                Some(front) => b.line(v(i, j), v(i, j + 1), Some(front), west),
                None => b.line(v(i, j + 1), v(i, j), west, None),
            };
        }
    }
    // Horizontal edges: going east, the cell to the south is on the right.
    for j in 0..=n {
        for i in 0..n {
            let south = (j > 0).then(|| cell(i, j - 1));
            let north = (j < n).then(|| cell(i, j));
            match south {
                Some(front) => b.line(v(i, j), v(i + 1, j), Some(front), north),
                None => b.line(v(i + 1, j), v(i, j), north, None),
            };
        }
    }
    finish(b)
}

/// Two 256×256 rooms side by side where only the west room draws the
/// shared wall, as a one-sided line.
///
/// Sectors: 0 west, 1 east. Line 2 is the shared wall; the east room has
/// no line of its own there, so it only closes through the window.
pub fn window_rooms() -> Map {
    let mut b = MapBuilder::new();
    let west = b.sector(0.0, 128.0);
    let east = b.sector(0.0, 128.0);

    let w0 = b.vertex(0.0, 0.0);
    let w1 = b.vertex(0.0, 256.0);
    let m1 = b.vertex(256.0, 256.0);
    let m0 = b.vertex(256.0, 0.0);
    let e1 = b.vertex(512.0, 256.0);
    let e0 = b.vertex(512.0, 0.0);

    b.line(w0, w1, Some(west), None);
    b.line(w1, m1, Some(west), None);
    b.line(m1, m0, Some(west), None);
    b.line(m0, w0, Some(west), None);

    b.line(m1, e1, Some(east), None);
    b.line(e1, e0, Some(east), None);
    b.line(e0, m0, Some(east), None);
    finish(b)
}

/// A 512×512 room around a diamond sector that holds a 64×64 square
/// sector at its centre.
///
/// Sectors: 0 room, 1 square, 2 diamond. Lines 4..8 are the diamond's
/// two-sided edges. Every partition along a square edge crosses the
/// diamond, so some of its two-sided lines must be split.
pub fn nested_diamond() -> Map {
    let mut b = MapBuilder::new();
    let room = b.sector(0.0, 128.0);
    let square = b.sector(16.0, 112.0);
    let diamond = b.sector(8.0, 120.0);

    b.room(&[(0.0, 0.0), (0.0, 512.0), (512.0, 512.0), (512.0, 0.0)], room);
    ring(&mut b, &[(256.0, 64.0), (64.0, 256.0), (256.0, 448.0), (448.0, 256.0)], diamond, room);
    ring(
        &mut b,
        &[(224.0, 224.0), (224.0, 288.0), (288.0, 288.0), (288.0, 224.0)],
        square,
        diamond,
    );
    finish(b)
}

/// Closed clockwise loop of two-sided lines.
fn ring(b: &mut MapBuilder, points: &[(f64, f64)], inside: SectorId, outside: SectorId) {
    let verts: Vec<_> = points.iter().map(|&(x, y)| b.vertex(x, y)).collect();
    for (i, &from) in verts.iter().enumerate() {
        let to = verts[(i + 1) % verts.len()];
        b.line(from, to, Some(inside), Some(outside));
    }
}

/// A 512×512 room holding a 32×32 polyobj centred at (256, 256).
pub fn polyobj_room() -> Map {
    let mut b = MapBuilder::new();
    let s = b.sector(0.0, 128.0);
    b.room(&[(0.0, 0.0), (0.0, 512.0), (512.0, 512.0), (512.0, 0.0)], s);
    // Wound the other way so the room is on the right of each edge.
    let lines = b.room(
        &[(240.0, 240.0), (272.0, 240.0), (272.0, 272.0), (240.0, 272.0)],
        s,
    );
    b.polyobj(DVec2::new(256.0, 256.0), lines);
    finish(b)
}

/// Build a BSP tree with the default configuration.
pub fn build_tree(map: &Map) -> BspTree {
    BspBuilder::default()
        .build(map)
        .expect("fixture map builds")
        .tree
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_lines_are_shared() {
        let map = room_grid(3);
        // 2·n·(n+1) edges, of which 2·n·(n−1) are interior.
        assert_eq!(map.line_count(), 24);
        let two_sided = map.lines().iter().filter(|l| l.is_two_sided()).count();
        assert_eq!(two_sided, 12);
        assert!(map.lines().iter().all(|l| l.front.is_some()));
    }

    #[test]
    fn window_wall_is_one_sided() {
        let map = window_rooms();
        assert_eq!(map.line_count(), 7);
        let wall = map.line(doomsday_core::LineId(2));
        assert_eq!((wall.front, wall.back), (Some(SectorId(0)), None));
    }

    #[test]
    fn nested_diamond_edges_are_two_sided() {
        let map = nested_diamond();
        assert_eq!(map.line_count(), 12);
        assert_eq!(map.lines().iter().filter(|l| l.is_two_sided()).count(), 8);
        for index in 4..8 {
            let line = map.line(doomsday_core::LineId(index));
            assert_eq!((line.front, line.back), (Some(SectorId(2)), Some(SectorId(0))));
        }
    }

    #[test]
    fn door_rooms_have_three_sectors() {
        let map = door_rooms(false);
        assert_eq!(map.sector_count(), 3);
        assert_eq!(map.sector(SectorId(1)).ceiling_height, 0.0);
    }
}
