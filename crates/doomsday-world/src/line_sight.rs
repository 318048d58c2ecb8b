//! Line of sight through the BSP tree.
//!
//! A trace runs from `from` to `to` in the map plane. Its vertical extent is
//! a wedge given by two slopes, expressed as height deltas over the whole
//! trace: the ray may reach `from.z + bottom_slope ..= from.z + top_slope` at
//! `to`. Every two-sided line crossed narrows the wedge to the line's
//! opening; the target is visible while the wedge stays non-empty.

use bitflags::bitflags;
use doomsday_core::{Aabb2, DivLine, LineId, LineSide};
use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::bsp::{BspChild, BspTree};
use crate::map::Map;
use crate::valid_count::ValidCount;

bitflags! {
    /// Relaxations of the crossing rules.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct SightFlags: u8 {
        /// One-sided lines don't block a trace starting behind them.
        const PASS_LEFT  = 0x1;
        /// Ignore floor steps.
        const PASS_OVER  = 0x2;
        /// Ignore ceiling steps.
        const PASS_UNDER = 0x4;
    }
}

/// Smallest intercept used when narrowing, for lines through the eye.
const MIN_FRAC: f64 = 1.0 / 65536.0;

/// A single line-of-sight query.
#[derive(Clone, Debug)]
pub struct LineSightTest {
    from: DVec3,
    to: DVec3,
    bottom_slope: f64,
    top_slope: f64,
    flags: SightFlags,
    trace: DivLine,
    bounds: Aabb2,
}

impl LineSightTest {
    pub fn new(
        from: DVec3,
        to: DVec3,
        bottom_slope: f64,
        top_slope: f64,
        flags: SightFlags,
    ) -> Self {
        let (a, b) = (from.truncate(), to.truncate());
        Self {
            from,
            to,
            bottom_slope,
            top_slope,
            flags,
            trace: DivLine::from_points(a, b),
            bounds: Aabb2::from_points(a, b),
        }
    }

    pub const fn from(&self) -> DVec3 {
        self.from
    }

    pub const fn to(&self) -> DVec3 {
        self.to
    }

    /// Current lower bound of the wedge.
    pub const fn bottom_slope(&self) -> f64 {
        self.bottom_slope
    }

    /// Current upper bound of the wedge.
    pub const fn top_slope(&self) -> f64 {
        self.top_slope
    }

    /// Run the trace. Returns true if nothing blocks it.
    ///
    /// `valid` must cover the map's lines; it starts a new generation so each
    /// line is tested at most once per trace.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn trace(&mut self, map: &Map, bsp: &BspTree, valid: &mut ValidCount) -> bool {
        if self.top_slope <= self.bottom_slope {
            return false;
        }
        valid.begin();
        self.cross_child(map, bsp, valid, bsp.root())
    }

    fn cross_child(
        &mut self,
        map: &Map,
        bsp: &BspTree,
        valid: &mut ValidCount,
        child: BspChild,
    ) -> bool {
        match child {
            BspChild::Leaf(leaf) => self.cross_leaf(map, bsp, valid, leaf),
            BspChild::Node(node) => {
                let node = bsp.node(node);
                let near = node.partition.point_on_side(self.trace.origin);
                let far = node.partition.point_on_side(self.to.truncate());

                if !self.cross_child(map, bsp, valid, node.children[near.index()]) {
                    return false;
                }
                if near == far {
                    return true;
                }
                self.cross_child(map, bsp, valid, node.children[far.index()])
            }
        }
    }

    fn cross_leaf(&mut self, map: &Map, bsp: &BspTree, valid: &mut ValidCount, leaf: u32) -> bool {
        for &po in &bsp.leaf(leaf).polyobjs {
            for &line in &map.polyobjs()[po.index()].lines {
                if !self.cross_line(map, valid, line) {
                    return false;
                }
            }
        }
        bsp.segments_of(leaf)
            .iter()
            .filter_map(|seg| seg.line)
            .all(|line| self.cross_line(map, valid, line))
    }

    /// Test one line against the trace. Returns false if it blocks.
    fn cross_line(&mut self, map: &Map, valid: &mut ValidCount, id: LineId) -> bool {
        if !valid.mark(id.index()) {
            return true;
        }
        if !map.line_bounds(id).intersects(&self.bounds) {
            return true;
        }

        let line_div = map.line_div(id);
        let from_side = line_div.point_on_side(self.from.truncate());
        if from_side == line_div.point_on_side(self.to.truncate()) {
            return true;
        }
        let (a, b) = map.line_points(id);
        if self.trace.point_on_side(a) == self.trace.point_on_side(b) {
            return true;
        }

        let line = map.line(id);
        let (Some(front), Some(back)) = (line.front, line.back) else {
            return self.flags.contains(SightFlags::PASS_LEFT)
                && from_side == LineSide::Back;
        };
        let front = map.sector(front);
        let back = map.sector(back);

        let floors_differ = front.floor_height != back.floor_height;
        let ceilings_differ = front.ceiling_height != back.ceiling_height;
        if !floors_differ && !ceilings_differ {
            return true;
        }

        let Some(opening) = map.line_opening(id) else {
            return false;
        };
        if opening.top <= opening.bottom {
            return false;
        }

        let frac = self.trace.intercept(&line_div).max(MIN_FRAC);
        if floors_differ && !self.flags.contains(SightFlags::PASS_OVER) {
            let slope = (opening.bottom - self.from.z) / frac;
            if slope > self.bottom_slope {
                self.bottom_slope = slope;
            }
        }
        if ceilings_differ && !self.flags.contains(SightFlags::PASS_UNDER) {
            let slope = (opening.top - self.from.z) / frac;
            if slope < self.top_slope {
                self.top_slope = slope;
            }
        }
        self.top_slope > self.bottom_slope
    }
}

/// Can an eye at `from` see any part of a thing standing at `to` that is
/// `height` tall.
pub fn check_sight(
    map: &Map,
    bsp: &BspTree,
    valid: &mut ValidCount,
    from: DVec3,
    to: DVec3,
    height: f64,
) -> bool {
    let bottom = to.z - from.z;
    LineSightTest::new(from, to, bottom, bottom + height, SightFlags::empty())
        .trace(map, bsp, valid)
}
