//! Linkage of moving objects to sectors, lines and the coarse grid.
//!
//! Each mobj sits in at most one sector ring and in a line ring shared with
//! every two-sided line its box crosses. Memberships are only changed by
//! explicit [`WorldLinkage::link`] / [`WorldLinkage::unlink`] calls.

mod blockmap;
mod mobj;
pub mod node_pile;
mod world_linkage;

pub use blockmap::{LineBlockmap, MobjBlockmap, MobjGrid};
pub use mobj::{Mobj, MobjId, MobjSpawn};
pub use node_pile::{NodeIndex, NodePile};
pub use world_linkage::WorldLinkage;

use bitflags::bitflags;
use doomsday_core::constants::MAPBLOCK_UNITS;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Which memberships to (re)build on link, or which were removed on
    /// unlink.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct LinkFlags: u8 {
        /// Sector ring.
        const SECTOR   = 0x1;
        /// Coarse mobj grid.
        const BLOCKMAP = 0x2;
        /// Skip line rings on link; on unlink, the mobj had no line links.
        const NO_LINE  = 0x4;
    }
}

/// Observable linkage state of a mobj.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    Unlinked,
    SectorOnly,
    SectorAndLines,
    SectorBlockmapLines,
    /// Any other combination, as the flags `unlink` would report.
    Partial(LinkFlags),
}

/// Linkage configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkageConfig {
    /// Cell size of the line and mobj grids in map units.
    pub blockmap_cell_size: f64,
    /// Capacity hint for the mobj arena and node piles.
    pub expected_mobjs: usize,
}

impl Default for LinkageConfig {
    fn default() -> Self {
        Self {
            blockmap_cell_size: MAPBLOCK_UNITS,
            expected_mobjs: 1024,
        }
    }
}

impl LinkageConfig {
    #[must_use]
    pub fn with_cell_size(mut self, size: f64) -> Self {
        self.blockmap_cell_size = size;
        self
    }

    #[must_use]
    pub fn with_expected_mobjs(mut self, count: usize) -> Self {
        self.expected_mobjs = count;
        self
    }
}
