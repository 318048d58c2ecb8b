//! Map world for the Doomsday engine.
//!
//! - [`map`]: the parsed map geometry handed over by the level loader
//! - [`bsp`]: the spatial index and BSP builder run once per map load
//! - [`linkage`]: per-tic linkage of moving objects to sectors and lines
//! - [`line_sight`]: line-of-sight traces through the built BSP tree

pub mod bsp;
pub mod error;
pub mod line_sight;
pub mod linkage;
pub mod map;
pub mod valid_count;

pub use bsp::{BspBuilder, BspChild, BspConfig, BspOutput, BspTree, SectorLocator};
pub use error::{Result, WorldError};
pub use line_sight::{check_sight, LineSightTest, SightFlags};
pub use linkage::{
    LinkFlags, LinkState, LinkageConfig, Mobj, MobjBlockmap, MobjGrid, MobjId, MobjSpawn,
    WorldLinkage,
};
pub use map::{Line, LineFlags, LineOpening, Map, MapBuilder, Polyobj, Sector};
pub use valid_count::ValidCount;
