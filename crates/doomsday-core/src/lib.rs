//! Core types, math, and traits for the Doomsday engine.
//!
//! This crate provides the foundational types used throughout the engine:
//! - Map element ids (vertices, lines, sectors, polyobjs)
//! - 2D map-space math: bounding boxes, dividing lines, side tests
//! - Engine-wide constants and the common error type

pub mod error;
pub mod math;
pub mod types;

pub use error::{Error, Result};
pub use math::{check_cell_size, grid_dimensions, Aabb2, BoxSide, DivLine};
pub use types::{LineId, LineSide, PolyobjId, SectorId, VertexId};

/// Engine-wide constants
pub mod constants {
    /// Size of one blockmap cell in map units.
    pub const MAPBLOCK_UNITS: f64 = 128.0;
    /// A spatial-index block is a leaf once both sides are at most this long.
    pub const SUPERBLOCK_LEAF_SIZE: f64 = 256.0;
    /// Number of texture names the GL thread keeps pre-generated.
    pub const RESERVED_TEXTURE_NAMES: usize = 512;
    /// Largest cell count a coarse map grid may have.
    pub const MAX_GRID_CELLS: usize = 1 << 24;
}
