//! World error types.

use doomsday_core::{LineId, SectorId};
use thiserror::Error;

/// Errors raised while loading, partitioning, or linking a map.
#[derive(Error, Debug)]
pub enum WorldError {
    /// The map data references missing elements or is otherwise unusable.
    #[error("Invalid map: {0}")]
    InvalidMap(String),

    /// A line has no sector on either side.
    #[error("Line {0} has no sector on either side")]
    UnsectoredLine(LineId),

    /// A BSP leaf ended up without any sector.
    #[error("BSP leaf {0} has no sector")]
    SectorlessLeaf(u32),

    /// A partition step left one side empty.
    #[error("Partition step made no progress at depth {depth}")]
    NoProgress { depth: usize },

    /// Partitioning recursed deeper than allowed.
    #[error("BSP depth limit of {0} exceeded")]
    DepthExceeded(usize),

    /// The mobj id is stale or was never issued.
    #[error("Unknown mobj: {0}")]
    UnknownMobj(String),

    /// Sector index out of range.
    #[error("Unknown sector {0}")]
    UnknownSector(SectorId),

    /// Line index out of range.
    #[error("Unknown line {0}")]
    UnknownLine(LineId),

    /// Core error.
    #[error(transparent)]
    Core(#[from] doomsday_core::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, WorldError>;
