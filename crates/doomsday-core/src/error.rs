//! Error types for the engine.

use thiserror::Error;

/// Engine-wide error type.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum Error {
    /// A grid cell size that is not a positive finite number.
    #[error("Invalid grid cell size: {0}")]
    InvalidCellSize(f64),

    /// A grid with more cells than can be addressed.
    #[error("Grid of {columns}x{rows} cells exceeds the limit of {limit}")]
    GridTooLarge { columns: f64, rows: f64, limit: usize },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
