//! BSP construction.
//!
//! [`BspBuilder`] turns the map's lines into half-edges, feeds them through
//! the [`SuperBlockmap`] spatial index and recursively partitions them until
//! every leaf is convex.

mod builder;
mod hedge;
mod partitioner;
pub mod superblockmap;
mod tree;

pub use builder::{BspBuilder, BspOutput};
pub use hedge::{HEdge, HEdgeId, Placement};
pub use superblockmap::{BlockId, SuperBlockmap};
pub use tree::{BspChild, BspLeaf, BspNode, BspTree, Segment};

use doomsday_core::SectorId;
use glam::DVec2;
use serde::{Deserialize, Serialize};

/// BSP build configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BspConfig {
    /// Weight of split and near-miss penalties against balance. Higher
    /// values spend more effort avoiding splits.
    pub split_cost_factor: i32,
    /// Recursion limit; exceeding it fails the build.
    pub max_depth: usize,
    /// Give one-sided "window" lines a back mini-hedge.
    pub detect_window_effects: bool,
}

impl Default for BspConfig {
    fn default() -> Self {
        Self {
            split_cost_factor: 7,
            max_depth: 512,
            detect_window_effects: true,
        }
    }
}

impl BspConfig {
    /// Set the split cost factor.
    #[must_use]
    pub const fn with_split_cost_factor(mut self, factor: i32) -> Self {
        self.split_cost_factor = factor;
        self
    }

    /// Set the recursion limit.
    #[must_use]
    pub const fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Enable or disable window-effect detection.
    #[must_use]
    pub const fn with_window_effects(mut self, enabled: bool) -> Self {
        self.detect_window_effects = enabled;
        self
    }
}

/// Answers "which sector is this point in".
pub trait SectorLocator {
    fn sector_at(&self, point: DVec2) -> Option<SectorId>;
}
