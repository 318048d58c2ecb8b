//! Map element identifiers.
//!
//! Map elements are stored in flat arrays and referenced by index. Each kind
//! of element gets its own newtype so a sector index can never be used to
//! look up a line.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

macro_rules! map_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Pod, Zeroable,
            Serialize, Deserialize,
        )]
        #[repr(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Create an id from a raw index
            #[inline]
            pub const fn new(index: u32) -> Self {
                Self(index)
            }

            /// Index into the owning array
            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl From<usize> for $name {
            #[inline]
            fn from(index: usize) -> Self {
                Self(index as u32)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "#{}", self.0)
            }
        }
    };
}

map_id!(
    /// Index of a map vertex.
    VertexId
);
map_id!(
    /// Index of a map line (linedef).
    LineId
);
map_id!(
    /// Index of a sector.
    SectorId
);
map_id!(
    /// Index of a polyobject.
    PolyobjId
);

/// One of the two sides of a line.
///
/// The front is the right-hand side when walking from the line's first
/// vertex to its second.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineSide {
    /// Right-hand side.
    #[default]
    Front,
    /// Left-hand side.
    Back,
}

impl LineSide {
    /// 0 for front, 1 for back.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Self::Front => 0,
            Self::Back => 1,
        }
    }
}
