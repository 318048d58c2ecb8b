//! The finished BSP tree.

use doomsday_core::{Aabb2, DivLine, LineId, LineSide, PolyobjId, SectorId, VertexId};
use glam::DVec2;
use smallvec::SmallVec;
use tracing::debug;

use super::SectorLocator;
use crate::map::Map;

/// Reference to either an internal node or a leaf.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BspChild {
    Node(u32),
    Leaf(u32),
}

/// An internal node.
#[derive(Clone, Debug, PartialEq)]
pub struct BspNode {
    pub partition: DivLine,
    /// Bounds of the front (right) and back (left) subtrees.
    pub bounds: [Aabb2; 2],
    /// Front (right) and back (left) children.
    pub children: [BspChild; 2],
}

/// A convex region of one sector.
#[derive(Clone, Debug, PartialEq)]
pub struct BspLeaf {
    pub sector: SectorId,
    pub first_segment: u32,
    pub segment_count: u32,
    /// Polyobjs whose origin lies in this leaf.
    pub polyobjs: SmallVec<[PolyobjId; 1]>,
    pub center: DVec2,
}

/// A final half-edge, ordered clockwise within its leaf.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub from: VertexId,
    pub to: VertexId,
    /// `None` for mini segments.
    pub line: Option<LineId>,
    pub side: LineSide,
    pub sector: Option<SectorId>,
    /// Index of the opposite segment.
    pub twin: Option<u32>,
    pub leaf: u32,
    /// Distance from the start of the line side to the segment start.
    pub offset: f64,
}

/// A built BSP tree.
///
/// Read-only after build; share it by reference across threads.
#[derive(Clone, Debug)]
pub struct BspTree {
    nodes: Vec<BspNode>,
    leaves: Vec<BspLeaf>,
    segments: Vec<Segment>,
    root: BspChild,
}

impl BspTree {
    pub(crate) fn from_parts(
        nodes: Vec<BspNode>,
        leaves: Vec<BspLeaf>,
        segments: Vec<Segment>,
        root: BspChild,
    ) -> Self {
        Self {
            nodes,
            leaves,
            segments,
            root,
        }
    }

    /// The root child.
    pub const fn root(&self) -> BspChild {
        self.root
    }

    pub fn nodes(&self) -> &[BspNode] {
        &self.nodes
    }

    pub fn leaves(&self) -> &[BspLeaf] {
        &self.leaves
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[inline]
    pub fn node(&self, index: u32) -> &BspNode {
        &self.nodes[index as usize]
    }

    #[inline]
    pub fn leaf(&self, index: u32) -> &BspLeaf {
        &self.leaves[index as usize]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Segments of a leaf in clockwise order.
    pub fn segments_of(&self, leaf: u32) -> &[Segment] {
        let leaf = self.leaf(leaf);
        let start = leaf.first_segment as usize;
        &self.segments[start..start + leaf.segment_count as usize]
    }

    /// Leaf containing `point`.
    ///
    /// Points exactly on a partition go to its back side.
    pub fn leaf_at(&self, point: DVec2) -> u32 {
        let mut child = self.root;
        loop {
            match child {
                BspChild::Leaf(leaf) => return leaf,
                BspChild::Node(node) => {
                    let node = self.node(node);
                    let side = node.partition.point_on_side(point);
                    child = node.children[side.index()];
                }
            }
        }
    }

    /// Sector of the leaf containing `point`.
    pub fn sector_at(&self, point: DVec2) -> SectorId {
        self.leaf(self.leaf_at(point)).sector
    }

    /// Depth of the deepest leaf; a lone leaf has depth 0.
    pub fn depth(&self) -> usize {
        fn walk(tree: &BspTree, child: BspChild) -> usize {
            match child {
                BspChild::Leaf(_) => 0,
                BspChild::Node(n) => {
                    let [front, back] = tree.node(n).children;
                    1 + walk(tree, front).max(walk(tree, back))
                }
            }
        }
        walk(self, self.root)
    }

    /// Call `f` for every leaf.
    pub fn visit_leaves(&self, mut f: impl FnMut(u32, &BspLeaf)) {
        for (index, leaf) in self.leaves.iter().enumerate() {
            f(index as u32, leaf);
        }
    }

    /// Record each polyobj in the leaf containing its origin.
    ///
    /// Previous assignments are cleared first.
    pub fn link_polyobjs(&mut self, map: &Map) {
        for leaf in &mut self.leaves {
            leaf.polyobjs.clear();
        }
        for (index, po) in map.polyobjs().iter().enumerate() {
            let leaf = self.leaf_at(po.origin);
            self.leaves[leaf as usize].polyobjs.push(PolyobjId::from(index));
            debug!(polyobj = index, leaf, "Linked polyobj");
        }
    }
}

impl SectorLocator for BspTree {
    fn sector_at(&self, point: DVec2) -> Option<SectorId> {
        Some(Self::sector_at(self, point))
    }
}
