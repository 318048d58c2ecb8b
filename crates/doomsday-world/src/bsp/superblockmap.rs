//! Recursive box partition over half-edges used while building the BSP.
//!
//! Each block owns the half-edges that straddle its midpoint (or all of them
//! once the block is small enough) and lazily creates two half-size children
//! for the rest. Blocks keep running counts of the real and mini half-edges
//! in their whole subtree so partition costs can be estimated per block
//! without walking it.

use doomsday_core::constants::SUPERBLOCK_LEAF_SIZE;
use doomsday_core::Aabb2;
use glam::DVec2;

use super::hedge::{HEdge, HEdgeId, Placement};

/// Index of a block in the [`SuperBlockmap`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug)]
struct Block {
    bounds: Aabb2,
    hedges: Vec<HEdgeId>,
    children: [Option<BlockId>; 2],
    parent: Option<BlockId>,
    real_count: usize,
    mini_count: usize,
}

impl Block {
    fn new(bounds: Aabb2, parent: Option<BlockId>) -> Self {
        Self {
            bounds,
            hedges: Vec::new(),
            children: [None, None],
            parent,
            real_count: 0,
            mini_count: 0,
        }
    }

    fn is_small(&self) -> bool {
        self.bounds.width() <= SUPERBLOCK_LEAF_SIZE && self.bounds.height() <= SUPERBLOCK_LEAF_SIZE
    }

    fn count(&mut self, mini: bool, add: bool) {
        let counter = if mini {
            &mut self.mini_count
        } else {
            &mut self.real_count
        };
        if add {
            *counter += 1;
        } else {
            *counter = counter.saturating_sub(1);
        }
    }
}

/// Arena of block trees.
///
/// A single arena holds every tree created during one build; each partition
/// step adds fresh roots for its two halves.
#[derive(Clone, Debug, Default)]
pub struct SuperBlockmap {
    blocks: Vec<Block>,
}

impl SuperBlockmap {
    /// Create an arena with a single root block covering `bounds`.
    pub fn new(bounds: Aabb2) -> Self {
        let mut map = Self::default();
        map.add_root(bounds);
        map
    }

    /// The first root created.
    pub const fn root() -> BlockId {
        BlockId(0)
    }

    /// Add another root block.
    pub fn add_root(&mut self, bounds: Aabb2) -> BlockId {
        self.alloc(Block::new(bounds, None))
    }

    fn alloc(&mut self, block: Block) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(block);
        id
    }

    /// Number of blocks allocated.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Bounding box of a block.
    #[inline]
    pub fn bounds(&self, block: BlockId) -> Aabb2 {
        self.blocks[block.index()].bounds
    }

    /// True once a block is at most 256 units on both sides, or has nothing
    /// beneath it.
    pub fn is_leaf(&self, block: BlockId) -> bool {
        let b = &self.blocks[block.index()];
        b.is_small() || b.real_count + b.mini_count == 0
    }

    /// Child block on the low (0) or high (1) side of the split.
    #[inline]
    pub fn child(&self, block: BlockId, index: usize) -> Option<BlockId> {
        self.blocks[block.index()].children[index]
    }

    /// Parent block, `None` for roots.
    #[inline]
    pub fn parent(&self, block: BlockId) -> Option<BlockId> {
        self.blocks[block.index()].parent
    }

    /// Real half-edges in the subtree.
    #[inline]
    pub fn real_count(&self, block: BlockId) -> usize {
        self.blocks[block.index()].real_count
    }

    /// Mini half-edges in the subtree.
    #[inline]
    pub fn mini_count(&self, block: BlockId) -> usize {
        self.blocks[block.index()].mini_count
    }

    /// All half-edges in the subtree.
    #[inline]
    pub fn total_count(&self, block: BlockId) -> usize {
        let b = &self.blocks[block.index()];
        b.real_count + b.mini_count
    }

    /// Half-edges owned directly by a block.
    #[inline]
    pub fn hedges(&self, block: BlockId) -> &[HEdgeId] {
        &self.blocks[block.index()].hedges
    }

    /// Insert a half-edge below the given root.
    pub fn push(&mut self, root: BlockId, hedges: &mut [HEdge], id: HEdgeId) -> BlockId {
        self.push_at(root, hedges, id)
    }

    /// Insert a half-edge starting the descent at `block`.
    ///
    /// Ancestors of `block` have their counters bumped too so subtree
    /// counts stay exact.
    pub fn push_at(&mut self, block: BlockId, hedges: &mut [HEdge], id: HEdgeId) -> BlockId {
        let hedge = &hedges[id.index()];
        let mini = hedge.is_mini();
        let (start, end) = (hedge.start, hedge.end);

        let mut up = self.parent(block);
        while let Some(ancestor) = up {
            self.blocks[ancestor.index()].count(mini, true);
            up = self.parent(ancestor);
        }

        let mut current = block;
        loop {
            let b = &mut self.blocks[current.index()];
            b.count(mini, true);

            if b.is_small() {
                break;
            }

            let mid = b.bounds.center();
            let wide = b.bounds.width() >= b.bounds.height();
            let high = |p: DVec2| if wide { p.x >= mid.x } else { p.y >= mid.y };
            let child = match (high(start), high(end)) {
                (true, true) => 1,
                (false, false) => 0,
                _ => break,
            };

            let existing = b.children[child];
            current = match existing {
                Some(existing) => existing,
                None => {
                    let bounds = Self::half(b.bounds, wide, child);
                    let created = self.alloc(Block::new(bounds, Some(current)));
                    self.blocks[current.index()].children[child] = Some(created);
                    created
                }
            };
        }

        self.blocks[current.index()].hedges.push(id);
        hedges[id.index()].placement = Placement::Block(current);
        current
    }

    fn half(bounds: Aabb2, wide: bool, child: usize) -> Aabb2 {
        let mid = bounds.center();
        match (wide, child) {
            (true, 0) => Aabb2::new(bounds.min, DVec2::new(mid.x, bounds.max.y)),
            (true, _) => Aabb2::new(DVec2::new(mid.x, bounds.min.y), bounds.max),
            (false, 0) => Aabb2::new(bounds.min, DVec2::new(bounds.max.x, mid.y)),
            (false, _) => Aabb2::new(DVec2::new(bounds.min.x, mid.y), bounds.max),
        }
    }

    /// Remove the most recently pushed half-edge from a block's own list.
    pub fn pop(&mut self, block: BlockId, hedges: &mut [HEdge]) -> Option<HEdgeId> {
        let id = self.blocks[block.index()].hedges.pop()?;
        let hedge = &mut hedges[id.index()];
        hedge.placement = Placement::Unplaced;
        let mini = hedge.is_mini();

        let mut up = Some(block);
        while let Some(b) = up {
            self.blocks[b.index()].count(mini, false);
            up = self.parent(b);
        }
        Some(id)
    }

    /// Pop every half-edge in the subtree, children before parents.
    pub fn take_all(&mut self, block: BlockId, hedges: &mut [HEdge]) -> Vec<HEdgeId> {
        let mut out = Vec::with_capacity(self.total_count(block));
        let mut stack = vec![block];
        while let Some(b) = stack.pop() {
            while let Some(id) = self.pop(b, hedges) {
                out.push(id);
            }
            stack.extend(self.blocks[b.index()].children.iter().flatten());
        }
        out
    }

    /// Every half-edge in the subtree, without removing them.
    pub fn collect(&self, block: BlockId) -> Vec<HEdgeId> {
        let mut out = Vec::with_capacity(self.total_count(block));
        self.visit(block, &mut |_, ids| out.extend_from_slice(ids));
        out
    }

    /// Call `f` with each block in the subtree and its own half-edges.
    pub fn visit(&self, block: BlockId, f: &mut impl FnMut(BlockId, &[HEdgeId])) {
        let b = &self.blocks[block.index()];
        f(block, &b.hedges);
        for child in b.children.iter().flatten() {
            self.visit(*child, f);
        }
    }

    /// Union of the bounds of every half-edge in the subtree.
    pub fn find_hedge_bounds(&self, block: BlockId, hedges: &[HEdge]) -> Aabb2 {
        let mut bounds = Aabb2::EMPTY;
        self.visit(block, &mut |_, ids| {
            for id in ids {
                let h = &hedges[id.index()];
                bounds.expand_to_include(h.start);
                bounds.expand_to_include(h.end);
            }
        });
        bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doomsday_core::{LineId, VertexId};

    fn hedge(a: (f64, f64), b: (f64, f64), real: bool) -> HEdge {
        let mut h = HEdge::new(
            VertexId(0),
            VertexId(1),
            DVec2::new(a.0, a.1),
            DVec2::new(b.0, b.1),
        );
        if real {
            h.line = Some(LineId(0));
        }
        h
    }

    fn world() -> SuperBlockmap {
        SuperBlockmap::new(Aabb2::new(DVec2::ZERO, DVec2::splat(1024.0)))
    }

    #[test]
    fn straddling_hedge_stays_at_root() {
        let mut map = world();
        let mut hedges = vec![hedge((100.0, 10.0), (900.0, 10.0), true)];
        let at = map.push(SuperBlockmap::root(), &mut hedges, HEdgeId(0));
        assert_eq!(at, SuperBlockmap::root());
        assert_eq!(map.block_count(), 1);
        assert_eq!(hedges[0].placement, Placement::Block(at));
    }

    #[test]
    fn small_hedge_descends_to_leaf() {
        let mut map = world();
        let mut hedges = vec![hedge((10.0, 10.0), (20.0, 20.0), false)];
        let at = map.push(SuperBlockmap::root(), &mut hedges, HEdgeId(0));
        let bounds = map.bounds(at);
        assert!(bounds.width() <= 256.0 && bounds.height() <= 256.0);
        assert!(map.is_leaf(at));
        assert_eq!(map.mini_count(SuperBlockmap::root()), 1);
        assert_eq!(map.real_count(SuperBlockmap::root()), 0);
        assert_eq!(map.mini_count(at), 1);
    }

    #[test]
    fn children_split_exactly_in_half() {
        let mut map = world();
        let mut hedges = vec![hedge((600.0, 10.0), (700.0, 20.0), true)];
        map.push(SuperBlockmap::root(), &mut hedges, HEdgeId(0));
        let high = map.child(SuperBlockmap::root(), 1).unwrap();
        assert_eq!(map.bounds(high).min, DVec2::new(512.0, 0.0));
        assert_eq!(map.bounds(high).max, DVec2::new(1024.0, 1024.0));
        assert!(map.child(SuperBlockmap::root(), 0).is_none());
    }

    #[test]
    fn pop_is_lifo_and_updates_counts() {
        let mut map = world();
        let mut hedges = vec![
            hedge((10.0, 10.0), (20.0, 20.0), true),
            hedge((12.0, 10.0), (22.0, 20.0), true),
        ];
        let a = map.push(SuperBlockmap::root(), &mut hedges, HEdgeId(0));
        let b = map.push(SuperBlockmap::root(), &mut hedges, HEdgeId(1));
        assert_eq!(a, b);
        assert_eq!(map.pop(a, &mut hedges), Some(HEdgeId(1)));
        assert_eq!(map.real_count(SuperBlockmap::root()), 1);
        assert_eq!(hedges[1].placement, Placement::Unplaced);
        assert_eq!(map.pop(a, &mut hedges), Some(HEdgeId(0)));
        assert_eq!(map.pop(a, &mut hedges), None);
        assert_eq!(map.total_count(SuperBlockmap::root()), 0);
        assert!(map.is_leaf(SuperBlockmap::root()));
    }

    #[test]
    fn push_at_counts_ancestors() {
        let mut map = world();
        let mut hedges = vec![
            hedge((10.0, 10.0), (20.0, 20.0), true),
            hedge((30.0, 10.0), (40.0, 20.0), true),
        ];
        let leaf = map.push(SuperBlockmap::root(), &mut hedges, HEdgeId(0));
        map.push_at(leaf, &mut hedges, HEdgeId(1));
        assert_eq!(map.real_count(SuperBlockmap::root()), 2);
        assert_eq!(map.hedges(leaf), &[HEdgeId(0), HEdgeId(1)]);
    }

    #[test]
    fn hedge_bounds_cover_subtree() {
        let mut map = world();
        let mut hedges = vec![
            hedge((10.0, 10.0), (20.0, 20.0), true),
            hedge((900.0, 900.0), (950.0, 1000.0), true),
        ];
        map.push(SuperBlockmap::root(), &mut hedges, HEdgeId(0));
        map.push(SuperBlockmap::root(), &mut hedges, HEdgeId(1));
        let bounds = map.find_hedge_bounds(SuperBlockmap::root(), &hedges);
        assert_eq!(bounds.min, DVec2::splat(10.0));
        assert_eq!(bounds.max, DVec2::new(950.0, 1000.0));

        let all = map.take_all(SuperBlockmap::root(), &mut hedges);
        assert_eq!(all.len(), 2);
        assert!(map.find_hedge_bounds(SuperBlockmap::root(), &hedges).is_empty());
    }
}
