//! Index-addressed pool of ring nodes.
//!
//! A ring is headed by a root node whose `next`/`prev` point back at itself
//! while the ring is empty. Nodes are addressed by index so rings can be
//! cross-referenced from another pile; dismissed nodes are reused LIFO.

/// Index of a node in a [`NodePile`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub u32);

impl NodeIndex {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug)]
struct Node<T> {
    next: NodeIndex,
    prev: NodeIndex,
    data: Option<T>,
}

/// Pool of doubly linked ring nodes carrying `T`.
#[derive(Clone, Debug)]
pub struct NodePile<T> {
    nodes: Vec<Node<T>>,
    free: Vec<NodeIndex>,
}

impl<T> Default for NodePile<T> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<T: Copy> NodePile<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            free: Vec::new(),
        }
    }

    fn alloc(&mut self, data: Option<T>) -> NodeIndex {
        if let Some(index) = self.free.pop() {
            let node = &mut self.nodes[index.index()];
            node.next = index;
            node.prev = index;
            node.data = data;
            return index;
        }
        let index = NodeIndex(self.nodes.len() as u32);
        self.nodes.push(Node {
            next: index,
            prev: index,
            data,
        });
        index
    }

    /// Allocate an empty ring root.
    pub fn new_root(&mut self) -> NodeIndex {
        self.alloc(None)
    }

    /// Allocate an unlinked node carrying `data`.
    pub fn new_node(&mut self, data: T) -> NodeIndex {
        self.alloc(Some(data))
    }

    /// Insert `node` right after `root`.
    pub fn link(&mut self, node: NodeIndex, root: NodeIndex) {
        let next = self.nodes[root.index()].next;
        {
            let n = &mut self.nodes[node.index()];
            n.next = next;
            n.prev = root;
        }
        self.nodes[next.index()].prev = node;
        self.nodes[root.index()].next = node;
    }

    /// Take `node` out of whatever ring it is in.
    pub fn unlink(&mut self, node: NodeIndex) {
        let Node { next, prev, .. } = self.nodes[node.index()];
        self.nodes[prev.index()].next = next;
        self.nodes[next.index()].prev = prev;
        let n = &mut self.nodes[node.index()];
        n.next = node;
        n.prev = node;
    }

    /// Return a node to the free list. It must already be unlinked.
    pub fn dismiss(&mut self, node: NodeIndex) {
        debug_assert_eq!(self.nodes[node.index()].next, node, "dismissing a linked node");
        self.nodes[node.index()].data = None;
        self.free.push(node);
    }

    #[inline]
    pub fn data(&self, node: NodeIndex) -> Option<T> {
        self.nodes[node.index()].data
    }

    #[inline]
    pub fn next(&self, node: NodeIndex) -> NodeIndex {
        self.nodes[node.index()].next
    }

    #[inline]
    pub fn prev(&self, node: NodeIndex) -> NodeIndex {
        self.nodes[node.index()].prev
    }

    /// True if the ring headed by `root` has no members.
    #[inline]
    pub fn is_empty_ring(&self, root: NodeIndex) -> bool {
        self.next(root) == root
    }

    /// Members of the ring after `root`, most recently linked first.
    pub fn ring(&self, root: NodeIndex) -> Ring<'_, T> {
        Ring {
            pile: self,
            root,
            at: self.next(root),
        }
    }

    /// Number of members in a ring.
    pub fn ring_len(&self, root: NodeIndex) -> usize {
        self.ring(root).count()
    }

    /// Nodes in use, roots included.
    pub fn live_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }
}

/// Iterator over a ring's members.
pub struct Ring<'a, T> {
    pile: &'a NodePile<T>,
    root: NodeIndex,
    at: NodeIndex,
}

impl<T: Copy> Iterator for Ring<'_, T> {
    type Item = (NodeIndex, T);

    fn next(&mut self) -> Option<Self::Item> {
        while self.at != self.root {
            let node = self.at;
            self.at = self.pile.next(node);
            if let Some(data) = self.pile.data(node) {
                return Some((node, data));
            }
        }
        None
    }
}
