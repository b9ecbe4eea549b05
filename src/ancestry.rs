//! Binary-lifting ancestor index.
//!
//! `jump[k][v]` holds the 2^k-th ancestor of node `v`. The table is built
//! once after the tree shape is fixed and is read-only afterwards, so it
//! needs no latching.
//!
//! # Cost
//! - build: O(n log h)
//! - [`AncestorIndex::kth_ancestor`]: O(log h)
//! - [`AncestorIndex::is_ancestor`]: O(log h)
//!
//! Locked-ancestor checks do NOT go through this table: they must inspect
//! every ancestor, and the operation already holds the latches of the whole
//! root-to-node chain, so they walk that chain directly in O(h).

use crate::ids::NodeId;

/// Jump table of 2^k-th ancestors.
#[derive(Debug, Clone)]
pub struct AncestorIndex {
    /// `jump[k][v]` = 2^k-th ancestor of `v`.
    jump: Vec<Vec<Option<NodeId>>>,
    depth: Vec<usize>,
}

impl AncestorIndex {
    /// Build the table from parent links and depths.
    ///
    /// `parents[v]` and `depths[v]` describe node `v`; `height` is the
    /// maximum depth.
    #[must_use]
    pub fn build(parents: &[Option<NodeId>], depths: &[usize], height: usize) -> Self {
        debug_assert_eq!(parents.len(), depths.len());

        let levels: usize = Self::levels_for(height);
        let mut jump: Vec<Vec<Option<NodeId>>> = Vec::with_capacity(levels);
        jump.push(parents.to_vec());

        for k in 1..levels {
            let prev: &Vec<Option<NodeId>> = &jump[k - 1];
            let next: Vec<Option<NodeId>> = prev
                .iter()
                .map(|half| half.and_then(|mid| prev[mid.index()]))
                .collect();
            jump.push(next);
        }

        Self {
            jump,
            depth: depths.to_vec(),
        }
    }

    /// Number of table levels needed for a tree of `height`.
    ///
    /// `max(1, ceil(log2(height + 1)))`, enough to express any distance
    /// `0..=height` in binary.
    #[inline]
    #[must_use]
    pub const fn levels_for(height: usize) -> usize {
        let bits = usize::BITS - height.leading_zeros();
        if bits == 0 { 1 } else { bits as usize }
    }

    /// Number of levels in this table.
    #[inline]
    #[must_use]
    pub fn levels(&self) -> usize {
        self.jump.len()
    }

    /// The parent of `node` (level 0 of the table).
    #[inline]
    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.jump[0][node.index()]
    }

    /// The ancestor `k` levels above `node`.
    ///
    /// `kth_ancestor(node, 0)` is `node` itself.
    ///
    /// # Returns
    /// [`None`] if `k` exceeds the depth of `node`.
    #[must_use]
    pub fn kth_ancestor(&self, node: NodeId, k: usize) -> Option<NodeId> {
        if k > self.depth[node.index()] {
            return None;
        }

        let mut current: NodeId = node;
        let mut remaining: usize = k;
        let mut level: usize = 0;

        while remaining > 0 {
            if remaining & 1 == 1 {
                current = self.jump[level][current.index()]?;
            }
            remaining >>= 1;
            level += 1;
        }

        Some(current)
    }

    /// Whether `ancestor` lies strictly above `node`.
    #[must_use]
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let (a_depth, n_depth) = (self.depth[ancestor.index()], self.depth[node.index()]);
        if a_depth >= n_depth {
            return false;
        }

        self.kth_ancestor(node, n_depth - a_depth) == Some(ancestor)
    }

    /// Iterate the strict ancestors of `node`, nearest first.
    pub fn ancestors(&self, node: NodeId) -> Ancestors<'_> {
        Ancestors {
            index: self,
            next: self.parent(node),
        }
    }
}

/// Iterator over strict ancestors, nearest first.
#[derive(Debug, Clone)]
pub struct Ancestors<'a> {
    index: &'a AncestorIndex,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.index.parent(current);
        Some(current)
    }
}
