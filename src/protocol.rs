//! Ordered path latching.
//!
//! Every operation that touches more than one node latches them in one
//! global order, `(depth, id)` ascending, and releases them in exact reverse
//! order. Two threads can therefore never wait on each other's latches in
//! opposite directions.
//!
//! # Protocol
//!
//! ```text
//! lock / unlock:
//!   1. latch root -> target              (one node per depth)
//!   2. check preconditions, mutate
//!   3. release target -> root
//!
//! upgrade:
//!   1. latch root -> target
//!   2. read locked_descendants(target)   (stable: any writer below target
//!                                         must hold target's latch)
//!   3. latch union of chains target -> d (target exclusive) for each d,
//!      sorted by (depth, id)             (all deeper than step 1)
//!   4. check preconditions, mutate
//!   5. release everything in reverse
//! ```
//!
//! Step 3 covers the intermediate nodes between the target and each
//! absorbed descendant. Latching only the root -> target chain leaves the
//! bookkeeping of those intermediate nodes unprotected while the upgrade
//! rewrites it.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use crate::error::LockTreeError;
use crate::ids::NodeId;
use crate::latch::LatchGuard;
use crate::state::LockState;
use crate::tracing_helpers::{trace_log, warn_log};
use crate::tree::Tree;

// ============================================================================
//  LatchOrder
// ============================================================================

/// Position of a node in the global latch order.
pub type LatchOrder = (usize, NodeId);

/// The global latch-order key of `node`.
#[inline]
#[must_use]
pub fn latch_order(tree: &Tree, node: NodeId) -> LatchOrder {
    (tree.depth(node), node)
}

// ============================================================================
//  PathLatch
// ============================================================================

/// A set of held node latches, acquired in global order.
///
/// Dropping a `PathLatch` releases every latch in reverse acquisition order.
#[derive(Debug)]
#[must_use = "dropping a PathLatch releases every latch it holds"]
pub struct PathLatch<'t> {
    tree: &'t Tree,
    timeout: Option<Duration>,
    /// Held guards in acquisition order.
    guards: Vec<LatchGuard<'t>>,
    /// Node id -> position in `guards`.
    position: HashMap<NodeId, usize>,
}

impl<'t> PathLatch<'t> {
    /// Latch the chain `root -> target`, top-down.
    ///
    /// With a `timeout`, each latch is waited on for at most that long.
    ///
    /// # Errors
    /// [`LockTreeError::Contended`] if a latch times out. Latches already
    /// taken are released before returning.
    pub fn root_to(
        tree: &'t Tree,
        target: NodeId,
        timeout: Option<Duration>,
    ) -> Result<Self, LockTreeError> {
        let path: Vec<NodeId> = tree.path_from_root(target);

        let mut latched = Self {
            tree,
            timeout,
            guards: Vec::with_capacity(path.len()),
            position: HashMap::with_capacity(path.len()),
        };
        latched.acquire_all(path)?;

        Ok(latched)
    }

    /// Latch every node of the tree in global order, blocking.
    ///
    /// Used for consistent whole-tree reads; ignores any timeout.
    pub fn whole_tree(tree: &'t Tree) -> Self {
        let mut order: Vec<NodeId> = tree.ids().collect();
        order.sort_unstable_by_key(|&node| latch_order(tree, node));

        let mut latched = Self {
            tree,
            timeout: None,
            guards: Vec::with_capacity(order.len()),
            position: HashMap::with_capacity(order.len()),
        };
        for node in order {
            let guard: LatchGuard<'t> = tree.node(node).latch().acquire(node);
            latched.push(guard);
        }

        latched
    }

    /// Additionally latch every node strictly between `top` and each of
    /// `bottoms`, plus the bottoms themselves.
    ///
    /// `top` must already be held and every bottom must lie below it. The new
    /// nodes are all deeper than `top`, so acquiring them in `(depth, id)`
    /// order keeps the global order intact.
    ///
    /// # Errors
    /// [`LockTreeError::Contended`] on timeout; nothing is released here,
    /// the caller drops the whole `PathLatch`.
    pub fn extend_below<I>(&mut self, top: NodeId, bottoms: I) -> Result<(), LockTreeError>
    where
        I: IntoIterator<Item = NodeId>,
    {
        debug_assert!(self.holds(top), "extend_below: top not latched");

        let tree: &Tree = self.tree;
        let mut union: BTreeSet<LatchOrder> = BTreeSet::new();

        for bottom in bottoms {
            debug_assert!(tree.ancestry().is_ancestor(top, bottom));

            let mut current: Option<NodeId> = Some(bottom);
            while let Some(node) = current {
                if node == top || !union.insert(latch_order(tree, node)) {
                    // Reached the held chain, or a chain already collected.
                    break;
                }
                current = tree.parent(node);
            }
        }

        self.acquire_all(union.into_iter().map(|(_, node)| node))
    }

    /// Every node in `nodes` must come after every held node in the global
    /// order.
    fn acquire_all<I>(&mut self, nodes: I) -> Result<(), LockTreeError>
    where
        I: IntoIterator<Item = NodeId>,
    {
        let tree: &'t Tree = self.tree;

        for node in nodes {
            debug_assert!(
                self.guards
                    .last()
                    .is_none_or(|held| latch_order(tree, held.node()) < latch_order(tree, node)),
                "latch order violated at {node}"
            );

            let latch = tree.node(node).latch();
            let guard: LatchGuard<'t> = match self.timeout {
                None => latch.acquire(node),
                Some(timeout) => latch.try_acquire_for(node, timeout).ok_or_else(|| {
                    warn_log!(node = %node, ?timeout, "latch acquisition timed out");
                    LockTreeError::Contended {
                        node: tree.name(node).to_string(),
                        timeout,
                    }
                })?,
            };

            self.push(guard);
        }

        Ok(())
    }

    fn push(&mut self, guard: LatchGuard<'t>) {
        self.position.insert(guard.node(), self.guards.len());
        self.guards.push(guard);
    }

    /// Whether the latch of `node` is held by this path.
    #[inline]
    #[must_use]
    pub fn holds(&self, node: NodeId) -> bool {
        self.position.contains_key(&node)
    }

    /// Number of held latches.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    /// Whether no latch is held.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Read the state of a held node.
    ///
    /// # Panics
    /// Panics if `node` is not held: the caller broke the protocol.
    #[must_use]
    #[expect(clippy::expect_used, reason = "Invariant ensured by caller")]
    pub fn state(&self, node: NodeId) -> &LockState {
        let at: usize = *self
            .position
            .get(&node)
            .expect("PathLatch::state called on a node whose latch is not held");
        self.guards[at].state()
    }

    /// Write the state of a held node.
    ///
    /// # Panics
    /// Panics if `node` is not held: the caller broke the protocol.
    #[expect(clippy::expect_used, reason = "Invariant ensured by caller")]
    pub fn state_mut(&mut self, node: NodeId) -> &mut LockState {
        let at: usize = *self
            .position
            .get(&node)
            .expect("PathLatch::state_mut called on a node whose latch is not held");
        self.guards[at].state_mut()
    }
}

impl Drop for PathLatch<'_> {
    fn drop(&mut self) {
        // Reverse acquisition order: target first, root last.
        while let Some(guard) = self.guards.pop() {
            drop(guard);
        }
        trace_log!("path released");
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeShape;

    fn binary_tree(n: usize) -> Tree {
        let names: Vec<String> = (0..n).map(|i| format!("n{i}")).collect();
        Tree::build(names, TreeShape::Arity(2)).unwrap()
    }

    #[test]
    fn test_root_to_holds_whole_chain() {
        let tree = binary_tree(15);
        let leaf = tree.id("n14").unwrap();

        let latched = PathLatch::root_to(&tree, leaf, None).unwrap();
        assert_eq!(latched.len(), 4);
        for node in tree.path_from_root(leaf) {
            assert!(latched.holds(node));
            assert!(tree.node(node).latch().is_held());
        }

        drop(latched);
        assert!(tree.ids().all(|id| !tree.node(id).latch().is_held()));
    }

    #[test]
    fn test_extend_below_takes_union_of_chains() {
        // n0 -> n1, n2; n1 -> n3, n4; n3 -> n7, n8; n4 -> n9, n10
        let tree = binary_tree(15);
        let n1 = tree.id("n1").unwrap();
        let bottoms = ["n7", "n8", "n10"].map(|name| tree.id(name).unwrap());

        let mut latched = PathLatch::root_to(&tree, n1, None).unwrap();
        latched.extend_below(n1, bottoms).unwrap();

        let held: Vec<&str> = ["n0", "n1", "n3", "n4", "n7", "n8", "n10"].to_vec();
        for name in &held {
            assert!(latched.holds(tree.id(name).unwrap()), "{name} not held");
        }
        assert_eq!(latched.len(), held.len());
        assert!(!latched.holds(tree.id("n2").unwrap()));
        assert!(!latched.holds(tree.id("n9").unwrap()));
    }

    #[test]
    fn test_timeout_reports_contention_and_releases() {
        let tree = binary_tree(7);
        let leaf = tree.id("n6").unwrap();
        let parent = tree.parent(leaf).unwrap();

        // Hold the parent latch from outside the protocol.
        let blocker = tree.node(parent).latch().acquire(parent);

        let err = PathLatch::root_to(&tree, leaf, Some(Duration::from_millis(10))).unwrap_err();
        assert_eq!(
            err,
            LockTreeError::Contended {
                node: "n2".into(),
                timeout: Duration::from_millis(10),
            }
        );
        assert!(!tree.node(tree.root()).latch().is_held());

        drop(blocker);
        assert!(PathLatch::root_to(&tree, leaf, Some(Duration::from_millis(10))).is_ok());
    }

    #[test]
    fn test_whole_tree_holds_everything() {
        let tree = binary_tree(10);
        let latched = PathLatch::whole_tree(&tree);
        assert_eq!(latched.len(), tree.len());
        drop(latched);
        assert!(tree.ids().all(|id| !tree.node(id).latch().is_held()));
    }

    #[test]
    fn test_latch_order_is_depth_first() {
        let tree = binary_tree(7);
        let n6 = tree.id("n6").unwrap();
        let n1 = tree.id("n1").unwrap();
        assert!(latch_order(&tree, n1) < latch_order(&tree, n6));
        assert!(latch_order(&tree, tree.root()) < latch_order(&tree, n1));
    }
}
