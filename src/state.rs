//! Per-node lock bookkeeping.
//!
//! [`LockState`] lives behind each node's `NodeLatch`
//! and is only ever mutated while that latch is held.
//!
//! Besides the owner of the node itself, every node tracks the set of its
//! currently locked descendants and a histogram `user -> count` over the
//! owners of those descendants. The histogram answers "are all locked
//! descendants owned by one user?" in O(1) during upgrade.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::ids::{NodeId, UserId};

// ============================================================================
//  LockState
// ============================================================================

/// Mutable lock fields of one tree node.
///
/// # Invariants
/// - `owner_histogram.values().sum() == locked_descendants.len()`
/// - no histogram entry has count zero
#[derive(Debug, Default)]
pub struct LockState {
    owner: Option<UserId>,
    locked_descendants: HashSet<NodeId>,
    owner_histogram: HashMap<UserId, usize>,
}

impl LockState {
    /// An unlocked node with no locked descendants.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The user holding this node, if locked.
    #[inline]
    #[must_use]
    pub const fn owner(&self) -> Option<UserId> {
        self.owner
    }

    /// Whether this node itself is locked.
    #[inline]
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.owner.is_some()
    }

    /// Number of locked nodes strictly below this one.
    #[inline]
    #[must_use]
    pub fn locked_descendant_count(&self) -> usize {
        self.locked_descendants.len()
    }

    /// Ids of the locked nodes strictly below this one.
    #[inline]
    #[must_use]
    pub const fn locked_descendants(&self) -> &HashSet<NodeId> {
        &self.locked_descendants
    }

    /// How many locked descendants `user` owns.
    #[inline]
    #[must_use]
    pub fn owned_by(&self, user: UserId) -> usize {
        self.owner_histogram.get(&user).copied().unwrap_or(0)
    }

    /// The single owner of every locked descendant.
    ///
    /// [`None`] if there are no locked descendants or they have more than one
    /// owner.
    #[must_use]
    pub fn sole_descendant_owner(&self) -> Option<UserId> {
        if self.owner_histogram.len() != 1 {
            return None;
        }

        self.owner_histogram.keys().next().copied()
    }

    pub(crate) fn set_owner(&mut self, owner: Option<UserId>) {
        self.owner = owner;
    }

    /// Record that descendant `id`, owned by `owner`, became locked.
    pub(crate) fn add_locked_descendant(&mut self, id: NodeId, owner: UserId) {
        if self.locked_descendants.insert(id) {
            *self.owner_histogram.entry(owner).or_insert(0) += 1;
        }
    }

    /// Record that descendant `id`, owned by `owner`, was unlocked.
    ///
    /// The histogram key is dropped when its count reaches zero.
    pub(crate) fn remove_locked_descendant(&mut self, id: NodeId, owner: UserId) {
        if !self.locked_descendants.remove(&id) {
            return;
        }

        if let Some(count) = self.owner_histogram.get_mut(&owner) {
            *count -= 1;
            if *count == 0 {
                self.owner_histogram.remove(&owner);
            }
        }
    }

    /// Owned copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            owner: self.owner,
            locked_descendant_count: self.locked_descendants.len(),
            owner_histogram: self
                .owner_histogram
                .iter()
                .map(|(user, count)| (*user, *count))
                .collect(),
        }
    }
}

// ============================================================================
//  NodeSnapshot
// ============================================================================

/// Point-in-time copy of one node's [`LockState`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSnapshot {
    /// The user holding the node, if locked.
    pub owner: Option<UserId>,
    /// Number of locked nodes strictly below the node.
    pub locked_descendant_count: usize,
    /// Owners of those locked descendants with their counts.
    pub owner_histogram: BTreeMap<UserId, usize>,
}
