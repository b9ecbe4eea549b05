//! Error types.
//!
//! A failed lock/unlock/upgrade precondition is NOT an error: it is reported
//! as `Ok(false)`. Errors here describe malformed input (unknown node, bad
//! tree description) or a bounded wait that ran out.

use std::time::Duration;

use thiserror::Error;

use crate::ids::UserId;

// ============================================================================
//  ConstructionError
// ============================================================================

/// The tree description could not be turned into a single rooted tree.
///
/// Construction is all-or-nothing: when this is returned no tree exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstructionError {
    /// No node names were given.
    #[error("tree has no nodes")]
    Empty,

    /// The same name appears twice in the node list.
    #[error("duplicate node name `{0}`")]
    DuplicateName(String),

    /// An edge references a name that is not in the node list.
    #[error("edge references unknown node `{0}`")]
    UnknownName(String),

    /// A node was given more than one parent.
    #[error("node `{child}` has two parents: `{first}` and `{second}`")]
    MultipleParents {
        /// The child with conflicting parents.
        child: String,
        /// Parent from the first edge.
        first: String,
        /// Parent from the conflicting edge.
        second: String,
    },

    /// More than one node has no parent (a forest, not a tree).
    #[error("expected exactly one root, found {}: {roots:?}", roots.len())]
    MultipleRoots {
        /// Names of every parentless node.
        roots: Vec<String>,
    },

    /// The parent links contain a cycle.
    #[error("cycle through node `{0}`")]
    Cycle(String),

    /// More names than a [`NodeId`](crate::ids::NodeId) can index.
    #[error("{count} nodes exceed the limit of {max}")]
    TooManyNodes {
        /// Number of names given.
        count: usize,
        /// [`NodeId::MAX_COUNT`](crate::ids::NodeId::MAX_COUNT).
        max: usize,
    },
}

// ============================================================================
//  LockTreeError
// ============================================================================

/// A lock-tree operation could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockTreeError {
    /// The operation named a node that is not in the tree.
    #[error("node not found: {0}")]
    NotFound(String),

    /// A node latch could not be acquired within the configured timeout.
    ///
    /// Nothing was mutated; the caller may retry.
    #[error("timed out after {timeout:?} waiting for latch on `{node}`")]
    Contended {
        /// Node whose latch was not acquired.
        node: String,
        /// The configured acquisition timeout.
        timeout: Duration,
    },
}

impl LockTreeError {
    /// True if retrying the same operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Contended { .. })
    }
}

// ============================================================================
//  InvariantViolation
// ============================================================================

/// Bookkeeping found inconsistent by [`LockTree::verify`](crate::LockTree::verify).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// A locked node has a locked ancestor.
    #[error("`{node}` is locked under locked ancestor `{ancestor}`")]
    LockedUnderLockedAncestor {
        /// The locked node.
        node: String,
        /// Its locked ancestor.
        ancestor: String,
    },

    /// The locked-descendant set disagrees with a recount.
    #[error("`{node}` tracks {tracked} locked descendants, recount found {actual}")]
    DescendantCount {
        /// Node with stale bookkeeping.
        node: String,
        /// Size of the tracked set.
        tracked: usize,
        /// Number of locked nodes actually below it.
        actual: usize,
    },

    /// The locked-descendant set names a node that is not a locked descendant.
    #[error("`{node}` tracks `{descendant}` which is not a locked descendant")]
    StaleDescendant {
        /// Node with stale bookkeeping.
        node: String,
        /// The tracked entry.
        descendant: String,
    },

    /// The owner histogram disagrees with a recount.
    #[error("`{node}` histogram says user {user} owns {tracked}, recount found {actual}")]
    Histogram {
        /// Node with stale bookkeeping.
        node: String,
        /// User whose count is wrong.
        user: UserId,
        /// Count in the histogram (0 if absent).
        tracked: usize,
        /// Recounted value (0 if absent).
        actual: usize,
    },
}
