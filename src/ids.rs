//! Identifier newtypes.
//!
//! [`NodeId`] is a dense index into the tree arena. [`UserId`] identifies the
//! owner of a resource lock; any integer is accepted.

use std::fmt as StdFmt;

/// Dense index of a node in the [`Tree`](crate::tree::Tree) arena.
///
/// Ids are assigned in input order at construction and never change.
/// Together with the node depth they define the global latch order
/// `(depth, id)` used by the [`protocol`](crate::protocol) module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// Largest number of nodes a tree may hold.
    pub const MAX_COUNT: usize = u32::MAX as usize;

    /// Create an id from a raw arena index.
    ///
    /// `index` must be below [`MAX_COUNT`](Self::MAX_COUNT); `Tree::build`
    /// rejects larger trees before any id is issued.
    #[inline]
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "count checked by Tree::build")]
    pub(crate) fn from_index(index: usize) -> Self {
        debug_assert!(u32::try_from(index).is_ok(), "node index overflow");

        Self(index as u32)
    }

    /// The arena index of this node.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl StdFmt::Display for NodeId {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of the user that owns a resource lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserId(pub i64);

impl From<i64> for UserId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl StdFmt::Display for UserId {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        write!(f, "{}", self.0)
    }
}
