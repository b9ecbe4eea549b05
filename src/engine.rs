//! Operation engine.
//!
//! [`LockTree`] grants, releases and upgrades resource locks on the nodes of
//! a fixed [`Tree`]. Each operation latches the nodes it reads or writes via
//! [`PathLatch`], checks its preconditions, and either commits all of its
//! bookkeeping changes or none of them.
//!
//! # Per-node state machine
//!
//! ```text
//!            lock / upgrade
//! Unlocked ─────────────────▶ Locked(owner)
//!    ▲                             │
//!    └──── unlock / absorbed ──────┘
//!           by ancestor upgrade
//! ```
//!
//! A failed precondition returns `Ok(false)`. Only an unknown node name
//! ([`LockTreeError::NotFound`]) or a bounded latch wait running out
//! ([`LockTreeError::Contended`]) is an error.

use std::collections::{BTreeMap, HashMap};
use std::fmt as StdFmt;

use crate::config::Config;
use crate::error::{InvariantViolation, LockTreeError};
use crate::ids::{NodeId, UserId};
use crate::protocol::PathLatch;
use crate::state::NodeSnapshot;
use crate::tracing_helpers::debug_log;
use crate::tree::Tree;

// ============================================================================
//  Operation
// ============================================================================

/// Kind of a lock-tree operation, with its wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Code `1`: lock a node.
    Lock,
    /// Code `2`: unlock a node.
    Unlock,
    /// Code `3`: replace own locked descendants with a lock on the node.
    Upgrade,
}

impl OperationKind {
    /// Numeric code used by the command format.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Lock => 1,
            Self::Unlock => 2,
            Self::Upgrade => 3,
        }
    }

    /// Kind for a numeric code, if any.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Lock),
            2 => Some(Self::Unlock),
            3 => Some(Self::Upgrade),
            _ => None,
        }
    }
}

impl StdFmt::Display for OperationKind {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::Lock => write!(f, "lock"),
            Self::Unlock => write!(f, "unlock"),
            Self::Upgrade => write!(f, "upgrade"),
        }
    }
}

/// One request against a [`LockTree`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Operation {
    /// What to do.
    pub kind: OperationKind,
    /// Name of the target node.
    pub node: String,
    /// Requesting user.
    pub user: UserId,
}

impl Operation {
    /// Build an operation.
    #[must_use]
    pub fn new(kind: OperationKind, node: impl Into<String>, user: UserId) -> Self {
        Self {
            kind,
            node: node.into(),
            user,
        }
    }
}

// ============================================================================
//  LockTree
// ============================================================================

/// Hierarchical lock manager over a fixed tree.
///
/// `LockTree` is `Send + Sync`; share it behind an `Arc` and call operations
/// from any number of threads.
///
/// # Example
///
/// ```rust
/// use treelock::{LockTree, Tree, TreeShape, UserId};
///
/// let tree = Tree::build(["root", "a", "b"], TreeShape::Arity(2)).unwrap();
/// let locks = LockTree::new(tree);
///
/// assert!(locks.lock("a", UserId(1)).unwrap());
/// assert!(!locks.lock("root", UserId(2)).unwrap()); // "a" is locked below
/// assert!(locks.upgrade("root", UserId(1)).unwrap());
/// ```
#[derive(Debug)]
pub struct LockTree {
    tree: Tree,
    config: Config,
}

impl LockTree {
    /// Lock manager with the default (blocking) configuration.
    #[must_use]
    pub fn new(tree: Tree) -> Self {
        Self::with_config(tree, Config::default())
    }

    /// Lock manager with an explicit configuration.
    #[must_use]
    pub const fn with_config(tree: Tree, config: Config) -> Self {
        Self { tree, config }
    }

    /// The underlying tree.
    #[inline]
    #[must_use]
    pub const fn tree(&self) -> &Tree {
        &self.tree
    }

    /// The active configuration.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    // ========================================================================
    //  Operations
    // ========================================================================

    /// Lock `name` for `user`.
    ///
    /// Succeeds iff the node is unlocked, no ancestor is locked, and no
    /// descendant is locked.
    ///
    /// # Errors
    /// [`LockTreeError::NotFound`] for an unknown name;
    /// [`LockTreeError::Contended`] if a bounded latch wait expires.
    pub fn lock(&self, name: &str, user: UserId) -> Result<bool, LockTreeError> {
        let node: NodeId = self.resolve(name)?;
        let mut path: PathLatch<'_> = self.latch_chain(node)?;

        let granted: bool = self.lock_latched(&mut path, node, user);
        debug_log!(op = "lock", node = name, user = user.0, granted);

        Ok(granted)
    }

    /// Release `user`'s lock on `name`.
    ///
    /// Succeeds iff the node is locked by `user`.
    ///
    /// # Errors
    /// [`LockTreeError::NotFound`] for an unknown name;
    /// [`LockTreeError::Contended`] if a bounded latch wait expires.
    pub fn unlock(&self, name: &str, user: UserId) -> Result<bool, LockTreeError> {
        let node: NodeId = self.resolve(name)?;
        let mut path: PathLatch<'_> = self.latch_chain(node)?;

        let released: bool = self.unlock_latched(&mut path, node, user);
        debug_log!(op = "unlock", node = name, user = user.0, released);

        Ok(released)
    }

    /// Replace all of `user`'s locks below `name` with one lock on `name`.
    ///
    /// Succeeds iff the node is unlocked, no ancestor is locked, at least one
    /// descendant is locked, and every locked descendant belongs to `user`.
    /// On failure nothing changes.
    ///
    /// # Errors
    /// [`LockTreeError::NotFound`] for an unknown name;
    /// [`LockTreeError::Contended`] if a bounded latch wait expires.
    pub fn upgrade(&self, name: &str, user: UserId) -> Result<bool, LockTreeError> {
        let node: NodeId = self.resolve(name)?;
        let mut path: PathLatch<'_> = self.latch_chain(node)?;

        if !self.can_upgrade(&path, node, user) {
            debug_log!(op = "upgrade", node = name, user = user.0, upgraded = false);
            return Ok(false);
        }

        // The descendant set cannot change while `node` is latched.
        let absorbed: Vec<NodeId> = path
            .state(node)
            .locked_descendants()
            .iter()
            .copied()
            .collect();
        path.extend_below(node, absorbed.iter().copied())?;

        for &descendant in &absorbed {
            debug_assert_eq!(path.state(descendant).owner(), Some(user));
            path.state_mut(descendant).set_owner(None);
            self.update_ancestors(&mut path, descendant, user, false);
        }

        path.state_mut(node).set_owner(Some(user));
        self.update_ancestors(&mut path, node, user, true);

        debug_log!(
            op = "upgrade",
            node = name,
            user = user.0,
            absorbed = absorbed.len(),
            upgraded = true
        );

        Ok(true)
    }

    /// Run one [`Operation`].
    ///
    /// # Errors
    /// As for [`lock`](Self::lock), [`unlock`](Self::unlock) and
    /// [`upgrade`](Self::upgrade).
    pub fn apply(&self, op: &Operation) -> Result<bool, LockTreeError> {
        match op.kind {
            OperationKind::Lock => self.lock(&op.node, op.user),
            OperationKind::Unlock => self.unlock(&op.node, op.user),
            OperationKind::Upgrade => self.upgrade(&op.node, op.user),
        }
    }

    // ========================================================================
    //  Observation
    // ========================================================================

    /// The user holding `name`, if locked.
    ///
    /// # Errors
    /// [`LockTreeError::NotFound`] for an unknown name.
    pub fn owner(&self, name: &str) -> Result<Option<UserId>, LockTreeError> {
        let node: NodeId = self.resolve(name)?;
        let guard = self.tree.node(node).latch().acquire(node);

        Ok(guard.state().owner())
    }

    /// Copy of the bookkeeping of `name`.
    ///
    /// # Errors
    /// [`LockTreeError::NotFound`] for an unknown name.
    pub fn snapshot(&self, name: &str) -> Result<NodeSnapshot, LockTreeError> {
        let node: NodeId = self.resolve(name)?;
        let guard = self.tree.node(node).latch().acquire(node);

        Ok(guard.state().snapshot())
    }

    /// Every locked node with its owner, taken as one consistent snapshot.
    #[must_use]
    pub fn locked_nodes(&self) -> BTreeMap<String, UserId> {
        let path = PathLatch::whole_tree(&self.tree);

        self.tree
            .ids()
            .filter_map(|id| {
                path.state(id)
                    .owner()
                    .map(|user| (self.tree.name(id).to_string(), user))
            })
            .collect()
    }

    /// Recount all bookkeeping from the lock flags and compare.
    ///
    /// Latches the whole tree, so the check sees one consistent state.
    ///
    /// # Errors
    /// The first [`InvariantViolation`] found.
    pub fn verify(&self) -> Result<(), InvariantViolation> {
        let tree: &Tree = &self.tree;
        let path = PathLatch::whole_tree(tree);
        let name = |id: NodeId| tree.name(id).to_string();

        let mut expected_count: HashMap<NodeId, usize> = HashMap::new();
        let mut expected_hist: HashMap<NodeId, BTreeMap<UserId, usize>> = HashMap::new();

        for node in tree.ids() {
            let Some(owner) = path.state(node).owner() else {
                continue;
            };

            for ancestor in tree.ancestry().ancestors(node) {
                if path.state(ancestor).is_locked() {
                    return Err(InvariantViolation::LockedUnderLockedAncestor {
                        node: name(node),
                        ancestor: name(ancestor),
                    });
                }
                *expected_count.entry(ancestor).or_insert(0) += 1;
                *expected_hist
                    .entry(ancestor)
                    .or_default()
                    .entry(owner)
                    .or_insert(0) += 1;
            }
        }

        for node in tree.ids() {
            let state = path.state(node);

            for &tracked in state.locked_descendants() {
                if !path.state(tracked).is_locked() || !tree.ancestry().is_ancestor(node, tracked)
                {
                    return Err(InvariantViolation::StaleDescendant {
                        node: name(node),
                        descendant: name(tracked),
                    });
                }
            }

            let actual: usize = expected_count.get(&node).copied().unwrap_or(0);
            if state.locked_descendant_count() != actual {
                return Err(InvariantViolation::DescendantCount {
                    node: name(node),
                    tracked: state.locked_descendant_count(),
                    actual,
                });
            }

            let tracked_hist: BTreeMap<UserId, usize> = state.snapshot().owner_histogram;
            let actual_hist: BTreeMap<UserId, usize> =
                expected_hist.remove(&node).unwrap_or_default();
            if tracked_hist != actual_hist {
                let user: UserId = tracked_hist
                    .keys()
                    .chain(actual_hist.keys())
                    .copied()
                    .find(|u| tracked_hist.get(u) != actual_hist.get(u))
                    .unwrap_or(UserId(0));
                return Err(InvariantViolation::Histogram {
                    node: name(node),
                    user,
                    tracked: tracked_hist.get(&user).copied().unwrap_or(0),
                    actual: actual_hist.get(&user).copied().unwrap_or(0),
                });
            }
        }

        Ok(())
    }

    // ========================================================================
    //  Latched internals
    // ========================================================================

    fn resolve(&self, name: &str) -> Result<NodeId, LockTreeError> {
        self.tree
            .id(name)
            .ok_or_else(|| LockTreeError::NotFound(name.to_string()))
    }

    fn latch_chain(&self, node: NodeId) -> Result<PathLatch<'_>, LockTreeError> {
        PathLatch::root_to(&self.tree, node, self.config.acquire_timeout)
    }

    /// Direct walk over the latched root chain, O(h).
    fn has_locked_ancestor(&self, path: &PathLatch<'_>, node: NodeId) -> bool {
        self.tree
            .ancestry()
            .ancestors(node)
            .any(|ancestor| path.state(ancestor).is_locked())
    }

    fn lock_latched(&self, path: &mut PathLatch<'_>, node: NodeId, user: UserId) -> bool {
        if path.state(node).is_locked()
            || self.has_locked_ancestor(path, node)
            || path.state(node).locked_descendant_count() != 0
        {
            return false;
        }

        path.state_mut(node).set_owner(Some(user));
        self.update_ancestors(path, node, user, true);
        true
    }

    fn unlock_latched(&self, path: &mut PathLatch<'_>, node: NodeId, user: UserId) -> bool {
        if path.state(node).owner() != Some(user) {
            return false;
        }

        path.state_mut(node).set_owner(None);
        self.update_ancestors(path, node, user, false);
        true
    }

    fn can_upgrade(&self, path: &PathLatch<'_>, node: NodeId, user: UserId) -> bool {
        let state = path.state(node);

        !state.is_locked()
            && !self.has_locked_ancestor(path, node)
            && state.locked_descendant_count() > 0
            && state.sole_descendant_owner() == Some(user)
    }

    /// Add or remove `locked` (owned by `owner`) in the bookkeeping of every
    /// ancestor of `locked`. O(h): every ancestor is touched.
    fn update_ancestors(
        &self,
        path: &mut PathLatch<'_>,
        locked: NodeId,
        owner: UserId,
        added: bool,
    ) {
        for ancestor in self.tree.ancestry().ancestors(locked) {
            let state = path.state_mut(ancestor);
            if added {
                state.add_locked_descendant(locked, owner);
            } else {
                state.remove_locked_descendant(locked, owner);
            }
        }
    }
}
