//! Per-node latch.
//!
//! [`NodeLatch`] is the mutual-exclusion primitive attached to every tree
//! node. It guards the node's [`LockState`]. The word "latch" is used for
//! this internal mutex so it is never confused with the user-visible resource
//! lock that [`LockTree::lock`](crate::LockTree::lock) grants.
//!
//! # Type-State Pattern
//! The [`LatchGuard`] returned by [`NodeLatch::acquire`] is the proof that the
//! latch is held. State can only be read or written through a guard, and the
//! latch is released when the guard drops (panic-safe).
//!
//! ```rust,ignore
//! let mut guard = latch.acquire(node);
//! guard.state_mut().set_owner(Some(user));
//! // Latch released when guard drops
//! ```

use std::marker::PhantomData;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::ids::NodeId;
use crate::state::LockState;
use crate::tracing_helpers::trace_log;

// ============================================================================
//  NodeLatch
// ============================================================================

/// Mutex protecting one node's [`LockState`].
#[derive(Debug, Default)]
pub struct NodeLatch {
    state: Mutex<LockState>,
}

// ============================================================================
//  LatchGuard (Type-State Pattern)
// ============================================================================

/// Proof that a node latch is held.
///
/// Cannot be constructed except through [`NodeLatch::acquire`] or
/// [`NodeLatch::try_acquire_for`]. The latch is released on drop.
///
/// Guards are `!Send` so a latch is always released by the thread that
/// acquired it.
#[derive(Debug)]
#[must_use = "releasing a latch without using the guard is a logic error"]
pub struct LatchGuard<'a> {
    node: NodeId,
    state: MutexGuard<'a, LockState>,

    // Raw pointers are neither Send nor Sync.
    _marker: PhantomData<*mut ()>,
}

impl LatchGuard<'_> {
    /// The node whose latch is held.
    #[inline]
    #[must_use]
    pub const fn node(&self) -> NodeId {
        self.node
    }

    /// Read access to the guarded state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> &LockState {
        &self.state
    }

    /// Write access to the guarded state.
    #[inline]
    pub fn state_mut(&mut self) -> &mut LockState {
        &mut self.state
    }
}

impl Drop for LatchGuard<'_> {
    fn drop(&mut self) {
        trace_log!(node = %self.node, "latch released");
    }
}

impl NodeLatch {
    /// A latch over an unlocked, empty [`LockState`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the latch is acquired.
    pub fn acquire(&self, node: NodeId) -> LatchGuard<'_> {
        let state = self.state.lock();
        trace_log!(node = %node, "latch acquired");

        LatchGuard {
            node,
            state,
            _marker: PhantomData,
        }
    }

    /// Try to acquire the latch, waiting at most `timeout`.
    ///
    /// # Returns
    /// `Some(guard)` if acquired in time, [`None`] on timeout.
    pub fn try_acquire_for(&self, node: NodeId, timeout: Duration) -> Option<LatchGuard<'_>> {
        let state = self.state.try_lock_for(timeout)?;
        trace_log!(node = %node, "latch acquired (bounded)");

        Some(LatchGuard {
            node,
            state,
            _marker: PhantomData,
        })
    }

    /// Whether some thread currently holds the latch.
    #[cfg(test)]
    #[inline]
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.state.is_locked()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::UserId;

    fn node() -> NodeId {
        NodeId::from_index(0)
    }

    #[test]
    fn test_acquire_release_roundtrip() {
        let latch = NodeLatch::new();

        {
            let guard = latch.acquire(node());
            assert!(latch.is_held());
            assert_eq!(guard.node(), node());
        }

        assert!(!latch.is_held());
    }

    #[test]
    fn test_zero_timeout_does_not_wait() {
        let latch = NodeLatch::new();

        let guard = latch.try_acquire_for(node(), Duration::ZERO);
        assert!(guard.is_some());

        assert!(latch.try_acquire_for(node(), Duration::ZERO).is_none());

        drop(guard);
        assert!(latch.try_acquire_for(node(), Duration::ZERO).is_some());
    }

    #[test]
    fn test_state_survives_release() {
        let latch = NodeLatch::new();

        {
            let mut guard = latch.acquire(node());
            guard.state_mut().set_owner(Some(UserId(3)));
        }

        let guard = latch.acquire(node());
        assert_eq!(guard.state().owner(), Some(UserId(3)));
    }

    #[cfg(not(miri))]
    #[test]
    fn test_try_acquire_for_times_out() {
        use std::sync::Arc;
        use std::sync::mpsc;
        use std::thread;

        let latch = Arc::new(NodeLatch::new());
        let (held_tx, held_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let holder = {
            let latch = Arc::clone(&latch);
            thread::spawn(move || {
                let _guard = latch.acquire(node());
                held_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            })
        };

        held_rx.recv().unwrap();
        assert!(
            latch
                .try_acquire_for(node(), Duration::from_millis(20))
                .is_none(),
            "should have timed out"
        );

        release_tx.send(()).unwrap();
        holder.join().expect("holder panicked");

        assert!(
            latch
                .try_acquire_for(node(), Duration::from_millis(20))
                .is_some()
        );
    }
}
