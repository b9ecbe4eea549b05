//! # `treelock`
//!
//! Hierarchical resource locking over a fixed tree.
//!
//! Every node of the tree is a lockable resource. A user may lock a node
//! only while no ancestor and no descendant of it is locked, and may
//! *upgrade*: atomically trade all of their locks below a node for a single
//! lock on that node.
//!
//! | Operation | Succeeds when |
//! |-----------|---------------|
//! | `lock(n, u)` | `n` unlocked, no locked ancestor, no locked descendant |
//! | `unlock(n, u)` | `n` locked by `u` |
//! | `upgrade(n, u)` | `n` unlocked, no locked ancestor, ≥1 locked descendant, all owned by `u` |
//!
//! A failed precondition is `Ok(false)`. An unknown node name is
//! `Err(LockTreeError::NotFound)`.
//!
//! ## Thread Safety
//!
//! [`LockTree`] is `Send + Sync`. Each node carries its own latch; operations
//! latch root-to-target chains in a fixed global order (see [`protocol`]),
//! so operations on unrelated subtrees only contend on shared ancestors and
//! never deadlock.
//!
//! ```rust
//! use std::sync::Arc;
//! use std::thread;
//! use treelock::{LockTree, Tree, TreeShape, UserId};
//!
//! let names: Vec<String> = (0..15).map(|i| format!("n{i}")).collect();
//! let locks = Arc::new(LockTree::new(Tree::build(names, TreeShape::Arity(2)).unwrap()));
//!
//! let handles: Vec<_> = (7..15)
//!     .map(|leaf| {
//!         let locks = Arc::clone(&locks);
//!         thread::spawn(move || locks.lock(&format!("n{leaf}"), UserId(leaf)).unwrap())
//!     })
//!     .collect();
//!
//! assert!(handles.into_iter().all(|h| h.join().unwrap()));
//! assert_eq!(locks.snapshot("n0").unwrap().locked_descendant_count, 8);
//! ```
//!
//! ## Design
//!
//! - [`tree`]: arena of nodes with `NodeId` parent back-references.
//! - [`ancestry`]: binary-lifting jump table for k-th ancestor queries.
//! - [`state`]: per-node owner, locked-descendant set and owner histogram.
//! - `latch` (crate-private): per-node mutex with a type-state guard.
//! - [`protocol`]: ordered multi-node latching.
//! - [`engine`]: lock / unlock / upgrade.

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod ancestry;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod ids;
pub mod protocol;
pub mod state;
pub mod tree;

mod latch;
mod tracing_helpers;

pub use config::Config;
pub use engine::{LockTree, Operation, OperationKind};
pub use error::{ConstructionError, InvariantViolation, LockTreeError};
pub use ids::{NodeId, UserId};
pub use state::NodeSnapshot;
pub use tree::{Tree, TreeShape};
