//! Logging macros for latch and operation events.
//!
//! Built with `--features tracing`, each macro forwards to the matching
//! `tracing` level. Without the feature the arguments are discarded at
//! expansion, so the latch hot path carries no logging code at all.
//!
//! # Events
//!
//! | Level | Target | Fields | Emitted by |
//! |-------|--------|--------|------------|
//! | `trace` | `treelock::latch` | `node` | every latch acquire and release |
//! | `trace` | `treelock::protocol` | | a `PathLatch` releasing its chain |
//! | `debug` | `treelock::engine` | `op`, `node`, `user`, outcome | every lock / unlock / upgrade |
//! | `debug` | `treelock::tree` | `nodes`, `height` | `Tree::build` |
//! | `warn` | `treelock::protocol` | `node`, `timeout` | a bounded latch wait expiring |
//!
//! The upgrade event also carries `absorbed`, the number of descendant locks
//! it replaced. Outcome fields are `granted`, `released` and `upgraded`.
//!
//! ```bash
//! # Which latch a timed-out operation was waiting on
//! RUST_LOG=treelock::protocol=warn cargo test --features tracing --test stress_tests
//!
//! # Per-query outcomes next to the command loop's output
//! RUST_LOG=treelock::engine=debug cargo run --features tracing < input.txt
//! ```

#![allow(unused_macros, unused_imports)]

#[cfg(feature = "tracing")]
macro_rules! trace_log {
    ($($arg:tt)*) => { tracing::trace!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "tracing")]
macro_rules! debug_log {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

/// Only bounded waits warn; a blocking acquisition never fails.
#[cfg(feature = "tracing")]
macro_rules! warn_log {
    ($($arg:tt)*) => { tracing::warn!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! warn_log {
    ($($arg:tt)*) => {};
}

pub(crate) use debug_log;
pub(crate) use trace_log;
pub(crate) use warn_log;
