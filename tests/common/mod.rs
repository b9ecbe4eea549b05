//! Shared test support: tracing setup and tree fixtures.
//!
//! ```rust,ignore
//! mod common;
//!
//! #[test]
//! fn my_test() {
//!     common::init_tracing();
//!     // ... test code with tracing::info!, tracing::debug!, etc.
//! }
//! ```
//!
//! Environment variables:
//! - `RUST_LOG`: filter directives (e.g. `treelock=debug,treelock::protocol=trace`).
//!   Library events only appear when built with `--features tracing`.
//! - `TREELOCK_LOG_DIR`: log directory (default: `logs/`)
//! - `TREELOCK_LOG_CONSOLE`: set to "0" to disable console output
//!
//! Logs are appended to `logs/treelock.jsonl` as NDJSON:
//!
//! ```bash
//! cat logs/treelock.jsonl | jq 'select(.fields.op == "upgrade")'
//! ```

#![allow(dead_code)]

use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Once;

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};
use treelock::{LockTree, Tree, TreeShape};

static INIT: Once = Once::new();

/// Install the test subscriber. Only the first call has any effect.
pub fn init_tracing() {
    INIT.call_once(setup_tracing);
}

#[derive(Debug, Clone)]
struct TracingConfig {
    log_dir: PathBuf,
    log_file: String,
    console_enabled: bool,
    default_level: Level,
}

impl TracingConfig {
    fn from_env() -> Self {
        Self {
            log_dir: env::var("TREELOCK_LOG_DIR").map_or_else(|_| PathBuf::from("logs"), PathBuf::from),
            log_file: "treelock.jsonl".to_string(),
            console_enabled: !env::var("TREELOCK_LOG_CONSOLE").is_ok_and(|v| v == "0"),
            default_level: Level::INFO,
        }
    }
}

fn make_filter(default_level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("{default_level}")))
}

#[expect(clippy::expect_used)]
fn setup_tracing() {
    let config = TracingConfig::from_env();

    std::fs::create_dir_all(&config.log_dir).expect("Failed to create log directory");

    // Append: nextest runs each test in its own process.
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_dir.join(&config.log_file))
        .expect("Failed to open log file");

    let console_layer = config.console_enabled.then(|| {
        tracing_subscriber::fmt::layer()
            .with_thread_ids(true)
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .compact()
            .with_filter(make_filter(config.default_level))
    });

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::sync::Mutex::new(file))
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .json()
        .with_filter(make_filter(config.default_level));

    let _ = Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

// =============================================================================
// Fixtures
// =============================================================================

/// Names of the scenario tree, in m-ary (m = 2) order.
pub const WORLD: [&str; 7] = [
    "World",
    "Asia",
    "Africa",
    "China",
    "India",
    "SouthAfrica",
    "Egypt",
];

/// World -> {Asia, Africa}, Asia -> {China, India}, Africa -> {SouthAfrica, Egypt}
#[expect(clippy::unwrap_used)]
pub fn world() -> LockTree {
    let shape = TreeShape::Edges(vec![
        ("World".into(), vec!["Asia".into(), "Africa".into()]),
        ("Asia".into(), vec!["China".into(), "India".into()]),
        ("Africa".into(), vec!["SouthAfrica".into(), "Egypt".into()]),
    ]);
    LockTree::new(Tree::build(WORLD, shape).unwrap())
}

/// Complete `arity`-ary tree with `n` nodes named `n0..n{n-1}`.
#[expect(clippy::unwrap_used)]
pub fn mary(n: usize, arity: usize) -> LockTree {
    let names: Vec<String> = (0..n).map(node_name).collect();
    LockTree::new(Tree::build(names, TreeShape::Arity(arity)).unwrap())
}

/// Name of the i-th node of a [`mary`] tree.
pub fn node_name(i: usize) -> String {
    format!("n{i}")
}
