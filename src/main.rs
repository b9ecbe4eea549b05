//! Command loop over a lock tree.
//!
//! Reads a script on stdin (see [`treelock::command`] for the format) and
//! prints one line per query.
//!
//! Run with:
//! ```bash
//! cargo run --release < input.txt
//!
//! # With operation logging on stderr
//! RUST_LOG=treelock=debug cargo run --features tracing < input.txt
//! ```
//!
//! Exit status is non-zero if the input is malformed or the configuration
//! environment is invalid.

use std::io::{self, BufWriter, Read, Write};
use std::process::ExitCode;

use treelock::command::{Script, render};
use treelock::{Config, LockTree};

#[cfg(feature = "tracing")]
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_thread_ids(true)
        .compact()
        .try_init();
}

#[cfg(not(feature = "tracing"))]
const fn init_tracing() {}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;

    let script = Script::parse(&input)?;
    let locks = LockTree::with_config(script.build()?, config);

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for outcome in script.run(&locks) {
        writeln!(out, "{}", render(&outcome))?;
    }
    out.flush()?;

    Ok(())
}

fn main() -> ExitCode {
    init_tracing();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("treelock: {err}");
            ExitCode::FAILURE
        }
    }
}
