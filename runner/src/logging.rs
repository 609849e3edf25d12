//! Tracing setup for the runner.
//!
//! Status lines ("Working on task…", "Verification failed, rolling back") are
//! `info!` events so they show up in CI logs by default. Machine-readable
//! command output goes to stdout and never through tracing.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "spec_runner=info,warn";

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; defaults to `spec_runner=info,warn`.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=spec_runner=debug spec-runner run my-feature
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
