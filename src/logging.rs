//! Sets up log output for the command line tools.

use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Install a global subscriber that writes logs to stderr.
///
/// The level defaults to `info` and can be changed with the `RUST_LOG`
/// environment variable, e.g. `RUST_LOG=student_ledger=debug`. Logs go to
/// stderr so that stdout only carries command output.
///
/// Calling this more than once has no effect.
pub fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_log = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let _ = tracing_subscriber::registry()
        .with(stderr_log.with_filter(filter))
        .try_init();
}
