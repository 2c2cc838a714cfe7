//! Tracing setup for the upgrader.
//!
//! Diagnostics go to stderr; stdout is reserved for the single JSON result.
//! Run artifacts (`io/artifacts`) are written independently of `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "upgrader=info";

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `upgrader=info` if unset.
///
/// # Example
/// ```bash
/// RUST_LOG=upgrader=debug upgrader --repository-url ... --base-branch main
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // A second init (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
