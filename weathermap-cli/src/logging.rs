//! Diagnostics go to stderr so they never mix with forecast output.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise only warnings are shown, or debug
/// output for this tool's crates with `--verbose`.
pub fn init(verbose: bool) {
    let fallback = if verbose { "warn,weathermap=debug,weathermap_core=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(verbose);

    // A second init only happens in tests; keep the first subscriber.
    let _ = tracing_subscriber::registry().with(filter).with(stderr).try_init();
}
